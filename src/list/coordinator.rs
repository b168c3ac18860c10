//! De-duplicating fetch coordinator.
//!
//! Concurrent requests for structurally equal keys share one in-flight
//! future, so at most one network call per distinct key runs at a time.
//! Entries leave the in-flight set when the fetch settles, whether it
//! succeeded or not. Nothing is retried here.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::error::FetchError;
use super::key::PageKey;
use super::traits::{Cacheable, PageResponse, PageSource};

/// Outcome of one page fetch, cheap to clone for every waiter.
pub type FetchResult<T> = Result<Arc<PageResponse<T>>, FetchError>;

/// A fetch that any number of callers can await.
pub type SharedFetch<T> = Shared<BoxFuture<'static, FetchResult<T>>>;

type InFlight<T> = Arc<Mutex<HashMap<String, SharedFetch<T>>>>;

pub struct FetchCoordinator<T> {
  source: Arc<dyn PageSource<T>>,
  in_flight: InFlight<T>,
}

impl<T: Cacheable> FetchCoordinator<T> {
  pub fn new(source: impl PageSource<T>) -> Self {
    Self::from_arc(Arc::new(source))
  }

  pub fn from_arc(source: Arc<dyn PageSource<T>>) -> Self {
    Self {
      source,
      in_flight: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Join the in-flight fetch for `key`, or start one.
  ///
  /// The fetch only makes progress while someone polls the returned
  /// future.
  pub fn request(&self, key: &PageKey) -> SharedFetch<T> {
    let hash = key.cache_hash();
    let mut in_flight = lock(&self.in_flight, "request");

    if let Some(existing) = in_flight.get(&hash) {
      debug!(%key, "joining in-flight fetch");
      return existing.clone();
    }

    debug!(%key, "starting fetch");
    let fetch = self.source.fetch_page(key);
    let registry = Arc::clone(&self.in_flight);
    let settled_hash = hash.clone();
    let settled_key = key.clone();

    let shared = async move {
      let result = fetch.await.map(Arc::new);
      lock(&registry, "settle").remove(&settled_hash);
      if let Err(e) = &result {
        warn!(key = %settled_key, error = %e, "page fetch failed");
      }
      result
    }
    .boxed()
    .shared();

    in_flight.insert(hash, shared.clone());
    shared
  }

  pub fn is_in_flight(&self, key: &PageKey) -> bool {
    lock(&self.in_flight, "is_in_flight").contains_key(&key.cache_hash())
  }

  pub fn in_flight_count(&self) -> usize {
    lock(&self.in_flight, "in_flight_count").len()
  }
}

impl<T> Clone for FetchCoordinator<T> {
  fn clone(&self) -> Self {
    Self {
      source: Arc::clone(&self.source),
      in_flight: Arc::clone(&self.in_flight),
    }
  }
}

/// Lock the in-flight map, recovering from a poisoned lock.
fn lock<'a, T>(mutex: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
  match mutex.lock() {
    Ok(guard) => guard,
    Err(poisoned) => {
      warn!(op, "recovered from poisoned in-flight lock");
      poisoned.into_inner()
    }
  }
}
