//! Async list queries with loading state and stale-result handling.
//!
//! Inspired by TanStack Query. A query spawns its fetches through a
//! [`FetchCoordinator`] and receives results over a channel tagged with the
//! page key they were issued for. Only a result whose key still matches the
//! query's active key is applied; anything else arrived too late and is
//! dropped.
//!
//! # Example
//!
//! ```ignore
//! let mut query = PagedQuery::new(coordinator, cache, 20)?;
//! query.go_to_page(1);
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, re-render
//! }
//!
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Loaded => render_items(query.items()),
//!     QueryState::Error(e) => render_error_with_retry(e, query.items()),
//!     QueryState::Idle => {}
//! }
//! ```

mod infinite;
mod paged;

pub use infinite::InfiniteQuery;
pub use paged::PagedQuery;

use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::list::{Cacheable, FetchCoordinator, FetchError, FetchResult, PageKey};

/// The state of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
  /// Nothing requested yet
  Idle,
  /// A fetch for the active key is outstanding
  Loading,
  /// The active key's data is available
  Loaded,
  /// The last fetch failed; previously loaded data is kept
  Error(FetchError),
}

impl QueryState {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_loaded(&self) -> bool {
    matches!(self, QueryState::Loaded)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn error(&self) -> Option<&FetchError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// A fetch that came back, tagged with the key it was issued for
type Completion<T> = (PageKey, FetchResult<T>);

/// A received completion, checked against the current generation.
struct Settled<T> {
  key: PageKey,
  result: FetchResult<T>,
  /// False when the fetch started before the last `invalidate`
  current: bool,
}

/// The fetches one query has outstanding.
///
/// Each key has at most one fetch outstanding, stamped with the generation
/// it started in. Asking again for an outstanding key waits for that fetch
/// instead of joining it a second time through the coordinator.
struct Fetches<T: Cacheable> {
  coordinator: FetchCoordinator<T>,
  generation: u64,
  outstanding: HashMap<PageKey, u64>,
  tx: mpsc::UnboundedSender<Completion<T>>,
  rx: mpsc::UnboundedReceiver<Completion<T>>,
}

impl<T: Cacheable> Fetches<T> {
  fn new(coordinator: FetchCoordinator<T>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      coordinator,
      generation: 0,
      outstanding: HashMap::new(),
      tx,
      rx,
    }
  }

  /// Start a fetch for `key` unless one is already outstanding.
  fn start(&mut self, key: &PageKey) {
    if self.outstanding.contains_key(key) {
      debug!(%key, "fetch already outstanding");
      return;
    }
    if self.coordinator.is_in_flight(key) {
      debug!(%key, "joining a fetch started by another view");
    }
    self.outstanding.insert(key.clone(), self.generation);
    spawn_fetch(&self.coordinator, key.clone(), self.tx.clone());
  }

  /// Fetches running through the shared coordinator, from any view.
  fn in_flight(&self) -> usize {
    self.coordinator.in_flight_count()
  }

  /// Mark every outstanding fetch as started before a change upstream.
  fn invalidate(&mut self) {
    self.generation += 1;
  }

  fn try_next(&mut self) -> Option<Settled<T>> {
    let completion = self.rx.try_recv().ok()?;
    Some(self.settle(completion))
  }

  async fn next(&mut self) -> Option<Settled<T>> {
    let completion = self.rx.recv().await?;
    Some(self.settle(completion))
  }

  fn settle(&mut self, (key, result): Completion<T>) -> Settled<T> {
    let current = self
      .outstanding
      .remove(&key)
      .map_or(true, |started| started == self.generation);
    Settled {
      key,
      result,
      current,
    }
  }
}

/// Drive the coordinator's fetch for `key` on a task and report back.
fn spawn_fetch<T: Cacheable>(
  coordinator: &FetchCoordinator<T>,
  key: PageKey,
  tx: mpsc::UnboundedSender<Completion<T>>,
) {
  let fetch = coordinator.request(&key);
  tokio::spawn(async move {
    let result = fetch.await;
    // Ignore send errors - the query may have been dropped
    let _ = tx.send((key, result));
  });
}
