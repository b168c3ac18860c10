//! In-memory page source for tests.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::FetchError;
use super::key::PageKey;
use super::traits::{Cacheable, PageResponse, PageSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestItem {
  pub id: String,
  /// Canonical filter of the key that produced this item
  pub view: String,
}

impl TestItem {
  pub fn new(id: &str) -> Self {
    Self {
      id: id.to_string(),
      view: String::new(),
    }
  }
}

impl Cacheable for TestItem {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "items"
  }
}

/// Serves `total` synthetic items, counting every call.
///
/// Item ids are `p{page}-{index}` so tests can tell pages apart; each item
/// records the filter it was fetched under.
#[derive(Clone)]
pub struct FakeSource {
  total: Arc<AtomicUsize>,
  delay: Duration,
  calls: Arc<AtomicUsize>,
  fail: Arc<AtomicBool>,
  requested: Arc<Mutex<Vec<PageKey>>>,
}

impl FakeSource {
  pub fn new(total: usize) -> Self {
    Self {
      total: Arc::new(AtomicUsize::new(total)),
      delay: Duration::ZERO,
      calls: Arc::new(AtomicUsize::new(0)),
      fail: Arc::new(AtomicBool::new(false)),
      requested: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn set_failing(&self, fail: bool) {
    self.fail.store(fail, Ordering::SeqCst);
  }

  pub fn set_total(&self, total: usize) {
    self.total.store(total, Ordering::SeqCst);
  }

  pub fn requested_pages(&self) -> Vec<u32> {
    self
      .requested
      .lock()
      .unwrap()
      .iter()
      .map(|k| k.page)
      .collect()
  }
}

impl PageSource<TestItem> for FakeSource {
  fn fetch_page(&self, key: &PageKey) -> BoxFuture<'static, Result<PageResponse<TestItem>, FetchError>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.requested.lock().unwrap().push(key.clone());

    let total = self.total.load(Ordering::SeqCst);
    let fail = self.fail.load(Ordering::SeqCst);
    let delay = self.delay;
    let key = key.clone();

    async move {
      if !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      if fail {
        return Err(FetchError::Server {
          status: 503,
          message: "unavailable".to_string(),
        });
      }

      let size = key.page_size as usize;
      let start = (key.page as usize - 1) * size;
      let end = (start + size).min(total);
      let view = key.filter.canonical();
      let items = (start..end)
        .map(|i| TestItem {
          id: format!("p{}-{}", key.page, i),
          view: view.clone(),
        })
        .collect();

      Ok(PageResponse {
        items,
        total_items: total as u64,
      })
    }
    .boxed()
  }
}
