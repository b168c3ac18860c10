//! Bounded LRU cache of fetched pages.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

use super::key::PageKey;
use super::traits::{Cacheable, PageResponse};

/// A cached page.
#[derive(Debug, Clone)]
pub struct PageEntry<T> {
  /// The page as fetched
  pub page: Arc<PageResponse<T>>,
  /// When the page was fetched
  pub fetched_at: DateTime<Utc>,
  /// Only valid entries are served
  pub valid: bool,
}

impl<T> PageEntry<T> {
  pub fn new(page: Arc<PageResponse<T>>) -> Self {
    Self {
      page,
      fetched_at: Utc::now(),
      valid: true,
    }
  }
}

/// Page cache owned by one list view.
///
/// Entries are keyed structurally by [`PageKey`]. Reads and writes both
/// count as access for eviction order.
pub struct PageCache<T> {
  entries: LruCache<PageKey, PageEntry<T>>,
  /// Entries older than this are treated as invalid
  max_age: Option<Duration>,
}

impl<T: Cacheable> PageCache<T> {
  pub fn new(capacity: NonZeroUsize) -> Self {
    Self {
      entries: LruCache::new(capacity),
      max_age: None,
    }
  }

  /// Expire entries after `max_age` regardless of their validity flag.
  pub fn with_max_age(mut self, max_age: Duration) -> Self {
    self.max_age = Some(max_age);
    self
  }

  fn is_expired(&self, entry: &PageEntry<T>) -> bool {
    match self.max_age {
      Some(max_age) => Utc::now() - entry.fetched_at > max_age,
      None => false,
    }
  }

  /// Get a trusted entry, marking it most recently used.
  pub fn get(&mut self, key: &PageKey) -> Option<&PageEntry<T>> {
    let usable = match self.entries.peek(key) {
      Some(entry) => entry.valid && !self.is_expired(entry),
      None => false,
    };

    if !usable {
      debug!(%key, "page cache miss");
      return None;
    }

    debug!(%key, "page cache hit");
    self.entries.get(key)
  }

  /// Insert or replace an entry as most recently used, evicting the least
  /// recently used entry when over capacity.
  pub fn put(&mut self, key: PageKey, entry: PageEntry<T>) {
    if let Some((evicted, _)) = self.entries.push(key.clone(), entry) {
      if evicted != key {
        debug!(key = %evicted, "evicted page from cache");
      }
    }
  }

  /// Mark every entry invalid.
  pub fn invalidate_all(&mut self) {
    for (_, entry) in self.entries.iter_mut() {
      entry.valid = false;
    }
    debug!(entries = self.entries.len(), "invalidated all cached pages");
  }

  /// Mark invalid every entry whose page contains `item_id`.
  /// Returns the number of entries invalidated.
  pub fn invalidate_containing(&mut self, item_id: &str) -> usize {
    let mut count = 0;
    for (_, entry) in self.entries.iter_mut() {
      if entry.valid && entry.page.contains(item_id) {
        entry.valid = false;
        count += 1;
      }
    }
    debug!(item_id, count, "invalidated cached pages containing item");
    count
  }

  /// Whether `key` is held at all, valid or not. Does not touch LRU order.
  #[cfg(test)]
  pub fn contains(&self, key: &PageKey) -> bool {
    self.entries.contains(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }
}
