//! "Load more" accumulation across successive pages.

use std::collections::HashSet;
use tracing::debug;

use crate::list::{
  validate_page_size, Cacheable, FetchCoordinator, FetchError, Filter, PageKey, Pagination, Sort,
};

use super::{Fetches, QueryState, Settled};

/// Append-only item list fed one page at a time.
pub struct InfiniteQuery<T: Cacheable> {
  fetches: Fetches<T>,
  filter: Filter,
  sort: Sort,
  /// Totals; current page tracks the highest page appended
  pagination: Pagination,
  items: Vec<T>,
  seen: HashSet<String>,
  highest_page: u32,
  /// Key of the page being fetched, if any
  pending: Option<PageKey>,
  state: QueryState,
}

impl<T: Cacheable> InfiniteQuery<T> {
  pub fn new(coordinator: FetchCoordinator<T>, page_size: u32) -> Result<Self, FetchError> {
    let page_size = validate_page_size(page_size)?;

    Ok(Self {
      fetches: Fetches::new(coordinator),
      filter: Filter::default(),
      sort: Sort::default(),
      pagination: Pagination::new(page_size),
      items: Vec::new(),
      seen: HashSet::new(),
      highest_page: 0,
      pending: None,
      state: QueryState::Idle,
    })
  }

  pub fn with_filter(mut self, filter: Filter) -> Self {
    self.filter = filter;
    self
  }

  pub fn with_sort(mut self, sort: Sort) -> Self {
    self.sort = sort;
    self
  }

  pub fn state(&self) -> &QueryState {
    &self.state
  }

  pub fn items(&self) -> &[T] {
    &self.items
  }

  pub fn highest_page(&self) -> u32 {
    self.highest_page
  }

  pub fn total_items(&self) -> Option<u64> {
    self.pagination.total_items()
  }

  pub fn filter(&self) -> &Filter {
    &self.filter
  }

  pub fn sort(&self) -> Sort {
    self.sort
  }

  pub fn page_size(&self) -> u32 {
    self.pagination.page_size()
  }

  pub fn fetches_in_flight(&self) -> usize {
    self.fetches.in_flight()
  }

  /// Whether another page may exist.
  pub fn has_more(&self) -> bool {
    self.highest_page == 0 || self.pagination.has_next()
  }

  fn next_key(&self) -> PageKey {
    PageKey::new(
      self.filter.clone(),
      self.sort,
      self.highest_page + 1,
      self.pagination.page_size(),
    )
  }

  /// Request the next page.
  ///
  /// Returns `false` without fetching when that page is already pending or
  /// there is nothing left to load. Equal keys requested elsewhere are
  /// joined by the coordinator.
  pub fn load_more(&mut self) -> bool {
    if !self.has_more() {
      return false;
    }

    let key = self.next_key();
    if self.pending.as_ref() == Some(&key) {
      debug!(%key, "next page already pending");
      return false;
    }

    self.fetches.start(&key);
    self.pending = Some(key);
    self.state = QueryState::Loading;
    true
  }

  /// Clear everything and start again from page 1.
  ///
  /// Pages still in flight are treated as outdated; if the new first page
  /// is one of them it is fetched again once it arrives.
  pub fn reset(&mut self) {
    self.fetches.invalidate();
    self.items.clear();
    self.seen.clear();
    self.highest_page = 0;
    self.pagination.reset();
    self.pending = None;
    self.state = QueryState::Idle;
    self.load_more();
  }

  pub fn set_filter(&mut self, filter: Filter) {
    if filter == self.filter {
      return;
    }
    self.filter = filter;
    self.reset();
  }

  pub fn set_sort(&mut self, sort: Sort) {
    if sort == self.sort {
      return;
    }
    self.sort = sort;
    self.reset();
  }

  pub fn set_page_size(&mut self, page_size: u32) -> Result<(), FetchError> {
    let page_size = validate_page_size(page_size)?;
    if page_size != self.pagination.page_size() {
      self.pagination.set_page_size(page_size);
      self.reset();
    }
    Ok(())
  }

  /// Apply any settled fetches without blocking.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Some(settled) = self.fetches.try_next() {
      changed |= self.apply(settled);
    }
    changed
  }

  /// Wait until the pending page has settled.
  pub async fn settle(&mut self) -> &QueryState {
    while self.pending.is_some() {
      match self.fetches.next().await {
        Some(settled) => {
          self.apply(settled);
        }
        None => break,
      }
    }
    &self.state
  }

  fn apply(&mut self, settled: Settled<T>) -> bool {
    let Settled {
      key,
      result,
      current,
    } = settled;

    if self.pending.as_ref() != Some(&key) {
      debug!(%key, "discarding stale page result");
      return false;
    }
    if !current {
      debug!(%key, "page fetched before a reset, fetching again");
      self.fetches.start(&key);
      return false;
    }
    self.pending = None;

    match result {
      Ok(page) => {
        for item in &page.items {
          // Pages shift when items are created upstream; skip repeats
          if self.seen.insert(item.cache_key()) {
            self.items.push(item.clone());
          }
        }
        self.highest_page = key.page;
        self.pagination.set_total_items(page.total_items);
        self.pagination.go_to(key.page);
        self.state = QueryState::Loaded;
      }
      Err(e) => {
        self.state = QueryState::Error(e);
      }
    }
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::list::testing::{FakeSource, TestItem};
  use std::time::Duration;

  fn query(source: &FakeSource, page_size: u32) -> InfiniteQuery<TestItem> {
    InfiniteQuery::new(FetchCoordinator::new(source.clone()), page_size).unwrap()
  }

  #[tokio::test]
  async fn test_accumulates_pages() {
    let source = FakeSource::new(25);
    let mut q = query(&source, 10);

    assert!(q.load_more());
    q.settle().await;
    assert_eq!(q.items().len(), 10);
    assert_eq!(q.highest_page(), 1);

    assert!(q.load_more());
    q.settle().await;
    assert!(q.load_more());
    q.settle().await;
    assert_eq!(q.items().len(), 25);
    assert_eq!(q.highest_page(), 3);
    assert_eq!(q.items()[0].id, "p1-0");
    assert_eq!(q.items()[24].id, "p3-24");

    // Exhausted
    assert!(!q.has_more());
    assert!(!q.load_more());
    assert_eq!(source.calls(), 3);
  }

  #[tokio::test]
  async fn test_rapid_load_more_requests_one_page() {
    let source = FakeSource::new(100).with_delay(Duration::from_millis(20));
    let mut q = query(&source, 10);
    q.load_more();
    q.settle().await;

    assert!(q.load_more());
    assert!(!q.load_more());
    q.settle().await;

    assert_eq!(source.requested_pages(), vec![1, 2]);
    assert_eq!(q.highest_page(), 2);
    assert_eq!(q.items().len(), 20);
  }

  #[tokio::test]
  async fn test_filter_change_restarts() {
    let source = FakeSource::new(100).with_delay(Duration::from_millis(20));
    let mut q = query(&source, 10);
    q.load_more();
    q.settle().await;
    q.load_more();

    // Page 2 still in flight when the filter changes
    q.set_filter(Filter::parse(&["priority=high"]).unwrap());
    assert!(q.items().is_empty());
    assert_eq!(q.highest_page(), 0);

    q.settle().await;
    assert_eq!(q.highest_page(), 1);
    assert_eq!(q.items().len(), 10);
    assert!(q.items().iter().all(|i| i.view == "priority=high"));

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(!q.poll());
    assert_eq!(q.items().len(), 10);
  }

  #[tokio::test]
  async fn test_sort_change_restarts() {
    let source = FakeSource::new(100).with_delay(Duration::from_millis(20));
    let mut q = query(&source, 10);
    q.load_more();
    q.settle().await;

    // Same sort is not a change
    q.set_sort(Sort::default());
    assert_eq!(q.items().len(), 10);
    assert_eq!(source.calls(), 1);

    q.load_more();
    let sort: Sort = "-points".parse().unwrap();
    q.set_sort(sort);
    assert!(q.items().is_empty());
    assert_eq!(q.highest_page(), 0);

    q.settle().await;
    assert_eq!(q.sort(), sort);
    assert_eq!(q.highest_page(), 1);
    assert_eq!(q.items().len(), 10);
    assert_eq!(source.requested_pages(), vec![1, 2, 1]);

    // The late page 2 result is ignored
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(!q.poll());
    assert_eq!(q.items().len(), 10);
  }

  #[tokio::test]
  async fn test_reset_while_first_page_in_flight_refetches() {
    let source = FakeSource::new(30).with_delay(Duration::from_millis(20));
    let mut q = query(&source, 10);
    q.load_more();

    // The first fetch already read 30 items
    source.set_total(5);
    q.reset();
    q.settle().await;
    assert_eq!(q.total_items(), Some(5));
    assert_eq!(q.items().len(), 5);
    assert_eq!(source.requested_pages(), vec![1, 1]);
  }

  #[tokio::test]
  async fn test_error_keeps_items_and_allows_retry() {
    let source = FakeSource::new(100);
    let mut q = query(&source, 10);
    q.load_more();
    q.settle().await;

    source.set_failing(true);
    q.load_more();
    assert!(q.settle().await.is_error());
    assert_eq!(q.items().len(), 10);
    assert_eq!(q.highest_page(), 1);

    source.set_failing(false);
    assert!(q.load_more());
    assert!(q.settle().await.is_loaded());
    assert_eq!(q.items().len(), 20);
  }

  #[tokio::test]
  async fn test_empty_collection() {
    let source = FakeSource::new(0);
    let mut q = query(&source, 10);
    q.load_more();
    q.settle().await;
    assert!(q.items().is_empty());
    assert_eq!(q.total_items(), Some(0));
    assert!(!q.load_more());
  }

  #[tokio::test]
  async fn test_page_size_change_restarts() {
    let source = FakeSource::new(100);
    let mut q = query(&source, 10);
    q.load_more();
    q.settle().await;

    q.set_page_size(25).unwrap();
    q.settle().await;
    assert_eq!(q.items().len(), 25);
    assert!(q.set_page_size(1000).is_err());
  }
}
