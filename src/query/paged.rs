//! Discrete page navigation over a cached collection.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::list::{
  validate_page_size, Cacheable, FetchCoordinator, FetchError, Filter, Mutation, PageCache,
  PageEntry, PageKey, PageResponse, Pagination, Sort,
};

use super::{Fetches, QueryState, Settled};

/// The page currently on display.
#[derive(Debug, Clone)]
pub struct LoadedPage<T> {
  pub key: PageKey,
  pub page: Arc<PageResponse<T>>,
  pub fetched_at: DateTime<Utc>,
  /// Served from the page cache rather than a fetch
  pub from_cache: bool,
}

/// Pagination state machine for one list view.
///
/// Owns its page cache, so each view gets its own and dropping the view
/// drops the cache. Failed loads keep the previous page visible.
pub struct PagedQuery<T: Cacheable> {
  fetches: Fetches<T>,
  cache: PageCache<T>,
  filter: Filter,
  sort: Sort,
  pagination: Pagination,
  state: QueryState,
  page: Option<LoadedPage<T>>,
  /// Key of the most recent navigation; results for other keys are stale
  active: Option<PageKey>,
}

impl<T: Cacheable> PagedQuery<T> {
  pub fn new(
    coordinator: FetchCoordinator<T>,
    cache: PageCache<T>,
    page_size: u32,
  ) -> Result<Self, FetchError> {
    let page_size = validate_page_size(page_size)?;

    Ok(Self {
      fetches: Fetches::new(coordinator),
      cache,
      filter: Filter::default(),
      sort: Sort::default(),
      pagination: Pagination::new(page_size),
      state: QueryState::Idle,
      page: None,
      active: None,
    })
  }

  /// Set the initial filter before anything is loaded.
  pub fn with_filter(mut self, filter: Filter) -> Self {
    self.filter = filter;
    self
  }

  /// Set the initial sort before anything is loaded.
  pub fn with_sort(mut self, sort: Sort) -> Self {
    self.sort = sort;
    self
  }

  pub fn state(&self) -> &QueryState {
    &self.state
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.state.error()
  }

  pub fn pagination(&self) -> &Pagination {
    &self.pagination
  }

  pub fn filter(&self) -> &Filter {
    &self.filter
  }

  pub fn sort(&self) -> Sort {
    self.sort
  }

  pub fn page(&self) -> Option<&LoadedPage<T>> {
    self.page.as_ref()
  }

  /// Items of the last successfully loaded page (possibly stale).
  pub fn items(&self) -> &[T] {
    self
      .page
      .as_ref()
      .map(|p| p.page.items.as_slice())
      .unwrap_or(&[])
  }

  pub fn active_key(&self) -> Option<&PageKey> {
    self.active.as_ref()
  }

  pub fn cached_pages(&self) -> usize {
    self.cache.len()
  }

  pub fn fetches_in_flight(&self) -> usize {
    self.fetches.in_flight()
  }

  fn key_for(&self, page: u32) -> PageKey {
    PageKey::new(
      self.filter.clone(),
      self.sort,
      page,
      self.pagination.page_size(),
    )
  }

  // ==========================================================================
  // Navigation
  // ==========================================================================

  /// Jump to page `n`, clamped into range.
  pub fn go_to_page(&mut self, n: u32) {
    let page = self.pagination.go_to(n);
    self.load(page);
  }

  /// Advance one page. Returns false at the last page.
  pub fn next_page(&mut self) -> bool {
    if !self.pagination.has_next() {
      return false;
    }
    self.go_to_page(self.pagination.current_page() + 1);
    true
  }

  /// Go back one page. Returns false at the first page.
  pub fn previous_page(&mut self) -> bool {
    if !self.pagination.has_previous() {
      return false;
    }
    self.go_to_page(self.pagination.current_page() - 1);
    true
  }

  /// Change the page size and reload the (clamped) current page.
  pub fn set_page_size(&mut self, page_size: u32) -> Result<(), FetchError> {
    let page_size = validate_page_size(page_size)?;
    if page_size == self.pagination.page_size() {
      return Ok(());
    }

    self.pagination.set_page_size(page_size);
    self.load(self.pagination.current_page());
    Ok(())
  }

  /// Replace the filter. Invalidates every cached page and restarts at
  /// page 1.
  pub fn set_filter(&mut self, filter: Filter) {
    if filter == self.filter {
      return;
    }
    self.filter = filter;
    self.restart();
  }

  /// Replace the sort. Invalidates every cached page and restarts at page 1.
  pub fn set_sort(&mut self, sort: Sort) {
    if sort == self.sort {
      return;
    }
    self.sort = sort;
    self.restart();
  }

  fn restart(&mut self) {
    self.cache.invalidate_all();
    self.pagination.reset();
    self.load(1);
  }

  /// Drop trust in every cached page and reload the current one.
  pub fn refresh(&mut self) {
    self.cache.invalidate_all();
    self.fetches.invalidate();
    self.load(self.pagination.current_page());
  }

  /// Reload the current page after a failure.
  pub fn retry(&mut self) {
    self.load(self.pagination.current_page());
  }

  /// React to a completed create/update/delete.
  ///
  /// A fetch still outstanding at this point may have read the collection
  /// before the change, so its result is fetched again when it arrives.
  pub fn apply_mutation(&mut self, mutation: &Mutation) {
    self.fetches.invalidate();
    let affects_current = match mutation {
      Mutation::Created => {
        self.cache.invalidate_all();
        true
      }
      Mutation::Updated(id) | Mutation::Deleted(id) => {
        self.cache.invalidate_containing(id);
        self.page.as_ref().is_some_and(|p| p.page.contains(id))
      }
    };

    if affects_current && !self.state.is_loading() && self.page.is_some() {
      self.load(self.pagination.current_page());
    }
  }

  fn load(&mut self, page: u32) {
    let key = self.key_for(page);

    if self.state.is_loading() && self.active.as_ref() == Some(&key) {
      return;
    }

    let cached = self
      .cache
      .get(&key)
      .map(|entry| (Arc::clone(&entry.page), entry.fetched_at));

    if let Some((page, fetched_at)) = cached {
      self.pagination.set_total_items(page.total_items);
      self.page = Some(LoadedPage {
        key: key.clone(),
        page,
        fetched_at,
        from_cache: true,
      });
      self.active = Some(key);
      self.state = QueryState::Loaded;
      return;
    }

    self.fetches.start(&key);
    self.active = Some(key);
    self.state = QueryState::Loading;
  }

  // ==========================================================================
  // Results
  // ==========================================================================

  /// Apply any settled fetches without blocking.
  ///
  /// Returns `true` if the visible state changed. Call this from the event
  /// loop tick.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Some(settled) = self.fetches.try_next() {
      changed |= self.apply(settled);
    }
    changed
  }

  /// Wait until the active key has settled (loaded or failed).
  pub async fn settle(&mut self) -> &QueryState {
    while self.state.is_loading() {
      match self.fetches.next().await {
        Some(settled) => {
          self.apply(settled);
        }
        // Unreachable while we hold a sender
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

    if self.active.as_ref() != Some(&key) || !self.state.is_loading() {
      debug!(%key, "discarding stale page result");
      return false;
    }

    if !current {
      // Read before a mutation; never cache it
      debug!(%key, "page fetched before a mutation, fetching again");
      self.fetches.start(&key);
      return false;
    }

    match result {
      Ok(page) => {
        self
          .cache
          .put(key.clone(), PageEntry::new(Arc::clone(&page)));

        if self.pagination.set_total_items(page.total_items) {
          // Asked for a page past the end; land on the last one instead
          let target = self.pagination.current_page();
          debug!(requested = key.page, target, "requested page out of range");
          self.state = QueryState::Idle;
          self.load(target);
          return true;
        }

        self.page = Some(LoadedPage {
          key,
          page,
          fetched_at: Utc::now(),
          from_cache: false,
        });
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
  use std::num::NonZeroUsize;
  use std::time::Duration;

  fn query(source: &FakeSource, page_size: u32, capacity: usize) -> PagedQuery<TestItem> {
    let coordinator = FetchCoordinator::new(source.clone());
    let cache = PageCache::new(NonZeroUsize::new(capacity).unwrap());
    PagedQuery::new(coordinator, cache, page_size).unwrap()
  }

  fn ids(query: &PagedQuery<TestItem>) -> Vec<String> {
    query.items().iter().map(|i| i.id.clone()).collect()
  }

  #[tokio::test]
  async fn test_first_load() {
    let source = FakeSource::new(45);
    let mut q = query(&source, 20, 4);
    assert_eq!(q.state(), &QueryState::Idle);

    q.go_to_page(1);
    assert!(q.is_loading());
    assert!(q.settle().await.is_loaded());

    assert_eq!(q.items().len(), 20);
    assert_eq!(q.pagination().total_pages(), Some(3));
    assert!(q.pagination().has_next());
    assert!(!q.pagination().has_previous());
    assert_eq!(q.cached_pages(), 1);
  }

  #[tokio::test]
  async fn test_go_to_page_clamps_to_last() {
    let source = FakeSource::new(45);
    let mut q = query(&source, 20, 4);
    q.go_to_page(1);
    q.settle().await;

    q.go_to_page(5);
    assert_eq!(q.pagination().current_page(), 3);
    q.settle().await;
    assert_eq!(q.items().len(), 5);
    assert_eq!(source.requested_pages(), vec![1, 3]);
  }

  #[tokio::test]
  async fn test_out_of_range_before_total_known() {
    let source = FakeSource::new(45);
    let mut q = query(&source, 20, 4);

    q.go_to_page(9);
    assert!(q.settle().await.is_loaded());
    assert_eq!(q.pagination().current_page(), 3);
    assert_eq!(q.page().unwrap().key.page, 3);
    assert_eq!(source.requested_pages(), vec![9, 3]);
  }

  #[tokio::test]
  async fn test_current_page_stays_in_range() {
    let source = FakeSource::new(45);
    let mut q = query(&source, 20, 8);
    q.go_to_page(1);
    q.settle().await;

    for n in [0, 7, 2, 100, 1, 3, 4] {
      q.go_to_page(n);
      q.settle().await;
      let page = q.pagination().current_page();
      assert!((1..=3).contains(&page), "page {} escaped range", page);
    }
  }

  #[tokio::test]
  async fn test_revisit_is_served_from_cache() {
    let source = FakeSource::new(45);
    let mut q = query(&source, 20, 4);
    q.go_to_page(1);
    q.settle().await;
    assert_eq!(source.calls(), 1);

    // Same page again: no fetch, loaded immediately
    q.go_to_page(1);
    assert!(q.state().is_loaded());
    assert!(q.page().unwrap().from_cache);
    assert_eq!(source.calls(), 1);

    q.next_page();
    q.settle().await;
    q.previous_page();
    assert!(q.state().is_loaded());
    assert_eq!(source.calls(), 2);
  }

  #[tokio::test]
  async fn test_boundaries_are_noops() {
    let source = FakeSource::new(15);
    let mut q = query(&source, 10, 4);
    q.go_to_page(1);
    q.settle().await;

    assert!(!q.previous_page());
    assert!(q.next_page());
    q.settle().await;
    assert!(!q.next_page());
    assert!(q.error().is_none());
    assert_eq!(source.calls(), 2);
  }

  #[tokio::test]
  async fn test_lru_bound_evicts_first_page() {
    let source = FakeSource::new(100);
    let mut q = query(&source, 10, 2);
    for page in 1..=3 {
      q.go_to_page(page);
      q.settle().await;
    }
    assert_eq!(q.cached_pages(), 2);

    // Page 3 and 2 are cached, page 1 was evicted
    q.go_to_page(2);
    assert!(q.state().is_loaded());
    assert_eq!(source.calls(), 3);

    q.go_to_page(1);
    assert!(q.is_loading());
    q.settle().await;
    assert_eq!(source.calls(), 4);
  }

  #[tokio::test]
  async fn test_filter_change_discards_in_flight_result() {
    let source = FakeSource::new(100).with_delay(Duration::from_millis(30));
    let mut q = query(&source, 10, 4);
    q.go_to_page(1);
    q.settle().await;

    q.go_to_page(2);
    assert!(q.is_loading());
    q.set_filter(Filter::parse(&["status=done"]).unwrap());
    assert_eq!(q.pagination().current_page(), 1);

    q.settle().await;
    assert_eq!(q.page().unwrap().key.page, 1);
    assert!(q.items().iter().all(|i| i.view == "status=done"));

    // The page 2 result had landed in the channel too, and was ignored
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!q.poll());
    assert_eq!(q.page().unwrap().key.page, 1);
  }

  #[tokio::test]
  async fn test_filter_change_invalidates_cache() {
    let source = FakeSource::new(100);
    let mut q = query(&source, 10, 4);
    q.go_to_page(1);
    q.settle().await;
    q.go_to_page(2);
    q.settle().await;

    q.set_filter(Filter::parse(&["assignee=Sam"]).unwrap());
    q.settle().await;
    q.set_filter(Filter::default());
    // Back on the original view, but its entries were invalidated
    assert!(q.is_loading());
    q.settle().await;
    assert_eq!(source.calls(), 4);
  }

  #[tokio::test]
  async fn test_sort_change_restarts() {
    let source = FakeSource::new(100);
    let mut q = query(&source, 10, 4);
    q.go_to_page(4);
    q.settle().await;

    q.set_sort("-points".parse().unwrap());
    assert_eq!(q.pagination().current_page(), 1);
    q.settle().await;
    assert_eq!(q.active_key().unwrap().sort, q.sort());
  }

  #[tokio::test]
  async fn test_sort_change_invalidates_cache() {
    let source = FakeSource::new(100);
    let mut q = query(&source, 10, 4);
    q.go_to_page(1);
    q.settle().await;
    q.go_to_page(2);
    q.settle().await;

    q.set_sort("title:asc".parse().unwrap());
    q.settle().await;
    assert_eq!(source.calls(), 3);

    // Same sort again is not a change
    q.set_sort("title:asc".parse().unwrap());
    assert!(q.state().is_loaded());
    assert_eq!(source.calls(), 3);

    // Back on the default sort, but its entries were invalidated
    q.set_sort(Sort::default());
    assert!(q.is_loading());
    q.settle().await;
    assert_eq!(source.calls(), 4);
  }

  #[tokio::test]
  async fn test_error_keeps_previous_page() {
    let source = FakeSource::new(45);
    let mut q = query(&source, 20, 4);
    q.go_to_page(1);
    q.settle().await;
    let before = ids(&q);

    source.set_failing(true);
    q.go_to_page(2);
    assert!(q.settle().await.is_error());
    assert_eq!(ids(&q), before);
    assert!(q.error().unwrap().is_retryable());

    // No automatic retry
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(source.calls(), 2);

    source.set_failing(false);
    q.retry();
    assert!(q.settle().await.is_loaded());
    assert_eq!(q.page().unwrap().key.page, 2);
    assert_eq!(source.calls(), 3);
  }

  #[tokio::test]
  async fn test_set_page_size() {
    let source = FakeSource::new(45);
    let mut q = query(&source, 10, 8);
    q.go_to_page(5);
    q.settle().await;
    assert_eq!(q.pagination().total_pages(), Some(5));

    q.set_page_size(20).unwrap();
    assert_eq!(q.pagination().total_pages(), Some(3));
    assert_eq!(q.pagination().current_page(), 3);
    q.settle().await;
    assert_eq!(q.active_key().unwrap().page_size, 20);
    assert_eq!(q.items().len(), 5);

    assert!(matches!(q.set_page_size(0), Err(FetchError::Validation(_))));
    assert_eq!(q.pagination().page_size(), 20);
  }

  #[tokio::test]
  async fn test_update_mutation_reloads_affected_page() {
    let source = FakeSource::new(30);
    let mut q = query(&source, 10, 4);
    q.go_to_page(1);
    q.settle().await;
    q.go_to_page(2);
    q.settle().await;
    assert_eq!(source.calls(), 2);

    // An item on page 1 changed: page 2 stays cached, page 1 does not
    q.apply_mutation(&Mutation::Updated("p1-3".to_string()));
    assert!(q.state().is_loaded());
    assert_eq!(source.calls(), 2);

    q.go_to_page(1);
    assert!(q.is_loading());
    q.settle().await;
    q.go_to_page(2);
    assert!(q.state().is_loaded());
    assert_eq!(source.calls(), 3);

    // Current page affected: reload right away
    q.apply_mutation(&Mutation::Deleted("p2-12".to_string()));
    assert!(q.is_loading());
    q.settle().await;
    assert_eq!(source.calls(), 4);
  }

  #[tokio::test]
  async fn test_created_mutation_invalidates_everything() {
    let source = FakeSource::new(30);
    let mut q = query(&source, 10, 4);
    q.go_to_page(1);
    q.settle().await;

    source.set_total(31);
    q.apply_mutation(&Mutation::Created);
    q.settle().await;
    assert_eq!(q.pagination().total_pages(), Some(4));
    assert_eq!(source.calls(), 2);
  }

  #[tokio::test]
  async fn test_created_while_page_in_flight_refetches() {
    let source = FakeSource::new(30).with_delay(Duration::from_millis(20));
    let mut q = query(&source, 10, 4);
    q.go_to_page(2);
    assert!(q.is_loading());

    // The page 2 fetch already read 30 items
    source.set_total(31);
    q.apply_mutation(&Mutation::Created);
    assert!(q.settle().await.is_loaded());
    assert_eq!(q.pagination().total_pages(), Some(4));
    assert_eq!(q.page().unwrap().page.total_items, 31);
    assert_eq!(source.requested_pages(), vec![2, 2]);

    // Only the post-mutation page was cached
    q.go_to_page(1);
    q.settle().await;
    q.go_to_page(2);
    let page = q.page().unwrap();
    assert!(page.from_cache);
    assert_eq!(page.page.total_items, 31);
    assert_eq!(source.calls(), 3);
  }

  #[tokio::test]
  async fn test_returning_to_in_flight_page_waits_for_it() {
    let source = FakeSource::new(30).with_delay(Duration::from_millis(20));
    let mut q = query(&source, 10, 4);
    q.go_to_page(1);
    q.settle().await;

    q.go_to_page(2);
    q.go_to_page(1);
    assert!(q.state().is_loaded());
    q.go_to_page(2);
    assert!(q.settle().await.is_loaded());
    assert_eq!(q.page().unwrap().key.page, 2);
    assert_eq!(source.requested_pages(), vec![1, 2]);
  }

  #[tokio::test]
  async fn test_refresh_refetches_current() {
    let source = FakeSource::new(30);
    let mut q = query(&source, 10, 4);
    q.go_to_page(1);
    q.settle().await;

    q.refresh();
    assert!(q.is_loading());
    q.settle().await;
    assert_eq!(source.calls(), 2);
  }

  #[tokio::test]
  async fn test_poll_applies_without_blocking() {
    let source = FakeSource::new(30).with_delay(Duration::from_millis(10));
    let mut q = query(&source, 10, 4);
    q.go_to_page(1);
    assert!(!q.poll());

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(q.poll());
    assert!(q.state().is_loaded());
  }
}
