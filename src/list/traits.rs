//! Core traits and types shared by the cache, the coordinator and the
//! queries.

use futures::future::BoxFuture;

use super::error::FetchError;
use super::key::PageKey;

/// Trait for collection items that can be cached by page.
pub trait Cacheable: Clone + Send + Sync + 'static {
  /// Unique identifier for this item (e.g., task id)
  fn cache_key(&self) -> String;

  /// Collection name, used as the endpoint path segment (e.g., "tasks")
  fn entity_type() -> &'static str;
}

/// One page of a collection as returned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse<T> {
  /// Items on this page, in server order
  pub items: Vec<T>,
  /// Total items across all pages for the requested filter
  pub total_items: u64,
}

impl<T: Cacheable> PageResponse<T> {
  pub fn contains(&self, item_id: &str) -> bool {
    self.items.iter().any(|item| item.cache_key() == item_id)
  }
}

/// Backend seam: anything that can fetch one page for a key.
///
/// The returned future must not borrow from `self` so that it can be
/// driven from a spawned task and shared between waiters.
pub trait PageSource<T>: Send + Sync + 'static {
  fn fetch_page(&self, key: &PageKey) -> BoxFuture<'static, Result<PageResponse<T>, FetchError>>;
}

/// A completed change to the underlying collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
  /// A new item exists; any page may have shifted
  Created,
  /// The item with this id changed
  Updated(String),
  /// The item with this id is gone
  Deleted(String),
}
