//! Page keys for cache lookups and in-flight de-duplication.

use sha2::{Digest, Sha256};
use std::fmt;

use super::filter::{Filter, Sort};

/// Identifies one page of one view of a collection.
///
/// Equality is structural: two keys built from equal filters, sorts, page
/// numbers and page sizes are equal regardless of how they were built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
  pub filter: Filter,
  pub sort: Sort,
  /// 1-indexed page number
  pub page: u32,
  pub page_size: u32,
}

impl PageKey {
  pub fn new(filter: Filter, sort: Sort, page: u32, page_size: u32) -> Self {
    Self {
      filter,
      sort,
      page,
      page_size,
    }
  }

  /// Deterministic serialized form.
  pub fn serialized(&self) -> String {
    format!(
      "filter={}|sort={}|page={}|size={}",
      self.filter.canonical(),
      self.sort.canonical(),
      self.page,
      self.page_size
    )
  }

  /// SHA256 of the serialized form, for stable fixed-length map keys.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.serialized().as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Query parameters for a collection request.
  pub fn query_pairs(&self) -> Vec<(String, String)> {
    let mut pairs = vec![
      ("page".to_string(), self.page.to_string()),
      ("pageSize".to_string(), self.page_size.to_string()),
    ];
    pairs.extend(self.sort.query_pairs());
    pairs.extend(self.filter.query_pairs());
    pairs
  }
}

impl fmt::Display for PageKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "page {} (size {}, sort {}, filter {})",
      self.page, self.page_size, self.sort, self.filter
    )
  }
}
