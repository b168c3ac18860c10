//! Client-side incremental data cache for paged collections.
//!
//! This module is backend-agnostic. It provides:
//! - A closed filter/sort model with deterministic serialization
//! - Structural page keys
//! - A bounded LRU page cache with validity flags
//! - A fetch coordinator that de-duplicates in-flight requests
//! - The pagination descriptor shared by the queries

mod coordinator;
mod error;
mod filter;
mod key;
mod page_cache;
mod pagination;
mod traits;

#[cfg(test)]
pub mod testing;

pub use coordinator::{FetchCoordinator, FetchResult};
pub use error::FetchError;
pub use filter::{validate_page_size, Filter, FilterField, Sort};
pub use key::PageKey;
pub use page_cache::{PageCache, PageEntry};
pub use pagination::Pagination;
pub use traits::{Cacheable, Mutation, PageResponse, PageSource};
