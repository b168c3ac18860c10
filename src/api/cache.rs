//! Caching implementations for TaskTracker types.

use crate::list::Cacheable;

use super::types::Task;

impl Cacheable for Task {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "tasks"
  }
}
