//! TaskTracker backend API: wire types, domain types and the HTTP client.

pub mod api_types;
pub mod cache;
pub mod client;
pub mod types;

pub use client::TaskClient;
pub use types::{NewTask, Task};
