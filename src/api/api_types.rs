//! Serde types matching TaskTracker API payloads.
//!
//! These types are separate from domain types to allow lenient
//! deserialization while keeping domain types focused on list views.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::list::PageResponse;

use super::types::{NewTask, Task};

/// Task ids arrive as numbers from older deployments and strings from newer
/// ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiId {
  Number(u64),
  Text(String),
}

impl From<ApiId> for String {
  fn from(id: ApiId) -> Self {
    match id {
      ApiId::Number(n) => n.to_string(),
      ApiId::Text(s) => s,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  #[serde(rename = "displayName")]
  pub display_name: String,
}

/// Assignee is either a bare name or an embedded user object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiAssignee {
  Name(String),
  User(ApiUser),
}

impl From<ApiAssignee> for String {
  fn from(assignee: ApiAssignee) -> Self {
    match assignee {
      ApiAssignee::Name(name) => name,
      ApiAssignee::User(user) => user.display_name,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTask {
  pub id: ApiId,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub status: String,
  pub assignee: Option<ApiAssignee>,
  pub category: Option<String>,
  pub priority: Option<String>,
  pub due_date: Option<String>,
  #[serde(default)]
  pub points: u32,
  pub updated_at: Option<DateTime<Utc>>,
}

impl ApiTask {
  pub fn into_task(self) -> Task {
    Task {
      id: self.id.into(),
      title: self.title,
      status: self.status.to_lowercase(),
      assignee: self.assignee.map(String::from),
      category: self.category,
      priority: self.priority.map(|p| p.to_lowercase()),
      due_date: self.due_date.as_deref().and_then(parse_due_date),
      points: self.points,
      updated_at: self.updated_at,
    }
  }
}

/// Due dates come either as plain dates or as full timestamps.
fn parse_due_date(s: &str) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

// ============================================================================
// Collection endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTaskPage {
  #[serde(default)]
  pub items: Vec<ApiTask>,
  pub total_count: u64,
}

impl From<ApiTaskPage> for PageResponse<Task> {
  fn from(page: ApiTaskPage) -> Self {
    PageResponse {
      items: page.items.into_iter().map(ApiTask::into_task).collect(),
      total_items: page.total_count,
    }
  }
}

// ============================================================================
// Mutation bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiStatusUpdate<'a> {
  pub status: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNewTask<'a> {
  pub title: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assignee: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
  pub points: u32,
}

impl<'a> From<&'a NewTask> for ApiNewTask<'a> {
  fn from(task: &'a NewTask) -> Self {
    Self {
      title: &task.title,
      assignee: task.assignee.as_deref(),
      category: task.category.as_deref(),
      priority: task.priority.as_deref(),
      due_date: task.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
      points: task.points,
    }
  }
}
