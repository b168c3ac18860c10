use chrono::{DateTime, NaiveDate, Utc};

/// A family task as shown in list views
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
  pub id: String,
  pub title: String,
  pub status: String, // "todo", "in_progress" or "done"
  pub assignee: Option<String>,
  pub category: Option<String>,
  pub priority: Option<String>,
  pub due_date: Option<NaiveDate>,
  pub points: u32,
  pub updated_at: Option<DateTime<Utc>>,
}

/// Fields for creating a task
#[derive(Debug, Clone, Default)]
pub struct NewTask {
  pub title: String,
  pub assignee: Option<String>,
  pub category: Option<String>,
  pub priority: Option<String>,
  pub due_date: Option<NaiveDate>,
  pub points: u32,
}
