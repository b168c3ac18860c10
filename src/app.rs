use chrono::Local;
use color_eyre::Result;
use std::io::Write;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::{NewTask, Task, TaskClient};
use crate::commands::{self, Action, ParseError};
use crate::config::{Config, ListMode};
use crate::event::{Event, EventHandler};
use crate::list::{FetchCoordinator, FetchError, Filter, Mutation, PageCache, Sort};
use crate::query::{InfiniteQuery, PagedQuery, QueryState};

/// Active list view - each variant owns its query and cache
pub enum ListView {
  Pages(PagedQuery<Task>),
  Feed(InfiniteQuery<Task>),
}

/// Startup options that override configuration
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
  pub filter: Filter,
  pub sort: Sort,
  pub page_size: Option<u32>,
  pub mode: Option<ListMode>,
}

/// Main application state
pub struct App {
  view: ListView,

  /// TaskTracker client, also used for mutations
  client: TaskClient,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: &Config, options: ViewOptions) -> Result<Self> {
    let client = TaskClient::new(config)?;
    let coordinator = FetchCoordinator::new(client.clone());
    let page_size = options.page_size.unwrap_or(config.lists.page_size);

    let view = match options.mode.unwrap_or(config.lists.mode) {
      ListMode::Pages => {
        let mut cache = PageCache::new(config.lists.max_cached_pages);
        if let Some(max_age) = config.stale_after() {
          cache = cache.with_max_age(max_age);
        }
        ListView::Pages(
          PagedQuery::new(coordinator, cache, page_size)?
            .with_filter(options.filter)
            .with_sort(options.sort),
        )
      }
      ListMode::Feed => ListView::Feed(
        InfiniteQuery::new(coordinator, page_size)?
          .with_filter(options.filter)
          .with_sort(options.sort),
      ),
    };

    Ok(Self {
      view,
      client,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(100));

    // Initial data load
    match &mut self.view {
      ListView::Pages(query) => query.go_to_page(1),
      ListView::Feed(query) => {
        query.load_more();
      }
    }
    println!("Loading tasks... (type 'help' for commands)");

    while !self.should_quit {
      match events.next().await {
        Some(Event::Line(line)) => self.handle_line(&line).await,
        Some(Event::Tick) => {
          if self.poll() {
            self.render();
          }
        }
        Some(Event::Eof) | None => {
          // Let a pending load finish so piped sessions see their output
          if self.settle().await {
            self.render();
          }
          self.should_quit = true;
        }
      }
    }

    Ok(())
  }

  fn poll(&mut self) -> bool {
    match &mut self.view {
      ListView::Pages(query) => query.poll(),
      ListView::Feed(query) => query.poll(),
    }
  }

  /// Wait for an outstanding load. Returns true if one was waited for.
  async fn settle(&mut self) -> bool {
    match &mut self.view {
      ListView::Pages(query) => {
        let waited = query.is_loading();
        query.settle().await;
        waited
      }
      ListView::Feed(query) => {
        let waited = query.state().is_loading();
        query.settle().await;
        waited
      }
    }
  }

  async fn handle_line(&mut self, line: &str) {
    match commands::parse(line) {
      Ok(action) => self.handle_action(action).await,
      Err(ParseError::Empty) => {}
      Err(ParseError::Unknown { input, suggestions }) => {
        if suggestions.is_empty() {
          println!("Unknown command '{}'", input);
        } else {
          println!(
            "Unknown command '{}'. Did you mean: {}?",
            input,
            suggestions.join(", ")
          );
        }
      }
      Err(ParseError::Usage(cmd)) => println!("Usage: {}", cmd.usage),
      Err(ParseError::Invalid(e)) => println!("{}", e),
    }
  }

  async fn handle_action(&mut self, action: Action) {
    match action {
      Action::Quit => self.should_quit = true,
      Action::Help => print_help(),
      Action::Status => self.print_status(),
      Action::Add(title) => {
        let task = NewTask {
          title,
          ..Default::default()
        };
        let result = self.client.create_task(&task).await.map(|(created, mutation)| {
          println!("{}", format_task(&created));
          mutation
        });
        self.after_mutation(&task.title, result);
      }
      Action::Done(id) => {
        let result = self.client.update_task_status(&id, "done").await;
        self.after_mutation(&id, result);
      }
      Action::Delete(id) => {
        let result = self.client.delete_task(&id).await;
        self.after_mutation(&id, result);
      }
      action => self.navigate(action),
    }
  }

  fn navigate(&mut self, action: Action) {
    let moved = match (&mut self.view, action) {
      (ListView::Pages(q), Action::Next) => q.next_page(),
      (ListView::Pages(q), Action::Prev) => q.previous_page(),
      (ListView::Pages(q), Action::Page(n)) => {
        q.go_to_page(n);
        true
      }
      (ListView::Feed(q), Action::More | Action::Next) => q.load_more(),
      (ListView::Pages(q), Action::Size(n)) => report(q.set_page_size(n)),
      (ListView::Feed(q), Action::Size(n)) => report(q.set_page_size(n)),
      (ListView::Pages(q), Action::Filter(f)) => {
        q.set_filter(f);
        true
      }
      (ListView::Feed(q), Action::Filter(f)) => {
        q.set_filter(f);
        true
      }
      (ListView::Pages(q), Action::Sort(s)) => {
        q.set_sort(s);
        true
      }
      (ListView::Feed(q), Action::Sort(s)) => {
        q.set_sort(s);
        true
      }
      (ListView::Pages(q), Action::Refresh) => {
        q.refresh();
        true
      }
      (ListView::Feed(q), Action::Refresh) => {
        q.reset();
        true
      }
      (ListView::Pages(q), Action::Retry) => {
        q.retry();
        true
      }
      (ListView::Feed(q), Action::Retry) => q.load_more(),
      (ListView::Pages(_), Action::More) => {
        println!("'more' only applies in feed mode; use 'next'");
        return;
      }
      (ListView::Feed(_), Action::Prev | Action::Page(_)) => {
        println!("Feed mode only moves forward; use 'more'");
        return;
      }
      _ => return,
    };

    if !moved {
      println!("Nothing more to load");
      return;
    }

    // Cache hits settle immediately
    let settled = match &self.view {
      ListView::Pages(q) => !q.is_loading(),
      ListView::Feed(q) => !q.state().is_loading(),
    };
    if settled {
      self.render();
    }
  }

  /// Report a create/update/delete and let the view catch up.
  fn after_mutation(&mut self, subject: &str, result: Result<Mutation, FetchError>) {
    let mutation = match result {
      Ok(mutation) => mutation,
      Err(e) => {
        warn!(subject, error = %e, "task mutation failed");
        println!("Could not change {}: {}", subject, e);
        return;
      }
    };

    info!(subject, ?mutation, "task mutated");
    println!("{}", mutation_message(&mutation));
    match &mut self.view {
      ListView::Pages(q) => q.apply_mutation(&mutation),
      ListView::Feed(q) => {
        let shown = match &mutation {
          // New tasks shift every later page
          Mutation::Created => true,
          Mutation::Updated(id) | Mutation::Deleted(id) => q.items().iter().any(|t| &t.id == id),
        };
        if shown {
          q.reset();
        }
      }
    }
  }

  fn render(&self) {
    let mut out = std::io::stdout().lock();
    let lines = match &self.view {
      ListView::Pages(q) => render_pages(q),
      ListView::Feed(q) => render_feed(q),
    };
    for line in lines {
      let _ = writeln!(out, "{}", line);
    }
  }

  fn print_status(&self) {
    match &self.view {
      ListView::Pages(q) => {
        let p = q.pagination();
        println!(
          "pages mode: page {} of {}, size {}, {} cached pages, state {}",
          p.current_page(),
          p.total_pages()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string()),
          p.page_size(),
          q.cached_pages(),
          state_label(q.state())
        );
        if let Some(key) = q.active_key() {
          println!("showing {}", key);
        }
        println!("{} fetches in flight", q.fetches_in_flight());
      }
      ListView::Feed(q) => {
        println!(
          "feed mode: {} tasks loaded over {} pages, size {}, state {}",
          q.items().len(),
          q.highest_page(),
          q.page_size(),
          state_label(q.state())
        );
        println!("filter {} | sort {}", q.filter(), q.sort());
        println!("{} fetches in flight", q.fetches_in_flight());
      }
    }
  }
}

fn report(result: Result<(), FetchError>) -> bool {
  match result {
    Ok(()) => true,
    Err(e) => {
      println!("{}", e);
      false
    }
  }
}

fn print_help() {
  for cmd in commands::COMMANDS {
    println!("  {:<44} {}", cmd.usage, cmd.description);
  }
  let fields: Vec<&str> = crate::list::FilterField::all_variants()
    .iter()
    .map(|f| f.name())
    .collect();
  println!("Filter fields: {}", fields.join(", "));
}

fn state_label(state: &QueryState) -> &'static str {
  if state.is_loading() {
    "loading"
  } else if state.is_loaded() {
    "loaded"
  } else if state.is_error() {
    "error"
  } else {
    "idle"
  }
}

fn mutation_message(mutation: &Mutation) -> String {
  match mutation {
    Mutation::Created => "Task created".to_string(),
    Mutation::Updated(id) => format!("Updated {}", id),
    Mutation::Deleted(id) => format!("Deleted {}", id),
  }
}

fn render_pages(query: &PagedQuery<Task>) -> Vec<String> {
  let mut lines = Vec::new();
  let p = query.pagination();

  if let Some(e) = query.error() {
    lines.push(format!("! {}", e));
    if query.page().is_some() {
      lines.push("! Showing the last loaded page".to_string());
    }
    if e.is_retryable() {
      lines.push("! Type 'retry' to try again".to_string());
    }
  }

  let source = match query.page() {
    Some(page) if page.from_cache => format!(
      " (cached {})",
      page.fetched_at.with_timezone(&Local).format("%H:%M:%S")
    ),
    _ => String::new(),
  };
  lines.push(format!(
    "Page {}/{} | {} tasks | sort {} | filter {}{}",
    query.page().map(|l| l.key.page).unwrap_or(p.current_page()),
    p.total_pages()
      .map(|n| n.to_string())
      .unwrap_or_else(|| "?".to_string()),
    p.total_items().unwrap_or(0),
    query.sort(),
    query.filter(),
    source
  ));
  lines.extend(query.items().iter().map(format_task));
  if query.items().is_empty() {
    lines.push("  (no tasks)".to_string());
  }
  lines
}

fn render_feed(query: &InfiniteQuery<Task>) -> Vec<String> {
  let mut lines = Vec::new();
  if let QueryState::Error(e) = query.state() {
    lines.push(format!("! {}", e));
  }

  lines.push(format!(
    "{} of {} tasks | sort {} | filter {}",
    query.items().len(),
    query.total_items().unwrap_or(0),
    query.sort(),
    query.filter()
  ));
  lines.extend(query.items().iter().map(format_task));
  if query.has_more() {
    lines.push("  ... type 'more' to load the next page".to_string());
  }
  lines
}

fn format_task(task: &Task) -> String {
  let mut details = Vec::new();
  if let Some(assignee) = &task.assignee {
    details.push(assignee.clone());
  }
  if let Some(priority) = &task.priority {
    details.push(priority.clone());
  }
  if let Some(due) = task.due_date {
    details.push(format!("due {}", due));
  }
  if task.points > 0 {
    details.push(format!("{} pts", task.points));
  }

  let details = if details.is_empty() {
    String::new()
  } else {
    format!("  ({})", details.join(", "))
  };
  format!("  {:<8} [{}] {}{}", task.id, task.status, task.title, details)
}
