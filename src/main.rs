mod api;
mod app;
mod commands;
mod config;
mod event;
mod list;
mod logging;
mod query;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use crate::config::ListMode;
use crate::list::{Filter, Sort};

#[derive(Parser, Debug)]
#[command(name = "taskpager")]
#[command(about = "Browse TaskTracker family tasks page by page")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/taskpager/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Tasks per page (overrides lists.page_size)
  #[arg(short = 's', long)]
  page_size: Option<u32>,

  /// Filter expression, e.g. status=todo or points=1..5 (repeatable)
  #[arg(short, long = "filter")]
  filters: Vec<String>,

  /// Sort expression, e.g. due, -points or title:asc
  #[arg(short = 'o', long)]
  sort: Option<String>,

  /// Accumulate pages with "more" instead of paging
  #[arg(long)]
  feed: bool,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging, args.log_file.as_deref())?;

  // Reject malformed filters before anything touches the network
  let options = app::ViewOptions {
    filter: Filter::parse(&args.filters)?,
    sort: match args.sort.as_deref() {
      Some(s) => s.parse::<Sort>()?,
      None => Sort::default(),
    },
    page_size: args
      .page_size
      .map(list::validate_page_size)
      .transpose()?,
    mode: args.feed.then_some(ListMode::Feed),
  };

  tracing::info!(url = %config.api.url, "starting taskpager");

  // Initialize and run the app
  let mut app = app::App::new(&config, options)?;
  app.run().await?;

  Ok(())
}
