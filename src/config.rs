use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub lists: ListsConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the TaskTracker API (e.g., "https://tasks.example.com/api")
  pub url: String,
}

/// How list views present a collection
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
  /// Discrete pages with next/prev/jump navigation
  #[default]
  Pages,
  /// One growing list, extended with "load more"
  Feed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListsConfig {
  #[serde(default = "default_page_size")]
  pub page_size: u32,
  /// Pages kept per list view before the least recently used is evicted
  #[serde(default = "default_max_cached_pages")]
  pub max_cached_pages: NonZeroUsize,
  /// Cached pages older than this are refetched; 0 disables expiry
  #[serde(default = "default_stale_after_secs")]
  pub stale_after_secs: u64,
  #[serde(default)]
  pub mode: ListMode,
}

impl Default for ListsConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
      max_cached_pages: default_max_cached_pages(),
      stale_after_secs: default_stale_after_secs(),
      mode: ListMode::default(),
    }
  }
}

fn default_page_size() -> u32 {
  20
}

fn default_max_cached_pages() -> NonZeroUsize {
  NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN)
}

fn default_stale_after_secs() -> u64 {
  300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// Default level directive; RUST_LOG overrides it
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./taskpager.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/taskpager/config.yaml
  /// 4. ~/.config/taskpager/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/taskpager/config.yaml\n\
                 with at least:\n\napi:\n  url: https://tasks.example.com/api"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("taskpager.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("taskpager").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    crate::list::validate_page_size(config.lists.page_size)?;
    Ok(config)
  }

  /// Stale threshold for cached pages, if enabled.
  pub fn stale_after(&self) -> Option<chrono::Duration> {
    match self.lists.stale_after_secs {
      0 => None,
      secs => i64::try_from(secs).ok().map(chrono::Duration::seconds),
    }
  }

  /// Get the API token from environment variables.
  ///
  /// Checks TASKPAGER_API_TOKEN first, then TASKTRACKER_API_TOKEN as
  /// fallback. The API may allow anonymous reads, so a missing token is not
  /// an error.
  pub fn get_api_token() -> Option<String> {
    std::env::var("TASKPAGER_API_TOKEN")
      .or_else(|_| std::env::var("TASKTRACKER_API_TOKEN"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
