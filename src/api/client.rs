use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::api::api_types::{ApiNewTask, ApiStatusUpdate, ApiTask, ApiTaskPage};
use crate::api::types::{NewTask, Task};
use crate::config::Config;
use crate::list::{
  Cacheable, FetchError, FilterField, Mutation, PageKey, PageResponse, PageSource,
};

/// Longest server error body kept in a `FetchError`
const MAX_ERROR_BODY: usize = 200;

/// TaskTracker API client
#[derive(Clone)]
pub struct TaskClient {
  http: reqwest::Client,
  base: Url,
}

impl TaskClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid API url {}: {}", config.api.url, e))?;
    Self::with_base(base, Config::get_api_token())
  }

  pub fn with_base(base: Url, token: Option<String>) -> Result<Self> {
    if base.cannot_be_a_base() {
      return Err(eyre!("API url {} cannot be used as a base", base));
    }

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(token) = token {
      let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("API token is not a valid header value: {}", e))?;
      value.set_sensitive(true);
      headers.insert(AUTHORIZATION, value);
    }

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  /// `{base}/tasks`, plus `/{id}` when given.
  fn task_url(&self, id: Option<&str>) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
      segments.pop_if_empty().push(Task::entity_type());
      if let Some(id) = id {
        segments.push(id);
      }
    }
    url
  }

  /// Collection URL for one page, filters and sort as query parameters.
  pub fn page_url(&self, key: &PageKey) -> Url {
    let mut url = self.task_url(None);
    url.query_pairs_mut().extend_pairs(key.query_pairs());
    url
  }

  /// Fetch one page of tasks
  pub async fn fetch_tasks(&self, key: &PageKey) -> Result<PageResponse<Task>, FetchError> {
    let url = self.page_url(key);
    debug!(%url, "fetching task page");

    let response = self.http.get(url).send().await.map_err(network)?;
    let page: ApiTaskPage = decode(response).await?;
    Ok(page.into())
  }

  /// Move a task to another status
  pub async fn update_task_status(&self, id: &str, status: &str) -> Result<Mutation, FetchError> {
    let status = FilterField::Status.normalize(status)?;
    let response = self
      .http
      .patch(self.task_url(Some(id)))
      .json(&ApiStatusUpdate { status: &status })
      .send()
      .await
      .map_err(network)?;
    check(response).await?;

    Ok(Mutation::Updated(id.to_string()))
  }

  /// Create a task
  pub async fn create_task(&self, task: &NewTask) -> Result<(Task, Mutation), FetchError> {
    if task.title.trim().is_empty() {
      return Err(FetchError::validation("task title is required"));
    }

    let response = self
      .http
      .post(self.task_url(None))
      .json(&ApiNewTask::from(task))
      .send()
      .await
      .map_err(network)?;
    let created: ApiTask = decode(response).await?;

    Ok((created.into_task(), Mutation::Created))
  }

  /// Delete a task
  pub async fn delete_task(&self, id: &str) -> Result<Mutation, FetchError> {
    let response = self
      .http
      .delete(self.task_url(Some(id)))
      .send()
      .await
      .map_err(network)?;
    check(response).await?;

    Ok(Mutation::Deleted(id.to_string()))
  }
}

impl PageSource<Task> for TaskClient {
  fn fetch_page(&self, key: &PageKey) -> BoxFuture<'static, Result<PageResponse<Task>, FetchError>> {
    let client = self.clone();
    let key = key.clone();
    async move { client.fetch_tasks(&key).await }.boxed()
  }
}

fn network(e: reqwest::Error) -> FetchError {
  FetchError::Network(e.to_string())
}

/// Turn a non-2xx response into a `FetchError::Server`.
async fn check(response: Response) -> Result<Response, FetchError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response.text().await.unwrap_or_default();
  Err(server_error(status, &body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, FetchError> {
  let response = check(response).await?;
  let status = response.status();
  let bytes = response.bytes().await.map_err(network)?;

  serde_json::from_slice(&bytes).map_err(|e| FetchError::Server {
    status: status.as_u16(),
    message: format!("malformed response: {}", e),
  })
}

fn server_error(status: StatusCode, body: &str) -> FetchError {
  let body = body.trim();
  let message = if body.is_empty() {
    status.canonical_reason().unwrap_or("no details").to_string()
  } else {
    body.chars().take(MAX_ERROR_BODY).collect()
  };

  FetchError::Server {
    status: status.as_u16(),
    message,
  }
}
