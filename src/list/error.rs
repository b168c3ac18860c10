use thiserror::Error;

/// Errors surfaced by page fetches.
///
/// `Clone` because a single in-flight fetch hands its result to every
/// waiter sharing it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  /// The request could not complete (connection, DNS, TLS, body read).
  #[error("network error: {0}")]
  Network(String),

  /// The server answered with a non-success status or an unreadable body.
  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  /// Malformed filter, sort or paging input, rejected before dispatch.
  #[error("invalid input: {0}")]
  Validation(String),
}

impl FetchError {
  pub fn validation(message: impl Into<String>) -> Self {
    FetchError::Validation(message.into())
  }

  /// Network and server failures are worth a manual retry; validation
  /// failures never change without new input.
  pub fn is_retryable(&self) -> bool {
    !matches!(self, FetchError::Validation(_))
  }
}
