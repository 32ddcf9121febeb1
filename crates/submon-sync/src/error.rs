//! Failures surfaced to the operator by a fetch.
//!
//! The `Display` text of every variant is the message shown to the user.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum FetchError {
  /// Configuration was rejected before any request was made.
  #[error("{0}")]
  Validation(String),

  #[error("API access is disabled in the configuration")]
  Disabled,

  /// A second fetch was requested while one is running.
  #[error("a fetch is already in progress")]
  InProgress,

  #[error(
    "Could not connect to the subscription service at {url}. \
     Make sure it's running and API is enabled."
  )]
  Connection {
    url:    String,
    #[source]
    source: reqwest::Error,
  },

  #[error("the request timed out after {secs} seconds")]
  Timeout { secs: u64 },

  #[error("HTTP error {status}{}", status_hint(.status))]
  Http { status: u16, body: String },

  /// The response was not JSON, or not shaped like a subscription list.
  #[error("invalid response: {0}")]
  Format(String),

  #[error("failed to save subscription data: {0}")]
  Persistence(#[source] BoxError),

  /// The pre-ingest snapshot could not be written; nothing was ingested.
  #[error("failed to back up the store before saving: {0}")]
  Backup(#[source] BoxError),

  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
}

fn status_hint(status: &u16) -> &'static str {
  match status {
    401 => " (Invalid API key)",
    403 => " (Access forbidden - check API permissions)",
    404 => " (Endpoint not found - check client version)",
    _ => "",
  }
}

impl From<submon_core::Error> for FetchError {
  fn from(e: submon_core::Error) -> Self {
    match e {
      submon_core::Error::Format(message) => FetchError::Format(message),
      other => FetchError::Validation(other.to_string()),
    }
  }
}
