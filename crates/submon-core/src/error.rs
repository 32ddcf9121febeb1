use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A configuration value or user input was rejected before any I/O.
  #[error("invalid {field}: {reason}")]
  Validation { field: &'static str, reason: String },

  /// A response did not have the expected shape.
  #[error("unexpected response format: {0}")]
  Format(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
    Self::Validation { field, reason: reason.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
