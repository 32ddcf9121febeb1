//! Application configuration.
//!
//! The binary assembles an [`AppConfig`] from defaults, a TOML file, the
//! environment and command-line flags; the libraries only ever receive the
//! finished value. [`AppConfig::validate`] must pass before any I/O uses it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result, model::validate_ack_days};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:45869";
pub const API_KEY_LEN: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub api:      ApiConfig,
  pub database: DatabaseConfig,
  pub ui:       UiConfig,
  pub logging:  LoggingConfig,
}

// ─── Sections ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// 64 lowercase hex characters.
  pub api_key:      String,
  pub base_url:     String,
  pub timeout_secs: u64,
  /// When false, fetching from the API is refused without a request.
  pub enabled:      bool,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      api_key:      String::new(),
      base_url:     DEFAULT_BASE_URL.to_owned(),
      timeout_secs: 10,
      enabled:      true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
  pub path:                            PathBuf,
  pub backup_enabled:                  bool,
  /// Retention of the general backup pool.
  pub backup_count:                    usize,
  pub backup_dir:                      PathBuf,
  pub pre_ingest_backup_dir:           PathBuf,
  /// Re-apply acknowledgments to rows that survive a refresh.
  pub keep_acknowledgments_on_refresh: bool,
}

impl Default for DatabaseConfig {
  fn default() -> Self {
    Self {
      path:                            PathBuf::from("hydrus_subscriptions.db"),
      backup_enabled:                  true,
      backup_count:                    5,
      backup_dir:                      PathBuf::from("backups"),
      pre_ingest_backup_dir:           PathBuf::from("api_backups"),
      keep_acknowledgments_on_refresh: false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
  pub default_ack_days: i64,
  pub ack_day_options:  Vec<i64>,
}

impl Default for UiConfig {
  fn default() -> Self {
    Self { default_ack_days: 30, ack_day_options: vec![10, 30, 60, 90] }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Destination of log events while the terminal UI owns the screen.
  pub file: PathBuf,
}

impl Default for LoggingConfig {
  fn default() -> Self { Self { file: PathBuf::from("logs/submon.log") } }
}

// ─── Validation ──────────────────────────────────────────────────────────────

impl AppConfig {
  /// Everything except the API credential, which only fetching needs.
  pub fn validate(&self) -> Result<()> {
    self.api.validate_endpoint()?;
    validate_ack_days(self.ui.default_ack_days)?;
    for days in &self.ui.ack_day_options {
      validate_ack_days(*days)?;
    }
    if self.database.backup_count == 0 {
      return Err(Error::validation("database.backup_count", "must be at least 1"));
    }
    Ok(())
  }
}

impl ApiConfig {
  /// Endpoint and credential, as required before contacting the API.
  pub fn validate(&self) -> Result<()> {
    validate_api_key(&self.api_key)?;
    self.validate_endpoint()
  }

  pub fn validate_endpoint(&self) -> Result<()> {
    validate_base_url(&self.base_url)?;
    validate_timeout(self.timeout_secs)
  }
}

pub fn validate_api_key(key: &str) -> Result<()> {
  if key.is_empty() {
    return Err(Error::validation("api.api_key", "is not set"));
  }
  let hex = key.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'));
  if key.len() != API_KEY_LEN || !hex {
    return Err(Error::validation(
      "api.api_key",
      format!("must be {API_KEY_LEN} lowercase hexadecimal characters"),
    ));
  }
  Ok(())
}

pub fn validate_base_url(raw: &str) -> Result<()> {
  let url = Url::parse(raw)
    .map_err(|e| Error::validation("api.base_url", format!("{raw:?}: {e}")))?;
  if !matches!(url.scheme(), "http" | "https") {
    return Err(Error::validation(
      "api.base_url",
      format!("scheme must be http or https, got {:?}", url.scheme()),
    ));
  }
  if url.host_str().is_none_or(str::is_empty) {
    return Err(Error::validation("api.base_url", format!("{raw:?} has no host")));
  }
  Ok(())
}

pub fn validate_timeout(secs: u64) -> Result<()> {
  if !(1..=300).contains(&secs) {
    return Err(Error::validation(
      "api.timeout_secs",
      format!("must be between 1 and 300 seconds, got {secs}"),
    ));
  }
  Ok(())
}
