//! HTTP client for the subscription service API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use submon_core::{config::ApiConfig, format::mask_key};

use crate::FetchError;

/// Request header carrying the access key.
pub const ACCESS_KEY_HEADER: &str = "Hydrus-Client-API-Access-Key";

pub const SUBSCRIPTIONS_PATH: &str = "/manage_subscriptions/get_subscriptions";
pub const VERSION_PATH: &str = "/api_version";

/// The version check never waits longer than this.
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Reported by [`ApiClient::api_version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ApiVersion {
  #[serde(default)]
  pub version:        i64,
  #[serde(default)]
  pub hydrus_version: i64,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self { client, config: config.clone() })
  }

  pub fn config(&self) -> &ApiConfig { &self.config }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn get(&self, path: &str) -> RequestBuilder {
    self
      .client
      .get(self.url(path))
      .header(ACCESS_KEY_HEADER, &self.config.api_key)
  }

  /// The raw body of the subscription listing. Parsing is left to the
  /// caller so that it can be reported as its own stage.
  pub async fn get_subscriptions(&self) -> Result<Vec<u8>, FetchError> {
    tracing::info!(
      url = %self.url(SUBSCRIPTIONS_PATH),
      key = %mask_key(&self.config.api_key),
      "requesting subscriptions"
    );

    let resp = self
      .get(SUBSCRIPTIONS_PATH)
      .send()
      .await
      .map_err(|e| self.classify(e, self.config.timeout_secs))?;
    let resp = check_status(resp).await?;

    let body = resp
      .bytes()
      .await
      .map_err(|e| self.classify(e, self.config.timeout_secs))?;
    tracing::debug!(bytes = body.len(), "received subscriptions");
    Ok(body.to_vec())
  }

  pub async fn api_version(&self) -> Result<ApiVersion, FetchError> {
    let secs = self.config.timeout_secs.min(VERSION_TIMEOUT.as_secs());
    let resp = self
      .get(VERSION_PATH)
      .timeout(Duration::from_secs(secs))
      .send()
      .await
      .map_err(|e| self.classify(e, secs))?;
    let resp = check_status(resp).await?;

    resp
      .json::<ApiVersion>()
      .await
      .map_err(|e| FetchError::Format(e.to_string()))
  }

  fn classify(&self, e: reqwest::Error, secs: u64) -> FetchError {
    if e.is_timeout() {
      FetchError::Timeout { secs }
    } else if e.is_connect() {
      FetchError::Connection { url: self.config.base_url.clone(), source: e }
    } else {
      FetchError::Request(e)
    }
  }
}

async fn check_status(resp: Response) -> Result<Response, FetchError> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let body = resp.text().await.unwrap_or_default();
  tracing::warn!(status = status.as_u16(), body = %body, "API request rejected");
  Err(FetchError::Http { status: status.as_u16(), body })
}
