//! Typed records for the subscription list returned by the remote API.
//!
//! The payload is decoded once, here, and never re-validated downstream.
//! Decoding is lenient per field: a missing or `null` value takes the
//! default for its type, floats are truncated to whole seconds, and a
//! value of the wrong type is coerced where the intent is obvious.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
  Error, Result,
  model::{Query, Subscription},
};

/// Subscription name recorded when the source omits one.
pub const UNKNOWN_SUBSCRIPTION: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
  pub subscriptions: Vec<SubscriptionPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPayload {
  #[serde(default = "unknown_name", deserialize_with = "name")]
  pub name:     String,
  #[serde(default, deserialize_with = "string")]
  pub gug_name: String,
  #[serde(default, deserialize_with = "records")]
  pub queries:  Vec<QueryPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryPayload {
  #[serde(deserialize_with = "string")]
  pub query_text:             String,
  #[serde(deserialize_with = "string")]
  pub human_name:             String,
  #[serde(deserialize_with = "string")]
  pub display_name:           String,
  #[serde(deserialize_with = "integer")]
  pub last_check_time:        i64,
  #[serde(deserialize_with = "integer")]
  pub next_check_time:        i64,
  #[serde(deserialize_with = "string")]
  pub next_check_status:      String,
  #[serde(deserialize_with = "boolean")]
  pub paused:                 bool,
  #[serde(deserialize_with = "boolean")]
  pub dead:                   bool,
  #[serde(deserialize_with = "boolean")]
  pub checking_now:           bool,
  #[serde(deserialize_with = "boolean")]
  pub can_check_now:          bool,
  #[serde(deserialize_with = "integer")]
  pub checker_status:         i64,
  #[serde(deserialize_with = "sequence")]
  pub file_velocity:          Vec<Value>,
  #[serde(deserialize_with = "string")]
  pub file_seed_cache_status: String,
  #[serde(deserialize_with = "integer")]
  pub last_file_time:         i64,
}

impl Payload {
  /// Check the response shape and decode it.
  ///
  /// The value must be an object with a `subscriptions` array. Anything
  /// else is a format error and nothing downstream should be touched.
  pub fn from_json(value: &Value) -> Result<Self> {
    let Some(object) = value.as_object() else {
      return Err(Error::Format("response is not a JSON object".into()));
    };
    match object.get("subscriptions") {
      Some(Value::Array(_)) => {}
      Some(_) => {
        return Err(Error::Format("'subscriptions' field is not a list".into()));
      }
      None => {
        return Err(Error::Format(
          "response has no 'subscriptions' field".into(),
        ));
      }
    }
    Payload::deserialize(value).map_err(|e| Error::Format(e.to_string()))
  }

  /// Parse raw response bytes, then [`Payload::from_json`].
  pub fn from_slice(bytes: &[u8]) -> Result<Self> {
    let value: Value = serde_json::from_slice(bytes)
      .map_err(|e| Error::Format(format!("invalid JSON: {e}")))?;
    Self::from_json(&value)
  }

  pub fn query_count(&self) -> usize {
    self.subscriptions.iter().map(|s| s.queries.len()).sum()
  }

  /// The model records this payload becomes once stored, unacknowledged.
  pub fn to_subscriptions(&self) -> Vec<Subscription> {
    self.subscriptions.iter().map(SubscriptionPayload::to_subscription).collect()
  }
}

impl SubscriptionPayload {
  pub fn to_subscription(&self) -> Subscription {
    Subscription {
      name:              self.name.clone(),
      source_identifier: self.gug_name.clone(),
      queries:           self.queries.iter().map(QueryPayload::to_query).collect(),
    }
  }
}

impl QueryPayload {
  pub fn to_query(&self) -> Query {
    Query {
      id:                     None,
      query_text:             self.query_text.clone(),
      human_name:             self.human_name.clone(),
      display_name:           self.display_name.clone(),
      last_check_time:        self.last_check_time,
      next_check_time:        self.next_check_time,
      next_check_status:      self.next_check_status.clone(),
      paused:                 self.paused,
      dead:                   self.dead,
      checking_now:           self.checking_now,
      can_check_now:          self.can_check_now,
      checker_status:         self.checker_status,
      file_velocity:          self.file_velocity.clone(),
      file_seed_cache_status: self.file_seed_cache_status.clone(),
      last_file_time:         self.last_file_time,
      acknowledged:           false,
      acknowledged_time:      0,
    }
  }
}

// ─── Lenient field decoders ──────────────────────────────────────────────────

fn unknown_name() -> String { UNKNOWN_SUBSCRIPTION.to_owned() }

fn name<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  Ok(match Option::<Value>::deserialize(d)? {
    None | Some(Value::Null) => unknown_name(),
    Some(v) => coerce_string(v),
  })
}

fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  Ok(Option::<Value>::deserialize(d)?.map(coerce_string).unwrap_or_default())
}

fn coerce_string(v: Value) -> String {
  match v {
    Value::String(s) => s,
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
  Ok(match Option::<Value>::deserialize(d)? {
    Some(Value::Number(n)) => n
      .as_i64()
      .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
      .unwrap_or_default(),
    Some(Value::Bool(b)) => i64::from(b),
    Some(Value::String(s)) => s
      .trim()
      .parse::<f64>()
      .map(|f| f.trunc() as i64)
      .unwrap_or_default(),
    _ => 0,
  })
}

fn boolean<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
  Ok(match Option::<Value>::deserialize(d)? {
    Some(Value::Bool(b)) => b,
    Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
    Some(Value::String(s)) => matches!(s.as_str(), "true" | "True" | "1"),
    _ => false,
  })
}

fn sequence<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Value>, D::Error> {
  Ok(match Option::<Value>::deserialize(d)? {
    Some(Value::Array(items)) => items,
    _ => Vec::new(),
  })
}

fn records<'de, D: Deserializer<'de>>(
  d: D,
) -> Result<Vec<QueryPayload>, D::Error> {
  match Option::<Vec<QueryPayload>>::deserialize(d)? {
    Some(queries) => Ok(queries),
    None => Ok(Vec::new()),
  }
}
