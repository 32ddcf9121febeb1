//! Conversions between domain types and the values stored in SQLite columns.
//!
//! Row timestamps (`created_at`, `updated_at`) are RFC 3339 strings; query
//! times stay Unix seconds as the source reports them. `file_velocity` is a
//! compact JSON array.

use chrono::{DateTime, Utc};
use serde_json::Value;
use submon_core::{
  model::{Query, Subscription},
  payload::{Payload, QueryPayload},
};

use crate::Result;

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn encode_velocity(samples: &[Value]) -> Result<String> {
  Ok(serde_json::to_string(samples)?)
}

/// Malformed or empty text reads back as no samples.
pub fn decode_velocity(text: &str) -> Vec<Value> {
  if text.trim().is_empty() {
    return Vec::new();
  }
  match serde_json::from_str::<Value>(text) {
    Ok(Value::Array(samples)) => samples,
    Ok(_) | Err(_) => {
      tracing::warn!(text, "unreadable file_velocity column, treating as empty");
      Vec::new()
    }
  }
}

// ─── Insert rows ─────────────────────────────────────────────────────────────

/// A payload subscription with every column pre-encoded, ready to move into
/// a `Connection::call` closure.
pub struct NewSubscriptionRow {
  pub name:              String,
  pub source_identifier: String,
  pub queries:           Vec<NewQueryRow>,
}

pub struct NewQueryRow {
  pub query_text:             String,
  pub human_name:             String,
  pub display_name:           String,
  pub last_check_time:        i64,
  pub next_check_time:        i64,
  pub next_check_status:      String,
  pub paused:                 bool,
  pub dead:                   bool,
  pub checking_now:           bool,
  pub can_check_now:          bool,
  pub checker_status:         i64,
  pub file_velocity:          String,
  pub file_seed_cache_status: String,
  pub last_file_time:         i64,
}

pub fn encode_payload(payload: Payload) -> Result<Vec<NewSubscriptionRow>> {
  payload
    .subscriptions
    .into_iter()
    .map(|sub| -> Result<NewSubscriptionRow> {
      Ok(NewSubscriptionRow {
        name:              sub.name,
        source_identifier: sub.gug_name,
        queries:           sub
          .queries
          .into_iter()
          .map(encode_query)
          .collect::<Result<_>>()?,
      })
    })
    .collect()
}

fn encode_query(q: QueryPayload) -> Result<NewQueryRow> {
  Ok(NewQueryRow {
    file_velocity:          encode_velocity(&q.file_velocity)?,
    query_text:             q.query_text,
    human_name:             q.human_name,
    display_name:           q.display_name,
    last_check_time:        q.last_check_time,
    next_check_time:        q.next_check_time,
    next_check_status:      q.next_check_status,
    paused:                 q.paused,
    dead:                   q.dead,
    checking_now:           q.checking_now,
    can_check_now:          q.can_check_now,
    checker_status:         q.checker_status,
    file_seed_cache_status: q.file_seed_cache_status,
    last_file_time:         q.last_file_time,
  })
}

// ─── Loaded rows ─────────────────────────────────────────────────────────────

/// Column list matching [`RawJoinedRow::from_row`].
pub const LOAD_SQL: &str = "
SELECT s.id,
       s.name,
       COALESCE(s.source_identifier, ''),
       q.id,
       COALESCE(q.query_text, ''),
       COALESCE(q.human_name, ''),
       COALESCE(q.display_name, ''),
       COALESCE(q.last_check_time, 0),
       COALESCE(q.next_check_time, 0),
       COALESCE(q.next_check_status, ''),
       COALESCE(q.paused, 0),
       COALESCE(q.dead, 0),
       COALESCE(q.checking_now, 0),
       COALESCE(q.can_check_now, 0),
       COALESCE(q.checker_status, 0),
       COALESCE(q.file_velocity_serialized, ''),
       COALESCE(q.file_seed_cache_status, ''),
       COALESCE(q.last_file_time, 0),
       COALESCE(q.acknowledged, 0),
       COALESCE(q.acknowledged_time, 0)
  FROM subscriptions s
  LEFT JOIN queries q ON q.subscription_id = s.id
 ORDER BY s.name, s.id, q.query_text, q.id
";

/// One row of the subscription/query LEFT JOIN, as read from SQLite.
pub struct RawJoinedRow {
  pub subscription_id:   i64,
  pub subscription_name: String,
  pub source_identifier: String,
  /// `None` for a subscription without queries.
  pub query:             Option<RawQuery>,
}

pub struct RawQuery {
  pub id:                     i64,
  pub query_text:             String,
  pub human_name:             String,
  pub display_name:           String,
  pub last_check_time:        i64,
  pub next_check_time:        i64,
  pub next_check_status:      String,
  pub paused:                 bool,
  pub dead:                   bool,
  pub checking_now:           bool,
  pub can_check_now:          bool,
  pub checker_status:         i64,
  pub file_velocity:          String,
  pub file_seed_cache_status: String,
  pub last_file_time:         i64,
  pub acknowledged:           bool,
  pub acknowledged_time:      i64,
}

impl RawJoinedRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    let query_id: Option<i64> = row.get(3)?;
    let query = match query_id {
      None => None,
      Some(id) => Some(RawQuery {
        id,
        query_text:             row.get(4)?,
        human_name:             row.get(5)?,
        display_name:           row.get(6)?,
        last_check_time:        row.get(7)?,
        next_check_time:        row.get(8)?,
        next_check_status:      row.get(9)?,
        paused:                 row.get(10)?,
        dead:                   row.get(11)?,
        checking_now:           row.get(12)?,
        can_check_now:          row.get(13)?,
        checker_status:         row.get(14)?,
        file_velocity:          row.get(15)?,
        file_seed_cache_status: row.get(16)?,
        last_file_time:         row.get(17)?,
        acknowledged:           row.get(18)?,
        acknowledged_time:      row.get(19)?,
      }),
    };
    Ok(Self {
      subscription_id: row.get(0)?,
      subscription_name: row.get(1)?,
      source_identifier: row.get(2)?,
      query,
    })
  }
}

impl RawQuery {
  pub fn into_query(self) -> Query {
    Query {
      id:                     Some(self.id),
      query_text:             self.query_text,
      human_name:             self.human_name,
      display_name:           self.display_name,
      last_check_time:        self.last_check_time,
      next_check_time:        self.next_check_time,
      next_check_status:      self.next_check_status,
      paused:                 self.paused,
      dead:                   self.dead,
      checking_now:           self.checking_now,
      can_check_now:          self.can_check_now,
      checker_status:         self.checker_status,
      file_velocity:          decode_velocity(&self.file_velocity),
      file_seed_cache_status: self.file_seed_cache_status,
      last_file_time:         self.last_file_time,
      acknowledged:           self.acknowledged,
      // A stray expiry without the flag is never surfaced.
      acknowledged_time:      if self.acknowledged { self.acknowledged_time } else { 0 },
    }
  }
}

/// Rebuild the nested graph from join rows ordered by subscription.
pub fn group_rows(rows: Vec<RawJoinedRow>) -> Vec<Subscription> {
  let mut subscriptions: Vec<Subscription> = Vec::new();
  let mut current_id = None;

  for row in rows {
    if current_id != Some(row.subscription_id) {
      current_id = Some(row.subscription_id);
      subscriptions.push(Subscription {
        name:              row.subscription_name,
        source_identifier: row.source_identifier,
        queries:           Vec::new(),
      });
    }
    if let (Some(raw), Some(sub)) = (row.query, subscriptions.last_mut()) {
      sub.queries.push(raw.into_query());
    }
  }
  subscriptions
}
