//! Display strings for table cells and log lines.

use chrono::{Local, TimeZone};

use crate::model::Query;

pub const NEVER: &str = "Never";
pub const EXPIRED: &str = "Expired";
pub const NOT_APPLICABLE: &str = "N/A";

/// Local time as `%Y-%m-%d %H:%M`, or `"Never"` for the `0` sentinel.
pub fn format_timestamp(timestamp: i64) -> String {
  if timestamp == 0 {
    return NEVER.to_owned();
  }
  match Local.timestamp_opt(timestamp, 0).single() {
    Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
    None => timestamp.to_string(),
  }
}

pub fn yes_no(value: bool) -> &'static str { if value { "Yes" } else { "No" } }

pub fn acknowledged_label(query: &Query) -> &'static str { yes_no(query.acknowledged) }

/// The "Ack Until" cell.
pub fn ack_until_label(query: &Query, now: i64) -> String {
  if !query.acknowledged || query.acknowledged_time == 0 {
    NOT_APPLICABLE.to_owned()
  } else if query.acknowledged_time > now {
    format_timestamp(query.acknowledged_time)
  } else {
    EXPIRED.to_owned()
  }
}

/// First and last 8 characters of a credential, for logs.
pub fn mask_key(key: &str) -> String {
  let chars: Vec<char> = key.chars().collect();
  if chars.len() <= 16 {
    return "*".repeat(chars.len());
  }
  let head: String = chars[..8].iter().collect();
  let tail: String = chars[chars.len() - 8..].iter().collect();
  format!("{head}...{tail}")
}
