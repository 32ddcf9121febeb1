//! Entity model: subscriptions, their queries and acknowledgment state.
//!
//! These are the values read back from storage. The shape of data arriving
//! from the remote API lives in [`crate::payload`].

use serde::{Deserialize, Serialize};

use crate::{Error, Result, SECONDS_PER_DAY};

/// `source_version` of a [`SubscriptionData`] read successfully from storage.
pub const FROM_STORE: &str = "From Database";

/// `source_version` sentinel of a [`SubscriptionData`] whose load failed.
pub const STORE_ERROR: &str = "Database Error";

/// Payload format version reported when none is known.
pub const DEFAULT_VERSION: i64 = 80;

// ─── Query ───────────────────────────────────────────────────────────────────

/// One tracked search query belonging to exactly one [`Subscription`].
///
/// All `*_time` fields are Unix timestamps in seconds; `0` means "never".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
  /// Surrogate key assigned by storage. Stable within one ingestion epoch.
  pub id:                     Option<i64>,
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
  /// Opaque enum value from the source system.
  pub checker_status:         i64,
  /// Rate-of-new-files samples, kept verbatim and never interpreted.
  pub file_velocity:          Vec<serde_json::Value>,
  pub file_seed_cache_status: String,
  pub last_file_time:         i64,
  pub acknowledged:           bool,
  /// Expiry instant of the acknowledgment; `0` means open-ended.
  pub acknowledged_time:      i64,
}

impl Query {
  /// The name shown to the user: `human_name`, or `query_text` when empty.
  pub fn display_text(&self) -> &str {
    if self.human_name.is_empty() { &self.query_text } else { &self.human_name }
  }

  /// `true` when the query is acknowledged with an expiry at or before `now`.
  ///
  /// Expiry is only evaluated here, at render time; storage keeps the flag.
  pub fn is_expired_acknowledgment(&self, now: i64) -> bool {
    self.acknowledged && self.acknowledged_time != 0 && self.acknowledged_time <= now
  }

  /// `true` when the acknowledgment is still in force at `now`.
  pub fn is_actively_acknowledged(&self, now: i64) -> bool {
    self.acknowledged && (self.acknowledged_time == 0 || self.acknowledged_time > now)
  }

  pub fn acknowledgment(&self) -> Acknowledgment {
    Acknowledgment::new(self.acknowledged, self.acknowledged_time)
  }

  /// The composite natural key of this query inside `subscription_name`.
  pub fn key(&self, subscription_name: &str) -> QueryKey {
    QueryKey {
      query_text:        self.query_text.clone(),
      human_name:        self.human_name.clone(),
      subscription_name: subscription_name.to_owned(),
    }
  }
}

/// Natural key used to find a query when its surrogate id is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
  pub query_text:        String,
  pub human_name:        String,
  pub subscription_name: String,
}

/// A row as the presentation layer knows it.
///
/// `id` may be missing when a selection lost its association with the
/// stored row; updates then fall back to `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRef {
  pub id:  Option<i64>,
  pub key: QueryKey,
}

impl RowRef {
  pub fn of(subscription_name: &str, query: &Query) -> Self {
    Self { id: query.id, key: query.key(subscription_name) }
  }
}

// ─── Acknowledgment ──────────────────────────────────────────────────────────

/// The acknowledgment pair as written to storage.
///
/// Constructed only through [`Acknowledgment::new`] and friends, which
/// guarantee that an expiry never accompanies `acknowledged == false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Acknowledgment {
  acknowledged: bool,
  until:        i64,
}

impl Acknowledgment {
  pub fn new(acknowledged: bool, until: i64) -> Self {
    let until = if acknowledged { until.max(0) } else { 0 };
    Self { acknowledged, until }
  }

  /// Acknowledge until `now + days` days. `days` must be in `[1, 365]`.
  pub fn for_days(days: i64, now: i64) -> Result<Self> {
    validate_ack_days(days)?;
    Ok(Self::new(true, now + days * SECONDS_PER_DAY))
  }

  /// Acknowledge with no expiry.
  pub fn open_ended() -> Self { Self::new(true, 0) }

  /// The unacknowledged state `(false, 0)`.
  pub fn cleared() -> Self { Self::new(false, 0) }

  pub fn acknowledged(&self) -> bool { self.acknowledged }

  pub fn until(&self) -> i64 { self.until }
}

/// Acknowledgment durations are bounded to `[1, 365]` days.
pub fn validate_ack_days(days: i64) -> Result<()> {
  if !(1..=365).contains(&days) {
    return Err(Error::validation(
      "acknowledgment days",
      format!("must be between 1 and 365, got {days}"),
    ));
  }
  Ok(())
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// A named group of queries. Identity is `name` within one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
  pub name:              String,
  /// Identifier of the source the subscription downloads from.
  pub source_identifier: String,
  pub queries:           Vec<Query>,
}

impl Subscription {
  pub fn query_count(&self) -> usize { self.queries.len() }

  pub fn active_query_count(&self) -> usize {
    self.queries.iter().filter(|q| !q.acknowledged).count()
  }

  pub fn acknowledged_query_count(&self) -> usize {
    self.queries.iter().filter(|q| q.acknowledged).count()
  }
}

// ─── SubscriptionData ────────────────────────────────────────────────────────

/// Everything currently in the store, as one nested object graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionData {
  pub subscriptions:  Vec<Subscription>,
  pub version:        i64,
  /// [`FROM_STORE`] after a good load, [`STORE_ERROR`] after a failed one.
  pub source_version: String,
  /// The underlying failure when `source_version` is [`STORE_ERROR`].
  pub error:          Option<String>,
}

impl Default for SubscriptionData {
  fn default() -> Self {
    Self {
      subscriptions:  Vec::new(),
      version:        DEFAULT_VERSION,
      source_version: FROM_STORE.to_owned(),
      error:          None,
    }
  }
}

impl SubscriptionData {
  pub fn from_store(subscriptions: Vec<Subscription>) -> Self {
    Self { subscriptions, ..Self::default() }
  }

  /// The empty result returned in place of a failed read.
  pub fn store_error(message: impl Into<String>) -> Self {
    Self {
      source_version: STORE_ERROR.to_owned(),
      error: Some(message.into()),
      ..Self::default()
    }
  }

  pub fn is_store_error(&self) -> bool { self.source_version == STORE_ERROR }

  pub fn total_queries(&self) -> usize {
    self.subscriptions.iter().map(Subscription::query_count).sum()
  }

  pub fn total_active_queries(&self) -> usize {
    self.subscriptions.iter().map(Subscription::active_query_count).sum()
  }

  pub fn subscription_by_name(&self, name: &str) -> Option<&Subscription> {
    self.subscriptions.iter().find(|s| s.name == name)
  }

  /// Subscriptions visible under `filter`: all of them for `None`, otherwise
  /// every one with a matching name.
  pub fn filtered(&self, filter: Option<&str>) -> Vec<&Subscription> {
    self
      .subscriptions
      .iter()
      .filter(|s| filter.is_none_or(|name| s.name == name))
      .collect()
  }

  /// Every `(subscription name, query)` pair under `filter`, in store order.
  pub fn queries(&self, filter: Option<&str>) -> Vec<(&str, &Query)> {
    pairs(self.filtered(filter))
  }

  /// Like [`queries`](Self::queries), but for the single subscription at
  /// `index`. Names need not be unique within a batch.
  pub fn queries_at(&self, index: Option<usize>) -> Vec<(&str, &Query)> {
    match index {
      None => self.all_queries(),
      Some(i) => pairs(self.subscriptions.get(i)),
    }
  }

  pub fn all_queries(&self) -> Vec<(&str, &Query)> { self.queries(None) }
}

fn pairs<'a>(subs: impl IntoIterator<Item = &'a Subscription>) -> Vec<(&'a str, &'a Query)> {
  subs
    .into_iter()
    .flat_map(|s| s.queries.iter().map(move |q| (s.name.as_str(), q)))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn query(text: &str, human: &str) -> Query {
    Query { query_text: text.into(), human_name: human.into(), ..Query::default() }
  }

  #[test]
  fn display_text_falls_back_to_query_text() {
    assert_eq!(query("cats", "").display_text(), "cats");
    assert_eq!(query("cats", "Cute cats").display_text(), "Cute cats");
  }

  #[test]
  fn expired_acknowledgment() {
    let now = 1_700_000_000;
    let mut q = query("a", "");
    q.acknowledged = true;

    q.acknowledged_time = 0;
    assert!(!q.is_expired_acknowledgment(now));
    assert!(q.is_actively_acknowledged(now));

    q.acknowledged_time = now;
    assert!(q.is_expired_acknowledgment(now));
    assert!(!q.is_actively_acknowledged(now));

    q.acknowledged_time = now + 1;
    assert!(!q.is_expired_acknowledgment(now));

    q.acknowledged = false;
    q.acknowledged_time = now - 10;
    assert!(!q.is_expired_acknowledgment(now));
  }

  #[test]
  fn acknowledgment_never_keeps_time_without_flag() {
    let ack = Acknowledgment::new(false, 12345);
    assert!(!ack.acknowledged());
    assert_eq!(ack.until(), 0);

    assert_eq!(Acknowledgment::new(true, -5).until(), 0);
    assert_eq!(Acknowledgment::cleared(), Acknowledgment::new(false, 0));
  }

  #[test]
  fn acknowledgment_for_days() {
    let now = 1_000_000;
    let ack = Acknowledgment::for_days(30, now).unwrap();
    assert!(ack.acknowledged());
    assert_eq!(ack.until(), now + 30 * 86_400);

    assert!(Acknowledgment::for_days(0, now).is_err());
    assert!(Acknowledgment::for_days(366, now).is_err());
    assert!(Acknowledgment::for_days(365, now).is_ok());
  }

  #[test]
  fn subscription_counts() {
    let mut acked = query("b", "");
    acked.acknowledged = true;
    let sub = Subscription {
      name:              "art".into(),
      source_identifier: "booru tag search".into(),
      queries:           vec![query("a", ""), acked, query("c", "")],
    };
    assert_eq!(sub.query_count(), 3);
    assert_eq!(sub.active_query_count(), 2);
    assert_eq!(sub.acknowledged_query_count(), 1);
  }

  #[test]
  fn filtered_views() {
    let data = SubscriptionData::from_store(vec![
      Subscription { name: "one".into(), queries: vec![query("a", "")], ..Default::default() },
      Subscription {
        name: "two".into(),
        queries: vec![query("b", ""), query("c", "")],
        ..Default::default()
      },
    ]);

    assert_eq!(data.total_queries(), 3);
    assert_eq!(data.queries(None).len(), 3);
    assert_eq!(data.queries(Some("two")).len(), 2);
    assert!(data.queries(Some("missing")).is_empty());
    assert_eq!(data.all_queries()[0], ("one", &data.subscriptions[0].queries[0]));
  }

  #[test]
  fn same_named_subscriptions_stay_apart() {
    let data = SubscriptionData::from_store(vec![
      Subscription { name: "dup".into(), queries: vec![query("a", "")], ..Default::default() },
      Subscription {
        name: "dup".into(),
        queries: vec![query("b", ""), query("c", "")],
        ..Default::default()
      },
    ]);

    assert_eq!(data.queries(Some("dup")).len(), 3);
    let second: Vec<_> = data.queries_at(Some(1)).iter().map(|(_, q)| &q.query_text).collect();
    assert_eq!(second, ["b", "c"]);
    assert_eq!(data.queries_at(Some(0)).len(), 1);
    assert!(data.queries_at(Some(2)).is_empty());
    assert_eq!(data.queries_at(None).len(), 3);
  }

  #[test]
  fn store_error_sentinel() {
    let data = SubscriptionData::store_error("disk I/O error");
    assert!(data.is_store_error());
    assert!(data.subscriptions.is_empty());
    assert_eq!(data.source_version, STORE_ERROR);
    assert_eq!(data.error.as_deref(), Some("disk I/O error"));
    assert!(!SubscriptionData::default().is_store_error());
  }
}
