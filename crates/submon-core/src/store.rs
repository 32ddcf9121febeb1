//! The `SubscriptionStore` trait and the backup types it exposes.
//!
//! Implemented by storage backends (`submon-store-sqlite`). The fetch
//! orchestrator and the front end depend on this abstraction.

use std::{future::Future, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  model::{Acknowledgment, QueryKey, RowRef, SubscriptionData},
  payload::Payload,
};

/// Retention of the pre-ingest pool.
pub const PRE_INGEST_RETENTION: usize = 10;

// ─── Supporting types ────────────────────────────────────────────────────────

/// What a successful [`SubscriptionStore::ingest`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
  pub subscriptions: usize,
  pub queries:       usize,
  /// Acknowledgments re-applied to rows that survived the refresh.
  pub carried_over:  usize,
}

/// The two independent snapshot streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupPool {
  /// Manual backups and restore safety copies.
  General,
  /// Automatic snapshots taken before every API ingest.
  PreIngest,
}

impl BackupPool {
  pub fn file_prefix(&self) -> &'static str {
    match self {
      BackupPool::General => "hydrus_subscriptions_backup_",
      BackupPool::PreIngest => "api_backup_",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      BackupPool::General => "general",
      BackupPool::PreIngest => "pre-ingest",
    }
  }

  pub fn other(&self) -> Self {
    match self {
      BackupPool::General => BackupPool::PreIngest,
      BackupPool::PreIngest => BackupPool::General,
    }
  }
}

/// A snapshot file and what inspecting it found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
  pub path:               PathBuf,
  /// Modification time of the file.
  pub created_at:         DateTime<Utc>,
  pub size_bytes:         u64,
  pub subscription_count: usize,
  pub query_count:        usize,
  /// Both the subscription and query tables are present.
  pub compatible:         bool,
}

/// Which half of [`SubscriptionStore::ingest_with_backup`] failed.
#[derive(Debug, thiserror::Error)]
pub enum BackupIngestError<E> {
  /// The snapshot could not be taken; nothing was ingested.
  #[error("pre-ingest backup failed: {0}")]
  Backup(#[source] E),
  /// The snapshot exists but the ingest was rolled back.
  #[error("ingest failed: {0}")]
  Ingest(#[source] E),
}

impl BackupInfo {
  pub fn file_name(&self) -> String {
    self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the persisted subscription set and its snapshots.
///
/// Mutations (ingest, acknowledgment updates, backup, restore, purge) run to
/// completion one at a time. Reads never fail: a broken store loads as an
/// empty [`SubscriptionData`] carrying the error sentinel.
pub trait SubscriptionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Data ───────────────────────────────────────────────────────────────

  /// Replace every subscription and query with the ones in `payload`.
  ///
  /// All-or-nothing: on error the previous contents are untouched.
  fn ingest(
    &self,
    payload: Payload,
  ) -> impl Future<Output = Result<IngestSummary, Self::Error>> + Send + '_;

  /// Snapshot into the pre-ingest pool, then [`ingest`](Self::ingest), with
  /// no other mutation in between. Returns the snapshot path.
  fn ingest_with_backup(
    &self,
    payload: Payload,
  ) -> impl Future<Output = Result<(PathBuf, IngestSummary), BackupIngestError<Self::Error>>>
  + Send
  + '_;

  fn load(&self) -> impl Future<Output = SubscriptionData> + Send + '_;

  /// Point update by surrogate id. Returns whether a row was affected.
  fn update_acknowledgment(
    &self,
    query_id: i64,
    ack: Acknowledgment,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Update by natural key, for rows whose id is unavailable.
  fn update_acknowledgment_by_match(
    &self,
    key: QueryKey,
    ack: Acknowledgment,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Write back `(false, 0)` to every acknowledgment expired at `now`.
  fn clear_expired_acknowledgments(
    &self,
    now: i64,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Snapshots ──────────────────────────────────────────────────────────

  /// Copy the store into the general pool. `None` when backups are
  /// disabled or there is no store file yet.
  fn create_backup(
    &self,
  ) -> impl Future<Output = Result<Option<PathBuf>, Self::Error>> + Send + '_;

  /// Copy the store into the pre-ingest pool.
  fn create_pre_ingest_backup(
    &self,
  ) -> impl Future<Output = Result<PathBuf, Self::Error>> + Send + '_;

  /// Snapshots in `pool`, newest first.
  fn list_backups(
    &self,
    pool: BackupPool,
  ) -> impl Future<Output = Result<Vec<BackupInfo>, Self::Error>> + Send + '_;

  fn inspect_backup(
    &self,
    path: PathBuf,
  ) -> impl Future<Output = Result<BackupInfo, Self::Error>> + Send + '_;

  /// Replace the live store with the snapshot at `path`, after taking a
  /// safety copy of the current state. Returns the safety copy's path.
  fn restore(
    &self,
    path: PathBuf,
  ) -> impl Future<Output = Result<PathBuf, Self::Error>> + Send + '_;

  /// Delete incompatible snapshots from the pre-ingest pool.
  fn purge_incompatible_backups(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Copy the snapshot at `src` to `dest`, or into `dest` when it is a
  /// directory. Returns the written path.
  fn export_backup(
    &self,
    src: PathBuf,
    dest: PathBuf,
  ) -> impl Future<Output = Result<PathBuf, Self::Error>> + Send + '_;
}

/// Apply `ack` to each row: by id when the row has one, by natural key
/// otherwise. Returns how many rows were updated.
pub async fn apply_acknowledgment<S: SubscriptionStore>(
  store: &S,
  rows: &[RowRef],
  ack: Acknowledgment,
) -> Result<usize, S::Error> {
  let mut applied = 0;
  for row in rows {
    let hit = match row.id {
      Some(id) => store.update_acknowledgment(id, ack).await?,
      None => store.update_acknowledgment_by_match(row.key.clone(), ack).await?,
    };
    if hit {
      applied += 1;
    }
  }
  Ok(applied)
}
