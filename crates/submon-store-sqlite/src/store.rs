//! [`SqliteStore`]: the SQLite implementation of [`SubscriptionStore`].

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::Utc;
use rusqlite::params;
use submon_core::{
  model::{Acknowledgment, QueryKey, SubscriptionData},
  payload::Payload,
  store::{BackupInfo, BackupIngestError, BackupPool, IngestSummary, SubscriptionStore},
};
use tokio::sync::Mutex;

use crate::{
  Error, Result,
  backup::{self, BackupSettings},
  encode::{LOAD_SQL, RawJoinedRow, encode_dt, encode_payload, group_rows},
  schema::{self, PRAGMAS},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The subscription store, backed by a single SQLite file.
///
/// Cloning is cheap; clones share the connection and the mutation guard.
#[derive(Clone)]
pub struct SqliteStore {
  conn:      tokio_rusqlite::Connection,
  /// `None` for in-memory stores, which cannot be snapshotted.
  path:      Option<PathBuf>,
  backups:   BackupSettings,
  keep_acks: bool,
  /// Held for the whole of every mutation.
  guard:     Arc<Mutex<()>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and bring its schema up to date.
  pub async fn open(path: impl AsRef<Path>, backups: BackupSettings) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await?;
    }
    let conn = tokio_rusqlite::Connection::open(&path).await?;
    let store = Self::new(conn, Some(path), backups);
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store with backups disabled; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let backups = BackupSettings { enabled: false, ..BackupSettings::default() };
    let store = Self::new(conn, None, backups);
    store.init_schema().await?;
    Ok(store)
  }

  fn new(
    conn: tokio_rusqlite::Connection,
    path: Option<PathBuf>,
    backups: BackupSettings,
  ) -> Self {
    Self {
      conn,
      path,
      backups,
      keep_acks: false,
      guard: Arc::new(Mutex::new(())),
    }
  }

  /// Re-apply acknowledgments to rows that survive an ingest.
  pub fn keep_acknowledgments_on_refresh(mut self, keep: bool) -> Self {
    self.keep_acks = keep;
    self
  }

  pub fn path(&self) -> Option<&Path> { self.path.as_deref() }

  pub fn backup_settings(&self) -> &BackupSettings { &self.backups }

  async fn init_schema(&self) -> Result<()> {
    let applied = self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(schema::migrate(conn)?)
      })
      .await?;
    if applied > 0 {
      tracing::info!(applied, "store schema is up to date");
    }
    Ok(())
  }

  /// The schema version recorded in the store.
  pub async fn schema_version(&self) -> Result<i64> {
    Ok(self.conn.call(|conn| Ok(schema::current_version(conn)?)).await?)
  }

  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<()> {
    self.conn.call(move |conn| Ok(conn.execute_batch(sql)?)).await?;
    Ok(())
  }

  fn live_file(&self) -> Result<&Path> { self.path.as_deref().ok_or(Error::NoLiveStore) }

  /// Copy the live file into `pool` and apply that pool's retention.
  /// Callers hold the guard.
  async fn snapshot_into(&self, pool: BackupPool) -> Result<PathBuf> {
    let path = self.snapshot_only(pool).await?;
    self.trim(pool, None).await;
    Ok(path)
  }

  async fn snapshot_only(&self, pool: BackupPool) -> Result<PathBuf> {
    let live = self.live_file()?;
    let path = backup::snapshot(live, self.backups.dir(pool), pool.file_prefix()).await?;
    tracing::info!(pool = pool.label(), path = %path.display(), "created backup");
    Ok(path)
  }

  async fn trim(&self, pool: BackupPool, spare: Option<&Path>) -> usize {
    let keep = self.backups.retention_for(pool);
    backup::trim(self.backups.dir(pool), pool.file_prefix(), keep, spare).await
  }

  /// Full replace in one transaction. Callers hold the guard.
  async fn replace_all(&self, payload: Payload) -> Result<IngestSummary> {
    let subscriptions = encode_payload(payload)?;
    let now = encode_dt(Utc::now());
    let keep_acks = self.keep_acks;

    let summary = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let mut previous: HashMap<(String, String, String), (bool, i64)> = HashMap::new();
        if keep_acks {
          let mut stmt = tx.prepare(
            "SELECT q.query_text, COALESCE(q.human_name, ''), s.name,
                    q.acknowledged_time
               FROM queries q JOIN subscriptions s ON s.id = q.subscription_id
              WHERE q.acknowledged = 1",
          )?;
          let rows = stmt.query_map([], |row| {
            Ok(((row.get(0)?, row.get(1)?, row.get(2)?), (true, row.get(3)?)))
          })?;
          for row in rows {
            let (key, ack) = row?;
            previous.insert(key, ack);
          }
        }

        tx.execute("DELETE FROM queries", [])?;
        tx.execute("DELETE FROM subscriptions", [])?;

        let mut summary = IngestSummary::default();
        for sub in &subscriptions {
          tx.execute(
            "INSERT INTO subscriptions (name, source_identifier, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![sub.name, sub.source_identifier, now],
          )?;
          let subscription_id = tx.last_insert_rowid();
          summary.subscriptions += 1;

          for q in &sub.queries {
            let key = (q.query_text.clone(), q.human_name.clone(), sub.name.clone());
            let ack = previous
              .get(&key)
              .map(|&(acknowledged, until)| Acknowledgment::new(acknowledged, until))
              .unwrap_or_default();
            if ack.acknowledged() {
              summary.carried_over += 1;
            }

            tx.execute(
              "INSERT INTO queries (
                 subscription_id, query_text, human_name, display_name,
                 last_check_time, next_check_time, next_check_status,
                 paused, dead, checking_now, can_check_now, checker_status,
                 file_velocity_serialized, file_seed_cache_status, last_file_time,
                 acknowledged, acknowledged_time, updated_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
              params![
                subscription_id,
                q.query_text,
                q.human_name,
                q.display_name,
                q.last_check_time,
                q.next_check_time,
                q.next_check_status,
                q.paused,
                q.dead,
                q.checking_now,
                q.can_check_now,
                q.checker_status,
                q.file_velocity,
                q.file_seed_cache_status,
                q.last_file_time,
                ack.acknowledged(),
                ack.until(),
                now,
              ],
            )?;
            summary.queries += 1;
          }
        }

        tx.commit()?;
        Ok(summary)
      })
      .await?;

    tracing::info!(
      subscriptions = summary.subscriptions,
      queries = summary.queries,
      carried_over = summary.carried_over,
      "ingested subscription data"
    );
    Ok(summary)
  }

  async fn read_all(&self) -> Result<SubscriptionData> {
    let rows = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(LOAD_SQL)?;
        let rows = stmt
          .query_map([], RawJoinedRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(SubscriptionData::from_store(group_rows(rows)))
  }
}

// ─── SubscriptionStore impl ──────────────────────────────────────────────────

impl SubscriptionStore for SqliteStore {
  type Error = Error;

  // ── Data ──────────────────────────────────────────────────────────────────

  async fn ingest(&self, payload: Payload) -> Result<IngestSummary> {
    let _guard = self.guard.lock().await;
    self.replace_all(payload).await
  }

  async fn ingest_with_backup(
    &self,
    payload: Payload,
  ) -> Result<(PathBuf, IngestSummary), BackupIngestError<Error>> {
    let _guard = self.guard.lock().await;
    let backup = self
      .snapshot_into(BackupPool::PreIngest)
      .await
      .map_err(BackupIngestError::Backup)?;
    let summary = self.replace_all(payload).await.map_err(BackupIngestError::Ingest)?;
    Ok((backup, summary))
  }

  async fn load(&self) -> SubscriptionData {
    match self.read_all().await {
      Ok(data) => data,
      Err(e) => {
        tracing::error!(error = %e, "failed to load subscription data");
        SubscriptionData::store_error(e.to_string())
      }
    }
  }

  async fn update_acknowledgment(&self, query_id: i64, ack: Acknowledgment) -> Result<bool> {
    let now = encode_dt(Utc::now());
    let _guard = self.guard.lock().await;
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE queries SET acknowledged = ?1, acknowledged_time = ?2, updated_at = ?3
            WHERE id = ?4",
          params![ack.acknowledged(), ack.until(), now, query_id],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn update_acknowledgment_by_match(
    &self,
    key: QueryKey,
    ack: Acknowledgment,
  ) -> Result<bool> {
    let now = encode_dt(Utc::now());
    let _guard = self.guard.lock().await;
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE queries SET acknowledged = ?1, acknowledged_time = ?2, updated_at = ?3
            WHERE query_text = ?4
              AND COALESCE(human_name, '') = ?5
              AND subscription_id IN (SELECT id FROM subscriptions WHERE name = ?6)",
          params![
            ack.acknowledged(),
            ack.until(),
            now,
            key.query_text,
            key.human_name,
            key.subscription_name,
          ],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn clear_expired_acknowledgments(&self, now: i64) -> Result<usize> {
    let stamp = encode_dt(Utc::now());
    let _guard = self.guard.lock().await;
    let cleared = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE queries SET acknowledged = 0, acknowledged_time = 0, updated_at = ?1
            WHERE acknowledged = 1 AND acknowledged_time != 0 AND acknowledged_time <= ?2",
          params![stamp, now],
        )?)
      })
      .await?;
    if cleared > 0 {
      tracing::info!(cleared, "cleared expired acknowledgments");
    }
    Ok(cleared)
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn create_backup(&self) -> Result<Option<PathBuf>> {
    if !self.backups.enabled {
      return Ok(None);
    }
    let Some(live) = self.path.as_deref() else {
      return Ok(None);
    };
    if !tokio::fs::try_exists(live).await? {
      return Ok(None);
    }
    let _guard = self.guard.lock().await;
    Ok(Some(self.snapshot_into(BackupPool::General).await?))
  }

  async fn create_pre_ingest_backup(&self) -> Result<PathBuf> {
    let _guard = self.guard.lock().await;
    self.snapshot_into(BackupPool::PreIngest).await
  }

  async fn list_backups(&self, pool: BackupPool) -> Result<Vec<BackupInfo>> {
    backup::list(self.backups.dir(pool), pool.file_prefix()).await
  }

  async fn inspect_backup(&self, path: PathBuf) -> Result<BackupInfo> {
    backup::inspect(&path).await
  }

  async fn restore(&self, path: PathBuf) -> Result<PathBuf> {
    let live = self.live_file()?.to_path_buf();
    let _guard = self.guard.lock().await;

    let info = backup::inspect(&path).await?;
    if !info.compatible {
      return Err(Error::IncompatibleBackup(path));
    }
    if same_file(&path, &live).await {
      return Err(Error::SameFile(path));
    }

    // The live file is only ever replaced by a rename of a complete copy.
    let staged = backup::stage(&path, &live).await?;

    // Backup-then-mutate: the safety copy reflects the state before restore.
    let safety = match self.snapshot_only(BackupPool::General).await {
      Ok(safety) => safety,
      Err(e) => {
        tokio::fs::remove_file(&staged).await.ok();
        return Err(e);
      }
    };

    let swapped = {
      let staged = staged.clone();
      self
        .conn
        .call(move |conn| {
          let previous = std::mem::replace(conn, rusqlite::Connection::open_in_memory()?);
          if let Err((previous, e)) = previous.close() {
            *conn = previous;
            return Err(e.into());
          }

          let renamed = std::fs::rename(&staged, &live);

          // Reopen the live file whether or not the rename went through.
          *conn = rusqlite::Connection::open(&live)?;
          conn.execute_batch(PRAGMAS)?;
          renamed.map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
          schema::migrate(conn)?;
          Ok(())
        })
        .await
    };
    if let Err(e) = swapped {
      tokio::fs::remove_file(&staged).await.ok();
      return Err(e.into());
    }

    self.trim(BackupPool::General, Some(&path)).await;

    tracing::info!(
      from = %path.display(),
      safety = %safety.display(),
      subscriptions = info.subscription_count,
      queries = info.query_count,
      "restored store from backup"
    );
    Ok(safety)
  }

  async fn purge_incompatible_backups(&self) -> Result<usize> {
    let pool = BackupPool::PreIngest;
    let _guard = self.guard.lock().await;

    let mut removed = 0;
    for info in backup::list(self.backups.dir(pool), pool.file_prefix()).await? {
      if info.compatible {
        continue;
      }
      match tokio::fs::remove_file(&info.path).await {
        Ok(()) => {
          tracing::info!(path = %info.path.display(), "removed incompatible backup");
          removed += 1;
        }
        Err(e) => {
          tracing::warn!(path = %info.path.display(), error = %e, "failed to remove backup");
        }
      }
    }
    tracing::info!(removed, "purged incompatible backups");
    Ok(removed)
  }

  async fn export_backup(&self, src: PathBuf, dest: PathBuf) -> Result<PathBuf> {
    if !tokio::fs::try_exists(&src).await? {
      return Err(Error::BackupNotFound(src));
    }
    let dest = match (tokio::fs::metadata(&dest).await, src.file_name()) {
      (Ok(meta), Some(name)) if meta.is_dir() => dest.join(name),
      _ => dest,
    };
    if same_file(&src, &dest).await {
      return Err(Error::SameFile(dest));
    }
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(&src, &dest).await?;
    tracing::info!(from = %src.display(), to = %dest.display(), "exported backup");
    Ok(dest)
  }
}

/// Whether two paths name the same existing file.
async fn same_file(a: &Path, b: &Path) -> bool {
  match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
    (Ok(a), Ok(b)) => a == b,
    _ => false,
  }
}
