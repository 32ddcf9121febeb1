//! Snapshot files: naming, listing, retention and inspection.
//!
//! A snapshot is a byte-for-byte copy of the store file. Each pool lives in
//! its own directory and its files share a name prefix; retention only ever
//! considers files matching that prefix.

use std::{
  io,
  path::{Path, PathBuf},
  time::SystemTime,
};

use chrono::{DateTime, Local, Utc};
use rusqlite::OpenFlags;
use submon_core::{
  config::DatabaseConfig,
  store::{BackupInfo, BackupPool, PRE_INGEST_RETENTION},
};

use crate::{Error, Result, schema};

/// Where snapshots go and how many are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSettings {
  /// Manual and pre-ingest backups are skipped when false. Restore safety
  /// copies are taken regardless.
  pub enabled:        bool,
  /// Retention of the general pool.
  pub retention:      usize,
  pub general_dir:    PathBuf,
  pub pre_ingest_dir: PathBuf,
}

impl Default for BackupSettings {
  fn default() -> Self { Self::from_config(&DatabaseConfig::default()) }
}

impl BackupSettings {
  pub fn from_config(config: &DatabaseConfig) -> Self {
    Self {
      enabled:        config.backup_enabled,
      retention:      config.backup_count,
      general_dir:    config.backup_dir.clone(),
      pre_ingest_dir: config.pre_ingest_backup_dir.clone(),
    }
  }

  /// Both pools under `root`, for tests and throw-away stores.
  pub fn under(root: &Path) -> Self {
    Self {
      general_dir: root.join("backups"),
      pre_ingest_dir: root.join("api_backups"),
      ..Self::default()
    }
  }

  pub fn dir(&self, pool: BackupPool) -> &Path {
    match pool {
      BackupPool::General => &self.general_dir,
      BackupPool::PreIngest => &self.pre_ingest_dir,
    }
  }

  pub fn retention_for(&self, pool: BackupPool) -> usize {
    match pool {
      BackupPool::General => self.retention,
      BackupPool::PreIngest => PRE_INGEST_RETENTION,
    }
  }
}

// ─── Creation ────────────────────────────────────────────────────────────────

/// Copy `live` into `dir` under a fresh, never-reused name.
pub async fn snapshot(live: &Path, dir: &Path, prefix: &str) -> Result<PathBuf> {
  tokio::fs::create_dir_all(dir).await?;
  let path = reserve_name(dir, prefix).await?;
  if let Err(e) = tokio::fs::copy(live, &path).await {
    tokio::fs::remove_file(&path).await.ok();
    return Err(e.into());
  }
  Ok(path)
}

/// Copy `src` to a temporary file beside `live`, ready to be renamed over it.
pub async fn stage(src: &Path, live: &Path) -> Result<PathBuf> {
  let name = live
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "store.db".to_owned());
  let staged = live.with_file_name(format!(".{name}.restore"));
  if let Err(e) = tokio::fs::copy(src, &staged).await {
    tokio::fs::remove_file(&staged).await.ok();
    return Err(e.into());
  }
  Ok(staged)
}

/// `{prefix}{YYYYmmdd_HHMMSS_mmm}.db`, with `_N` appended on collision.
/// The file is created empty so that no concurrent caller can claim it.
async fn reserve_name(dir: &Path, prefix: &str) -> Result<PathBuf> {
  let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
  let mut suffix = 0u32;
  loop {
    let name = match suffix {
      0 => format!("{prefix}{stamp}.db"),
      n => format!("{prefix}{stamp}_{n}.db"),
    };
    let candidate = dir.join(name);
    match tokio::fs::OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(&candidate)
      .await
    {
      Ok(_) => return Ok(candidate),
      Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
      Err(e) => return Err(e.into()),
    }
  }
}

// ─── Listing & retention ─────────────────────────────────────────────────────

/// Files of one pool, newest first by modification time, then by name.
pub async fn pool_files(dir: &Path, prefix: &str) -> Result<Vec<(PathBuf, SystemTime)>> {
  let mut entries = match tokio::fs::read_dir(dir).await {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(e.into()),
  };

  let mut files = Vec::new();
  while let Some(entry) = entries.next_entry().await? {
    let name = entry.file_name();
    let name = name.to_string_lossy();
    if !name.starts_with(prefix) || !name.ends_with(".db") {
      continue;
    }
    let meta = entry.metadata().await?;
    if meta.is_file() {
      files.push((entry.path(), meta.modified()?));
    }
  }

  files.sort_by(|(pa, ta), (pb, tb)| tb.cmp(ta).then_with(|| pb.cmp(pa)));
  Ok(files)
}

/// Keep the newest `keep` files of a pool and delete the rest. `spare` is
/// never deleted and does not count towards `keep`.
///
/// Failures are logged and swallowed; returns how many files were removed.
pub async fn trim(dir: &Path, prefix: &str, keep: usize, spare: Option<&Path>) -> usize {
  let mut files = match pool_files(dir, prefix).await {
    Ok(files) => files,
    Err(e) => {
      tracing::warn!(dir = %dir.display(), error = %e, "could not list backups for retention");
      return 0;
    }
  };

  if let Some(spare) = spare
    && let Ok(spare) = tokio::fs::canonicalize(spare).await
  {
    let mut kept = Vec::with_capacity(files.len());
    for (path, modified) in files {
      if tokio::fs::canonicalize(&path).await.ok().as_ref() != Some(&spare) {
        kept.push((path, modified));
      }
    }
    files = kept;
  }

  let mut removed = 0;
  for (path, _) in files.into_iter().skip(keep) {
    match tokio::fs::remove_file(&path).await {
      Ok(()) => {
        tracing::info!(path = %path.display(), "removed old backup");
        removed += 1;
      }
      Err(e) => {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove old backup");
      }
    }
  }
  removed
}

// ─── Inspection ──────────────────────────────────────────────────────────────

/// Read-only look at a snapshot. Only a missing file is an error; anything
/// unreadable is reported as incompatible.
pub async fn inspect(path: &Path) -> Result<BackupInfo> {
  let meta = match tokio::fs::metadata(path).await {
    Ok(meta) if meta.is_file() => meta,
    Ok(_) => return Err(Error::BackupNotFound(path.to_path_buf())),
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      return Err(Error::BackupNotFound(path.to_path_buf()));
    }
    Err(e) => return Err(e.into()),
  };

  let (compatible, subscription_count, query_count) = match read_counts(path).await {
    Ok(counts) => counts,
    Err(e) => {
      tracing::warn!(path = %path.display(), error = %e, "could not read backup");
      (false, 0, 0)
    }
  };

  Ok(BackupInfo {
    path: path.to_path_buf(),
    created_at: DateTime::<Utc>::from(meta.modified()?),
    size_bytes: meta.len(),
    subscription_count,
    query_count,
    compatible,
  })
}

async fn read_counts(path: &Path) -> Result<(bool, usize, usize)> {
  let conn = tokio_rusqlite::Connection::open_with_flags(
    path,
    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
  )
  .await?;

  let counts = conn
    .call(|conn| {
      if !schema::has_required_tables(conn)? {
        return Ok((false, 0, 0));
      }
      let subscriptions: i64 =
        conn.query_row("SELECT COUNT(*) FROM subscriptions", [], |r| r.get(0))?;
      let queries: i64 = conn.query_row("SELECT COUNT(*) FROM queries", [], |r| r.get(0))?;
      Ok((true, subscriptions as usize, queries as usize))
    })
    .await?;
  Ok(counts)
}

/// All snapshots of a pool, inspected, newest first.
pub async fn list(dir: &Path, prefix: &str) -> Result<Vec<BackupInfo>> {
  let mut infos = Vec::new();
  for (path, _) in pool_files(dir, prefix).await? {
    match inspect(&path).await {
      Ok(info) => infos.push(info),
      // Removed between listing and inspection.
      Err(Error::BackupNotFound(_)) => {}
      Err(e) => return Err(e),
    }
  }
  Ok(infos)
}
