//! Error type for `submon-store-sqlite`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("backup file not found: {}", .0.display())]
  BackupNotFound(PathBuf),

  /// The snapshot lacks the subscription or query table.
  #[error("backup {} is not compatible with the current store", .0.display())]
  IncompatibleBackup(PathBuf),

  /// Snapshots need a store file; in-memory stores have none.
  #[error("the store has no backing file")]
  NoLiveStore,

  #[error("{} is the live store itself", .0.display())]
  SameFile(PathBuf),
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { Error::Database(e.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
