//! SQLite backend for the subscription store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Snapshots are plain copies of
//! the store file.

mod backup;
mod encode;
mod schema;
mod store;

pub mod error;

pub use backup::BackupSettings;
pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
