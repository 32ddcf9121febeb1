//! SQL schema and ordered migrations for the subscription store.
//!
//! Applied versions are recorded in `schema_migrations`. Every migration
//! runs once, in its own transaction, and is written so that running it
//! against a store created by the earlier tool (which added columns ad hoc)
//! leaves the same shape as a fresh store.

use rusqlite::{Connection, params};

/// Applied to every connection before anything else.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = DELETE;
PRAGMA foreign_keys = ON;
";

const MIGRATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    name       TEXT NOT NULL,
    applied_at INTEGER NOT NULL
);
";

const BASE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS subscriptions (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    name              TEXT NOT NULL,
    source_identifier TEXT NOT NULL DEFAULT '',
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS queries (
    id                       INTEGER PRIMARY KEY AUTOINCREMENT,
    subscription_id          INTEGER NOT NULL
                             REFERENCES subscriptions(id) ON DELETE CASCADE,
    query_text               TEXT NOT NULL,
    human_name               TEXT NOT NULL DEFAULT '',
    display_name             TEXT NOT NULL DEFAULT '',
    last_check_time          INTEGER NOT NULL DEFAULT 0,
    next_check_time          INTEGER NOT NULL DEFAULT 0,
    next_check_status        TEXT NOT NULL DEFAULT '',
    paused                   INTEGER NOT NULL DEFAULT 0,
    dead                     INTEGER NOT NULL DEFAULT 0,
    checking_now             INTEGER NOT NULL DEFAULT 0,
    can_check_now            INTEGER NOT NULL DEFAULT 0,
    checker_status           INTEGER NOT NULL DEFAULT 0,
    file_velocity_serialized TEXT NOT NULL DEFAULT '[]',  -- JSON array
    file_seed_cache_status   TEXT NOT NULL DEFAULT '',
    last_file_time           INTEGER NOT NULL DEFAULT 0,
    acknowledged             INTEGER NOT NULL DEFAULT 0,
    acknowledged_time        INTEGER NOT NULL DEFAULT 0,  -- expiry; 0 = none
    updated_at               TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS queries_subscription_idx ON queries(subscription_id);
";

const NORMALIZE_ACKNOWLEDGMENTS: &str = "
UPDATE queries SET acknowledged = 0 WHERE acknowledged IS NULL;
UPDATE queries SET acknowledged_time = 0
 WHERE acknowledged_time IS NULL
    OR (acknowledged = 0 AND acknowledged_time != 0);
";

// ─── Migrations ──────────────────────────────────────────────────────────────

pub struct Migration {
  pub version: i64,
  pub name:    &'static str,
  apply:       fn(&Connection) -> rusqlite::Result<()>,
}

pub const MIGRATIONS: &[Migration] = &[
  Migration { version: 1, name: "create_base_tables", apply: create_base_tables },
  Migration { version: 2, name: "adopt_legacy_columns", apply: adopt_legacy_columns },
  Migration {
    version: 3,
    name:    "normalize_acknowledgments",
    apply:   normalize_acknowledgments,
  },
];

pub const LATEST_VERSION: i64 = 3;

/// Columns the earlier tool added after its first release.
const LEGACY_ADDED_COLUMNS: &[(&str, &str)] = &[
  ("last_file_time", "INTEGER NOT NULL DEFAULT 0"),
  ("acknowledged", "INTEGER NOT NULL DEFAULT 0"),
  ("acknowledged_time", "INTEGER NOT NULL DEFAULT 0"),
];

/// `(table, old name, new name)`
const LEGACY_RENAMES: &[(&str, &str, &str)] = &[
  ("subscriptions", "gug_name", "source_identifier"),
  ("queries", "file_velocity_data", "file_velocity_serialized"),
];

fn create_base_tables(conn: &Connection) -> rusqlite::Result<()> {
  conn.execute_batch(BASE_TABLES)
}

fn normalize_acknowledgments(conn: &Connection) -> rusqlite::Result<()> {
  conn.execute_batch(NORMALIZE_ACKNOWLEDGMENTS)
}

fn adopt_legacy_columns(conn: &Connection) -> rusqlite::Result<()> {
  for (column, definition) in LEGACY_ADDED_COLUMNS {
    if !table_has_column(conn, "queries", column)? {
      conn.execute_batch(&format!("ALTER TABLE queries ADD COLUMN {column} {definition}"))?;
      tracing::info!(column, "added missing column to queries");
    }
  }

  for (table, old, new) in LEGACY_RENAMES {
    if table_has_column(conn, table, old)? && !table_has_column(conn, table, new)? {
      conn.execute_batch(&format!("ALTER TABLE {table} RENAME COLUMN {old} TO {new}"))?;
      tracing::info!(table, old, new, "renamed legacy column");
    }
  }
  Ok(())
}

/// Bring the schema up to [`LATEST_VERSION`]. Returns how many migrations
/// were applied.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<usize> {
  conn.execute_batch(MIGRATIONS_TABLE)?;
  let current = current_version(conn)?;

  let mut applied = 0;
  for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
    let tx = conn.transaction()?;
    (migration.apply)(&tx)?;
    tx.execute(
      "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
      params![migration.version, migration.name, chrono::Utc::now().timestamp()],
    )?;
    tx.commit()?;

    tracing::info!(
      version = migration.version,
      name = migration.name,
      "applied schema migration"
    );
    applied += 1;
  }
  Ok(applied)
}

pub fn current_version(conn: &Connection) -> rusqlite::Result<i64> {
  conn.query_row(
    "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
    [],
    |row| row.get(0),
  )
}

// ─── Introspection ───────────────────────────────────────────────────────────

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
  conn.query_row(
    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
    params![table],
    |row| row.get(0),
  )
}

pub fn table_has_column(
  conn: &Connection,
  table: &str,
  column: &str,
) -> rusqlite::Result<bool> {
  if !table_exists(conn, table)? {
    return Ok(false);
  }
  let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
  let mut rows = stmt.query([])?;
  while let Some(row) = rows.next()? {
    let name: String = row.get(1)?;
    if name == column {
      return Ok(true);
    }
  }
  Ok(false)
}

/// A store file is restorable iff it has both relations.
pub fn has_required_tables(conn: &Connection) -> rusqlite::Result<bool> {
  Ok(table_exists(conn, "subscriptions")? && table_exists(conn, "queries")?)
}
