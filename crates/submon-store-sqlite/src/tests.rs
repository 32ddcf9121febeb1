//! Integration tests for `SqliteStore`, in memory and on disk.

use std::{
  fs::File,
  path::Path,
  time::{Duration, SystemTime},
};

use serde_json::json;
use submon_core::{
  SECONDS_PER_DAY,
  model::{Acknowledgment, Query, QueryKey, RowRef, SubscriptionData},
  payload::Payload,
  store::{BackupIngestError, BackupPool, SubscriptionStore, apply_acknowledgment},
};
use tempfile::TempDir;

use crate::{BackupSettings, Error, SqliteStore, schema};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn disk_store(dir: &TempDir) -> SqliteStore {
  SqliteStore::open(dir.path().join("subs.db"), BackupSettings::under(dir.path()))
    .await
    .expect("on-disk store")
}

/// Two subscriptions with three and two queries.
fn sample() -> Payload {
  Payload::from_json(&json!({
    "subscriptions": [
      {
        "name": "artists",
        "gug_name": "booru tag search",
        "queries": [
          { "query_text": "alpha", "human_name": "Alpha", "last_file_time": 300,
            "file_velocity": [[2, 86400]] },
          { "query_text": "beta", "last_file_time": 100, "paused": true },
          { "query_text": "gamma", "last_file_time": 0, "dead": true }
        ]
      },
      {
        "name": "series",
        "gug_name": "gallery search",
        "queries": [
          { "query_text": "delta", "last_file_time": 200 },
          { "query_text": "epsilon", "next_check_status": "checking soon" }
        ]
      }
    ]
  }))
  .unwrap()
}

fn other_sample() -> Payload {
  Payload::from_json(&json!({
    "subscriptions": [
      { "name": "solo", "queries": [ { "query_text": "zeta" } ] }
    ]
  }))
  .unwrap()
}

fn find<'a>(data: &'a SubscriptionData, text: &str) -> &'a Query {
  data
    .all_queries()
    .into_iter()
    .map(|(_, q)| q)
    .find(|q| q.query_text == text)
    .unwrap()
}

/// The stored content with surrogate ids removed.
fn without_ids(mut data: SubscriptionData) -> SubscriptionData {
  for sub in &mut data.subscriptions {
    for q in &mut sub.queries {
      q.id = None;
    }
  }
  data
}

fn set_mtime(path: &Path, age: Duration) {
  let file = File::options().write(true).open(path).unwrap();
  file.set_modified(SystemTime::now() - age).unwrap();
}

// ─── Ingest & load ───────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_then_load_end_to_end() {
  let s = store().await;
  let summary = s.ingest(sample()).await.unwrap();
  assert_eq!(summary.subscriptions, 2);
  assert_eq!(summary.queries, 5);
  assert_eq!(summary.carried_over, 0);

  let data = s.load().await;
  assert!(!data.is_store_error());
  assert_eq!(data.subscriptions.len(), 2);
  assert_eq!(data.total_queries(), 5);
  assert_eq!(data.subscriptions[0].query_count(), 3);
  assert_eq!(data.subscriptions[1].query_count(), 2);
  assert!(data.all_queries().iter().all(|(_, q)| !q.acknowledged && q.id.is_some()));

  let alpha = find(&data, "alpha");
  assert_eq!(alpha.human_name, "Alpha");
  assert_eq!(alpha.file_velocity, vec![json!([2, 86400])]);
  assert_eq!(data.subscriptions[0].source_identifier, "booru tag search");
  assert!(find(&data, "beta").paused);
  assert!(find(&data, "gamma").dead);

  // Acknowledge two rows for 30 days.
  let now = submon_core::now();
  let ack = Acknowledgment::for_days(30, now).unwrap();
  let rows = [
    RowRef::of("artists", find(&data, "alpha")),
    RowRef::of("series", find(&data, "delta")),
  ];
  assert_eq!(apply_acknowledgment(&s, &rows, ack).await.unwrap(), 2);

  let data = s.load().await;
  let acked: Vec<&Query> = data
    .all_queries()
    .into_iter()
    .map(|(_, q)| q)
    .filter(|q| q.acknowledged)
    .collect();
  assert_eq!(acked.len(), 2);
  for q in &acked {
    assert!((q.acknowledged_time - (now + 30 * SECONDS_PER_DAY)).abs() <= 5);
  }

  // Unacknowledge one.
  let row = [RowRef::of("artists", find(&data, "alpha"))];
  assert_eq!(apply_acknowledgment(&s, &row, Acknowledgment::cleared()).await.unwrap(), 1);

  let data = s.load().await;
  let alpha = find(&data, "alpha");
  assert!(!alpha.acknowledged);
  assert_eq!(alpha.acknowledged_time, 0);
  assert!(find(&data, "delta").acknowledged);
}

#[tokio::test]
async fn load_orders_subscriptions_and_queries_by_name() {
  let s = store().await;
  s.ingest(
    Payload::from_json(&json!({
      "subscriptions": [
        { "name": "zulu", "queries": [ { "query_text": "b" }, { "query_text": "a" } ] },
        { "name": "alpha", "queries": [] }
      ]
    }))
    .unwrap(),
  )
  .await
  .unwrap();

  let data = s.load().await;
  let names: Vec<&str> = data.subscriptions.iter().map(|s| s.name.as_str()).collect();
  assert_eq!(names, ["alpha", "zulu"]);
  assert!(data.subscriptions[0].queries.is_empty());
  let texts: Vec<&str> =
    data.subscriptions[1].queries.iter().map(|q| q.query_text.as_str()).collect();
  assert_eq!(texts, ["a", "b"]);
}

#[tokio::test]
async fn reingest_is_idempotent_and_resets_acknowledgments() {
  let s = store().await;
  s.ingest(sample()).await.unwrap();
  let first = s.load().await;

  let q = find(&first, "beta");
  assert!(s.update_acknowledgment(q.id.unwrap(), Acknowledgment::open_ended()).await.unwrap());

  s.ingest(sample()).await.unwrap();
  let second = s.load().await;
  assert!(second.all_queries().iter().all(|(_, q)| !q.acknowledged));
  assert_eq!(without_ids(first), without_ids(second));
}

#[tokio::test]
async fn reingest_can_carry_acknowledgments_over() {
  let s = store().await.keep_acknowledgments_on_refresh(true);
  s.ingest(sample()).await.unwrap();
  let data = s.load().await;

  let until = submon_core::now() + 3_600;
  let id = find(&data, "delta").id.unwrap();
  s.update_acknowledgment(id, Acknowledgment::new(true, until)).await.unwrap();

  let summary = s.ingest(sample()).await.unwrap();
  assert_eq!(summary.carried_over, 1);

  let data = s.load().await;
  let delta = find(&data, "delta");
  assert!(delta.acknowledged);
  assert_eq!(delta.acknowledged_time, until);
  assert_eq!(data.subscriptions.iter().map(|s| s.acknowledged_query_count()).sum::<usize>(), 1);

  // A query that disappears from the payload takes its acknowledgment with it.
  s.ingest(other_sample()).await.unwrap();
  let summary = s.ingest(sample()).await.unwrap();
  assert_eq!(summary.carried_over, 0);
}

#[tokio::test]
async fn failed_ingest_leaves_store_untouched() {
  let s = store().await;
  s.ingest(sample()).await.unwrap();
  let before = s.load().await;

  s.execute_raw(
    "CREATE TRIGGER fail_third_insert BEFORE INSERT ON queries
       WHEN (SELECT COUNT(*) FROM queries) >= 2
     BEGIN SELECT RAISE(ABORT, 'simulated write failure'); END;",
  )
  .await
  .unwrap();

  let err = s.ingest(sample()).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)), "{err:?}");

  let after = s.load().await;
  assert_eq!(before, after);
}

#[tokio::test]
async fn load_failure_degrades_to_sentinel() {
  let s = store().await;
  s.ingest(sample()).await.unwrap();
  s.execute_raw("DROP TABLE queries;").await.unwrap();

  let data = s.load().await;
  assert!(data.is_store_error());
  assert!(data.subscriptions.is_empty());
  assert!(data.error.is_some());
}

// ─── Acknowledgments ─────────────────────────────────────────────────────────

#[tokio::test]
async fn update_by_match_uses_natural_key() {
  let s = store().await;
  s.ingest(sample()).await.unwrap();
  let data = s.load().await;

  let mut row = RowRef::of("artists", find(&data, "alpha"));
  row.id = None;
  let ack = Acknowledgment::open_ended();
  assert_eq!(apply_acknowledgment(&s, &[row.clone()], ack).await.unwrap(), 1);

  let mut wrong = row.clone();
  wrong.key.subscription_name = "series".into();
  assert!(!s.update_acknowledgment_by_match(wrong.key, ack).await.unwrap());

  let data = s.load().await;
  let alpha = find(&data, "alpha");
  assert!(alpha.acknowledged);
  assert_eq!(alpha.acknowledged_time, 0);
}

#[tokio::test]
async fn update_unknown_id_reports_nothing_applied() {
  let s = store().await;
  s.ingest(sample()).await.unwrap();
  assert!(!s.update_acknowledgment(9_999, Acknowledgment::open_ended()).await.unwrap());
}

#[tokio::test]
async fn clear_expired_only_touches_expired() {
  let s = store().await;
  s.ingest(sample()).await.unwrap();
  let data = s.load().await;
  let now = submon_core::now();

  let id = |text: &str| find(&data, text).id.unwrap();
  s.update_acknowledgment(id("alpha"), Acknowledgment::new(true, now - 1)).await.unwrap();
  s.update_acknowledgment(id("beta"), Acknowledgment::new(true, now + 3_600)).await.unwrap();
  s.update_acknowledgment(id("delta"), Acknowledgment::open_ended()).await.unwrap();

  assert_eq!(s.clear_expired_acknowledgments(now).await.unwrap(), 1);

  let data = s.load().await;
  assert!(!find(&data, "alpha").acknowledged);
  assert!(find(&data, "beta").acknowledged);
  assert!(find(&data, "delta").acknowledged);
}

// ─── Snapshot then ingest ────────────────────────────────────────────────────

fn alpha_acknowledged_in(path: &Path) -> bool {
  rusqlite::Connection::open(path)
    .unwrap()
    .query_row("SELECT acknowledged FROM queries WHERE query_text = 'alpha'", [], |r| r.get(0))
    .unwrap()
}

#[tokio::test]
async fn ingest_with_backup_snapshots_prior_state() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;
  s.ingest(sample()).await.unwrap();

  let (snapshot, summary) = s.ingest_with_backup(other_sample()).await.unwrap();
  assert_eq!(summary.queries, 1);
  assert!(snapshot.starts_with(dir.path().join("api_backups")));
  assert_eq!(s.inspect_backup(snapshot).await.unwrap().query_count, 5);
  assert_eq!(s.load().await.total_queries(), 1);
}

#[tokio::test]
async fn ingest_with_backup_reports_which_step_failed() {
  let memory = store().await;
  memory.ingest(sample()).await.unwrap();
  let err = memory.ingest_with_backup(other_sample()).await.unwrap_err();
  assert!(matches!(err, BackupIngestError::Backup(Error::NoLiveStore)), "{err:?}");
  assert_eq!(memory.load().await.total_queries(), 5);

  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;
  s.ingest(sample()).await.unwrap();
  s.execute_raw(
    "CREATE TRIGGER refuse_inserts BEFORE INSERT ON queries
     BEGIN SELECT RAISE(ABORT, 'simulated write failure'); END;",
  )
  .await
  .unwrap();
  let err = s.ingest_with_backup(other_sample()).await.unwrap_err();
  assert!(matches!(err, BackupIngestError::Ingest(Error::Database(_))), "{err:?}");
  assert_eq!(s.load().await.total_queries(), 5);
  assert_eq!(s.list_backups(BackupPool::PreIngest).await.unwrap().len(), 1);
}

#[tokio::test]
async fn no_mutation_lands_between_snapshot_and_ingest() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;
  s.ingest(sample()).await.unwrap();

  let key = QueryKey {
    query_text:        "alpha".into(),
    human_name:        "Alpha".into(),
    subscription_name: "artists".into(),
  };
  let (fetched, acked) = tokio::join!(
    s.ingest_with_backup(sample()),
    s.update_acknowledgment_by_match(key, Acknowledgment::open_ended()),
  );
  let (snapshot, _) = fetched.unwrap();
  acked.unwrap();

  // Either the acknowledgment preceded the snapshot (and the ingest reset
  // it) or it followed the ingest. It never falls in between.
  let live = find(&s.load().await, "alpha").acknowledged;
  assert_ne!(alpha_acknowledged_in(&snapshot), live);
}

// ─── Backups ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_backup_writes_general_pool() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;
  s.ingest(sample()).await.unwrap();

  let path = s.create_backup().await.unwrap().unwrap();
  assert!(path.starts_with(dir.path().join("backups")));
  let name = path.file_name().unwrap().to_string_lossy().into_owned();
  assert!(name.starts_with("hydrus_subscriptions_backup_") && name.ends_with(".db"));

  let info = s.inspect_backup(path).await.unwrap();
  assert!(info.compatible);
  assert_eq!(info.subscription_count, 2);
  assert_eq!(info.query_count, 5);
  assert!(info.size_bytes > 0);
}

#[tokio::test]
async fn create_backup_is_a_noop_when_disabled_or_in_memory() {
  let dir = TempDir::new().unwrap();
  let settings = BackupSettings { enabled: false, ..BackupSettings::under(dir.path()) };
  let s = SqliteStore::open(dir.path().join("subs.db"), settings).await.unwrap();
  assert_eq!(s.create_backup().await.unwrap(), None);
  assert!(!dir.path().join("backups").exists());

  let memory = store().await;
  assert_eq!(memory.create_backup().await.unwrap(), None);
  assert!(matches!(memory.create_pre_ingest_backup().await, Err(Error::NoLiveStore)));
}

#[tokio::test]
async fn backups_never_overwrite_each_other() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;

  let a = s.create_pre_ingest_backup().await.unwrap();
  let b = s.create_pre_ingest_backup().await.unwrap();
  let c = s.create_pre_ingest_backup().await.unwrap();
  assert_ne!(a, b);
  assert_ne!(b, c);
  assert_eq!(s.list_backups(BackupPool::PreIngest).await.unwrap().len(), 3);
}

#[tokio::test]
async fn general_retention_keeps_newest() {
  let dir = TempDir::new().unwrap();
  let settings = BackupSettings { retention: 3, ..BackupSettings::under(dir.path()) };
  let s = SqliteStore::open(dir.path().join("subs.db"), settings).await.unwrap();

  let mut created = Vec::new();
  for _ in 0..5 {
    created.push(s.create_backup().await.unwrap().unwrap());
  }

  let listed = s.list_backups(BackupPool::General).await.unwrap();
  assert_eq!(listed.len(), 3);
  for path in &created[2..] {
    assert!(path.exists(), "{} should survive", path.display());
  }
  for path in &created[..2] {
    assert!(!path.exists(), "{} should be trimmed", path.display());
  }
}

#[tokio::test]
async fn pre_ingest_retention_is_by_modification_time() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;
  let pool_dir = dir.path().join("api_backups");
  std::fs::create_dir_all(&pool_dir).unwrap();

  // Twelve older snapshots, the name order deliberately unrelated to age.
  let mut seeded = Vec::new();
  for i in 0..12u64 {
    let path = pool_dir.join(format!("api_backup_seed_{:02}.db", 11 - i));
    std::fs::copy(dir.path().join("subs.db"), &path).unwrap();
    set_mtime(&path, Duration::from_secs(3_600 * (i + 1)));
    seeded.push(path);
  }
  // Files of another pool or shape are never trimmed.
  let stranger = pool_dir.join("notes.txt");
  std::fs::write(&stranger, "keep me").unwrap();

  let newest = s.create_pre_ingest_backup().await.unwrap();

  let listed = s.list_backups(BackupPool::PreIngest).await.unwrap();
  assert_eq!(listed.len(), 10);
  assert_eq!(listed[0].path, newest);
  for path in &seeded[..9] {
    assert!(path.exists());
  }
  for path in &seeded[9..] {
    assert!(!path.exists());
  }
  assert!(stranger.exists());
}

#[tokio::test]
async fn list_reports_incompatible_snapshots() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;
  s.ingest(sample()).await.unwrap();
  let good = s.create_pre_ingest_backup().await.unwrap();

  let garbage = dir.path().join("api_backups/api_backup_garbage.db");
  std::fs::write(&garbage, b"definitely not sqlite").unwrap();
  set_mtime(&garbage, Duration::from_secs(60));

  let listed = s.list_backups(BackupPool::PreIngest).await.unwrap();
  assert_eq!(listed.len(), 2);
  assert_eq!(listed[0].path, good);
  assert!(listed[0].compatible);
  assert_eq!(listed[0].query_count, 5);
  assert_eq!(listed[1].path, garbage);
  assert!(!listed[1].compatible);
  assert_eq!(listed[1].subscription_count, 0);
}

#[tokio::test]
async fn inspect_missing_file_is_not_found() {
  let s = store().await;
  let err = s.inspect_backup("/nonexistent/api_backup_x.db".into()).await.unwrap_err();
  assert!(matches!(err, Error::BackupNotFound(_)));
}

#[tokio::test]
async fn purge_removes_only_incompatible() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;
  let good = s.create_pre_ingest_backup().await.unwrap();

  let pool_dir = dir.path().join("api_backups");
  std::fs::write(pool_dir.join("api_backup_bad1.db"), b"junk").unwrap();

  // A valid SQLite file without the expected tables.
  let foreign = pool_dir.join("api_backup_bad2.db");
  rusqlite::Connection::open(&foreign)
    .unwrap()
    .execute_batch("CREATE TABLE unrelated (x INTEGER);")
    .unwrap();

  assert_eq!(s.purge_incompatible_backups().await.unwrap(), 2);
  let listed = s.list_backups(BackupPool::PreIngest).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].path, good);
}

// ─── Restore ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn restore_replaces_live_data_and_keeps_safety_copy() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;

  s.ingest(sample()).await.unwrap();
  let snapshot = s.create_pre_ingest_backup().await.unwrap();
  s.ingest(other_sample()).await.unwrap();
  assert_eq!(s.load().await.total_queries(), 1);

  let safety = s.restore(snapshot).await.unwrap();

  let data = s.load().await;
  assert_eq!(data.subscriptions.len(), 2);
  assert_eq!(data.total_queries(), 5);

  assert!(safety.starts_with(dir.path().join("backups")));
  let info = s.inspect_backup(safety).await.unwrap();
  assert_eq!(info.query_count, 1);

  // The reopened store accepts writes.
  s.ingest(other_sample()).await.unwrap();
  assert_eq!(s.load().await.total_queries(), 1);
}

#[tokio::test]
async fn restore_takes_safety_copy_even_when_backups_disabled() {
  let dir = TempDir::new().unwrap();
  let settings = BackupSettings { enabled: false, ..BackupSettings::under(dir.path()) };
  let s = SqliteStore::open(dir.path().join("subs.db"), settings).await.unwrap();
  s.ingest(sample()).await.unwrap();

  let snapshot = dir.path().join("export.db");
  std::fs::copy(dir.path().join("subs.db"), &snapshot).unwrap();

  let safety = s.restore(snapshot).await.unwrap();
  assert!(safety.exists());
  assert_eq!(s.list_backups(BackupPool::General).await.unwrap().len(), 1);
}

#[tokio::test]
async fn restore_rejects_incompatible_snapshot() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;
  s.ingest(sample()).await.unwrap();

  let bad = dir.path().join("bad.db");
  rusqlite::Connection::open(&bad)
    .unwrap()
    .execute_batch("CREATE TABLE subscriptions (id INTEGER);")
    .unwrap();

  let err = s.restore(bad).await.unwrap_err();
  assert!(matches!(err, Error::IncompatibleBackup(_)), "{err:?}");

  let data = s.load().await;
  assert_eq!(data.subscriptions.len(), 2);
  assert_eq!(data.total_queries(), 5);
  assert!(s.list_backups(BackupPool::General).await.unwrap().is_empty());
}

#[tokio::test]
async fn restore_rejects_missing_and_self() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;

  let err = s.restore(dir.path().join("missing.db")).await.unwrap_err();
  assert!(matches!(err, Error::BackupNotFound(_)));

  let err = s.restore(dir.path().join("subs.db")).await.unwrap_err();
  assert!(matches!(err, Error::SameFile(_)));

  let memory = store().await;
  let err = memory.restore(dir.path().join("subs.db")).await.unwrap_err();
  assert!(matches!(err, Error::NoLiveStore));
}

#[tokio::test]
async fn restore_of_oldest_general_backup_at_full_retention() {
  let dir = TempDir::new().unwrap();
  let settings = BackupSettings { retention: 3, ..BackupSettings::under(dir.path()) };
  let s = SqliteStore::open(dir.path().join("subs.db"), settings).await.unwrap();

  s.ingest(sample()).await.unwrap();
  let oldest = s.create_backup().await.unwrap().unwrap();
  set_mtime(&oldest, Duration::from_secs(3_600));
  s.ingest(other_sample()).await.unwrap();
  s.create_backup().await.unwrap().unwrap();
  s.create_backup().await.unwrap().unwrap();
  assert_eq!(s.list_backups(BackupPool::General).await.unwrap().len(), 3);

  let safety = s.restore(oldest.clone()).await.unwrap();
  assert_eq!(s.load().await.total_queries(), 5);
  assert!(oldest.exists());
  assert!(safety.exists());
  assert!(!dir.path().join(".subs.db.restore").exists());

  // The restored snapshot outlives that one trim; the next backup evens it out.
  assert_eq!(s.list_backups(BackupPool::General).await.unwrap().len(), 4);
  s.create_backup().await.unwrap().unwrap();
  assert_eq!(s.list_backups(BackupPool::General).await.unwrap().len(), 3);
  assert!(!oldest.exists());
}

#[tokio::test]
async fn failed_restore_copy_leaves_live_store_untouched() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;
  s.ingest(sample()).await.unwrap();
  let snapshot = s.create_pre_ingest_backup().await.unwrap();
  s.ingest(other_sample()).await.unwrap();
  let before = std::fs::read(dir.path().join("subs.db")).unwrap();

  // A directory where the staging copy would go makes the copy fail.
  std::fs::create_dir(dir.path().join(".subs.db.restore")).unwrap();

  let err = s.restore(snapshot).await.unwrap_err();
  assert!(matches!(err, Error::Io(_)), "{err:?}");
  assert_eq!(std::fs::read(dir.path().join("subs.db")).unwrap(), before);
  assert_eq!(s.load().await.total_queries(), 1);
  assert!(s.list_backups(BackupPool::General).await.unwrap().is_empty());
}

#[tokio::test]
async fn restore_racing_backups_never_damages_live_store() {
  let dir = TempDir::new().unwrap();
  let settings = BackupSettings { retention: 2, ..BackupSettings::under(dir.path()) };
  let s = SqliteStore::open(dir.path().join("subs.db"), settings).await.unwrap();

  s.ingest(sample()).await.unwrap();
  let oldest = s.create_backup().await.unwrap().unwrap();
  set_mtime(&oldest, Duration::from_secs(3_600));
  s.ingest(other_sample()).await.unwrap();
  s.create_backup().await.unwrap().unwrap();

  let (restored, first, second) =
    tokio::join!(s.restore(oldest.clone()), s.create_backup(), s.create_backup());
  first.unwrap();
  second.unwrap();

  // A trim that got in first removes the snapshot and the restore reports
  // it missing; otherwise the restore goes through.
  let data = s.load().await;
  assert!(!data.is_store_error());
  match restored {
    Ok(_) => assert_eq!(data.total_queries(), 5),
    Err(Error::BackupNotFound(_)) => assert_eq!(data.total_queries(), 1),
    Err(e) => panic!("unexpected restore error: {e:?}"),
  }
}

#[tokio::test]
async fn export_copies_into_directory_or_file() {
  let dir = TempDir::new().unwrap();
  let s = disk_store(&dir).await;
  s.ingest(sample()).await.unwrap();
  let snapshot = s.create_backup().await.unwrap().unwrap();

  let out = dir.path().join("exports");
  std::fs::create_dir_all(&out).unwrap();
  let written = s.export_backup(snapshot.clone(), out.clone()).await.unwrap();
  assert_eq!(written, out.join(snapshot.file_name().unwrap()));
  assert_eq!(std::fs::read(&written).unwrap(), std::fs::read(&snapshot).unwrap());

  let named = s
    .export_backup(snapshot.clone(), dir.path().join("nested/copy.db"))
    .await
    .unwrap();
  assert!(named.exists());

  let err = s.export_backup(dir.path().join("nope.db"), out).await.unwrap_err();
  assert!(matches!(err, Error::BackupNotFound(_)));
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_store_is_at_latest_version() {
  let s = store().await;
  assert_eq!(s.schema_version().await.unwrap(), schema::LATEST_VERSION);
}

#[tokio::test]
async fn reopening_applies_no_migrations_twice() {
  let dir = TempDir::new().unwrap();
  disk_store(&dir).await.ingest(sample()).await.unwrap();

  let s = disk_store(&dir).await;
  assert_eq!(s.schema_version().await.unwrap(), schema::LATEST_VERSION);
  assert_eq!(s.load().await.total_queries(), 5);

  let conn = rusqlite::Connection::open(dir.path().join("subs.db")).unwrap();
  let rows: i64 = conn
    .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
    .unwrap();
  assert_eq!(rows, schema::MIGRATIONS.len() as i64);
}

#[tokio::test]
async fn legacy_store_is_migrated() {
  let dir = TempDir::new().unwrap();
  let path = dir.path().join("legacy.db");
  {
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn
      .execute_batch(
        "CREATE TABLE subscriptions (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           name TEXT NOT NULL,
           gug_name TEXT,
           created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
           updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
         );
         CREATE TABLE queries (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           subscription_id INTEGER,
           query_text TEXT NOT NULL,
           human_name TEXT,
           display_name TEXT,
           last_check_time INTEGER,
           next_check_time INTEGER,
           next_check_status TEXT,
           paused BOOLEAN,
           dead BOOLEAN,
           checking_now BOOLEAN,
           can_check_now BOOLEAN,
           checker_status INTEGER,
           file_velocity_data TEXT,
           file_seed_cache_status TEXT,
           updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
           FOREIGN KEY (subscription_id) REFERENCES subscriptions (id)
         );
         INSERT INTO subscriptions (name, gug_name) VALUES ('old', 'legacy source');
         INSERT INTO queries (subscription_id, query_text, human_name, paused, file_velocity_data)
           VALUES (1, 'kept', NULL, 1, '[[1, 3600]]');",
      )
      .unwrap();
  }

  let s = SqliteStore::open(&path, BackupSettings::under(dir.path())).await.unwrap();
  assert_eq!(s.schema_version().await.unwrap(), schema::LATEST_VERSION);

  let data = s.load().await;
  assert!(!data.is_store_error(), "{:?}", data.error);
  assert_eq!(data.subscriptions[0].source_identifier, "legacy source");
  let kept = find(&data, "kept");
  assert!(kept.paused);
  assert_eq!(kept.human_name, "");
  assert_eq!(kept.last_file_time, 0);
  assert!(!kept.acknowledged);
  assert_eq!(kept.file_velocity, vec![json!([1, 3600])]);

  // The migrated store takes a normal refresh.
  s.ingest(sample()).await.unwrap();
  assert_eq!(s.load().await.total_queries(), 5);
}

#[tokio::test]
async fn stray_acknowledgment_times_are_normalized() {
  let dir = TempDir::new().unwrap();
  let path = dir.path().join("subs.db");
  {
    let s = SqliteStore::open(&path, BackupSettings::under(dir.path())).await.unwrap();
    s.ingest(sample()).await.unwrap();
  }
  {
    // Simulate a store written before normalization existed.
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn
      .execute_batch(
        "UPDATE queries SET acknowledged = 0, acknowledged_time = 12345;
         DELETE FROM schema_migrations WHERE version = 3;",
      )
      .unwrap();
  }

  let s = SqliteStore::open(&path, BackupSettings::under(dir.path())).await.unwrap();
  let conn = rusqlite::Connection::open(&path).unwrap();
  let stray: i64 = conn
    .query_row("SELECT COUNT(*) FROM queries WHERE acknowledged_time != 0", [], |r| r.get(0))
    .unwrap();
  assert_eq!(stray, 0);
  assert!(s.load().await.all_queries().iter().all(|(_, q)| q.acknowledged_time == 0));
}
