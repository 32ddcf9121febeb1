//! Headless subcommands. Each writes its report to `out`.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result, bail};
use submon_core::{
  config::{ApiConfig, AppConfig},
  format::{ack_until_label, acknowledged_label, format_timestamp, yes_no},
  model::Acknowledgment,
  rank::{RankedRow, Rgb, order_and_color},
  store::{BackupInfo, BackupPool, SubscriptionStore},
};
use submon_store_sqlite::SqliteStore;
use submon_sync::{ApiClient, FetchEvent, FetchHandle, FetchOptions, Fetcher};

pub fn fetcher(config: &AppConfig, store: SqliteStore) -> Result<Fetcher<SqliteStore>> {
  let client = ApiClient::new(&config.api)?;
  Ok(Fetcher::new(client, store, FetchOptions {
    api:                  config.api.clone(),
    backup_before_ingest: config.database.backup_enabled,
  }))
}

// ─── API ─────────────────────────────────────────────────────────────────────

pub async fn fetch(config: &AppConfig, store: &SqliteStore, out: &mut impl Write) -> Result<()> {
  let FetchHandle { mut events, task } = fetcher(config, store.clone())?.start()?;
  while let Some(event) = events.recv().await {
    match event {
      FetchEvent::Progress(stage) => writeln!(out, "{stage}")?,
      FetchEvent::Backup(path) => writeln!(out, "Backup created: {}", path.display())?,
      FetchEvent::Completed(outcome) => writeln!(
        out,
        "Fetched {} subscriptions with {} queries",
        outcome.summary.subscriptions, outcome.summary.queries
      )?,
      // Reported by the caller from the returned error.
      FetchEvent::Failed(_) => {}
    }
  }
  task.await.context("fetch task panicked")??;
  Ok(())
}

pub async fn check(api: &ApiConfig, out: &mut impl Write) -> Result<()> {
  api.validate()?;
  let version = ApiClient::new(api)?.api_version().await?;
  writeln!(
    out,
    "Connected to {} (API version {}, client version {})",
    api.base_url, version.version, version.hydrus_version
  )?;
  Ok(())
}

// ─── Listing ─────────────────────────────────────────────────────────────────

pub const COLUMNS: [&str; 12] = [
  "Subscription",
  "Human Name",
  "Query Text",
  "Last File Time",
  "Acknowledged",
  "Ack Until",
  "Last Check",
  "Next Check",
  "Next Check Status",
  "File Cache Status",
  "Paused",
  "Dead",
];

/// The twelve display cells of a row, in [`COLUMNS`] order.
pub fn cells(row: &RankedRow<'_>, now: i64) -> [String; 12] {
  let q = row.query;
  [
    row.subscription.to_owned(),
    q.display_text().to_owned(),
    q.query_text.clone(),
    format_timestamp(q.last_file_time),
    acknowledged_label(q).to_owned(),
    ack_until_label(q, now),
    format_timestamp(q.last_check_time),
    format_timestamp(q.next_check_time),
    q.next_check_status.clone(),
    q.file_seed_cache_status.clone(),
    yes_no(q.paused).to_owned(),
    yes_no(q.dead).to_owned(),
  ]
}

/// Dark text on light rows, light text otherwise.
pub fn foreground(background: Rgb) -> Rgb {
  if background.luma() >= 128_000 { Rgb::new(0, 0, 0) } else { Rgb::new(255, 255, 255) }
}

fn paint(line: &str, bg: Rgb) -> String {
  let fg = foreground(bg);
  format!(
    "\x1b[48;2;{};{};{}m\x1b[38;2;{};{};{}m{line}\x1b[0m",
    bg.r, bg.g, bg.b, fg.r, fg.g, fg.b
  )
}

/// Print the ordered table. Actively acknowledged rows are skipped unless
/// `all` is set.
pub async fn list(
  store: &SqliteStore,
  subscription: Option<&str>,
  all: bool,
  color: bool,
  out: &mut impl Write,
) -> Result<()> {
  let data = store.load().await;
  if let Some(error) = &data.error {
    bail!("could not load subscriptions: {error}");
  }
  if let Some(name) = subscription
    && data.subscription_by_name(name).is_none()
  {
    bail!("no subscription named {name:?}");
  }

  let now = submon_core::now();
  let rows: Vec<_> = order_and_color(data.queries(subscription), now)
    .into_iter()
    .filter(|row| all || !row.query.is_actively_acknowledged(now))
    .collect();

  let table: Vec<(Option<i64>, [String; 12], Rgb)> =
    rows.iter().map(|r| (r.query.id, cells(r, now), r.color)).collect();

  let mut widths = COLUMNS.map(|c| c.chars().count());
  for (_, row, _) in &table {
    for (w, cell) in widths.iter_mut().zip(row) {
      *w = (*w).max(cell.chars().count());
    }
  }
  let id_width = table
    .iter()
    .filter_map(|(id, ..)| id.map(|i| i.to_string().len()))
    .max()
    .unwrap_or(0)
    .max(2);

  let header = pad_line("ID", id_width, COLUMNS.iter().copied(), &widths);
  writeln!(out, "{header}")?;
  for (id, row, rgb) in &table {
    let id = id.map(|i| i.to_string()).unwrap_or_default();
    let line = pad_line(&id, id_width, row.iter().map(String::as_str), &widths);
    if color {
      writeln!(out, "{}", paint(&line, *rgb))?;
    } else {
      writeln!(out, "{line}")?;
    }
  }
  writeln!(
    out,
    "{} of {} queries shown ({} active)",
    table.len(),
    data.total_queries(),
    data.total_active_queries()
  )?;
  Ok(())
}

fn pad_line<'a>(
  id: &str,
  id_width: usize,
  cells: impl Iterator<Item = &'a str>,
  widths: &[usize; 12],
) -> String {
  let mut line = format!("{id:>id_width$}");
  for (cell, width) in cells.zip(widths) {
    line.push_str("  ");
    line.push_str(cell);
    line.push_str(&" ".repeat(width.saturating_sub(cell.chars().count())));
  }
  line.trim_end().to_owned()
}

// ─── Acknowledgments ─────────────────────────────────────────────────────────

pub async fn acknowledge(
  store: &SqliteStore,
  ids: &[i64],
  ack: Acknowledgment,
  out: &mut impl Write,
) -> Result<()> {
  let mut missing = Vec::new();
  for &id in ids {
    if !store.update_acknowledgment(id, ack).await? {
      missing.push(id);
    }
  }
  let updated = ids.len() - missing.len();
  let verb = if ack.acknowledged() { "Acknowledged" } else { "Unacknowledged" };
  match (ack.acknowledged(), ack.until()) {
    (true, until) if until > 0 => {
      writeln!(out, "{verb} {updated} queries until {}", format_timestamp(until))?
    }
    _ => writeln!(out, "{verb} {updated} queries")?,
  }
  if !missing.is_empty() {
    bail!("no query with id {missing:?}");
  }
  Ok(())
}

pub async fn clear_expired(store: &SqliteStore, out: &mut impl Write) -> Result<()> {
  let cleared = store.clear_expired_acknowledgments(submon_core::now()).await?;
  writeln!(out, "Cleared {cleared} expired acknowledgments")?;
  Ok(())
}

// ─── Backups ─────────────────────────────────────────────────────────────────

pub async fn backup(store: &SqliteStore, out: &mut impl Write) -> Result<()> {
  match store.create_backup().await? {
    Some(path) => writeln!(out, "Backup created: {}", path.display())?,
    None => writeln!(out, "Backups are disabled")?,
  }
  Ok(())
}

pub fn describe_backup(info: &BackupInfo) -> String {
  let created = info.created_at.with_timezone(&chrono::Local);
  let status = if info.compatible {
    format!("{} subscriptions, {} queries", info.subscription_count, info.query_count)
  } else {
    "incompatible".to_owned()
  };
  format!(
    "{}  {}  {:>8.1} KiB  {status}",
    info.file_name(),
    created.format("%Y-%m-%d %H:%M:%S"),
    info.size_bytes as f64 / 1024.0
  )
}

pub async fn backups(store: &SqliteStore, pool: BackupPool, out: &mut impl Write) -> Result<()> {
  let infos = store.list_backups(pool).await?;
  writeln!(
    out,
    "{} {} backups in {}",
    infos.len(),
    pool.label(),
    store.backup_settings().dir(pool).display()
  )?;
  for info in &infos {
    writeln!(out, "{}", describe_backup(info))?;
  }
  Ok(())
}

pub async fn restore(store: &SqliteStore, path: PathBuf, out: &mut impl Write) -> Result<()> {
  let safety = store.restore(path.clone()).await?;
  writeln!(out, "Restored {}", path.display())?;
  writeln!(out, "Previous state saved to {}", safety.display())?;
  Ok(())
}

pub async fn purge(store: &SqliteStore, out: &mut impl Write) -> Result<()> {
  let removed = store.purge_incompatible_backups().await?;
  writeln!(out, "Removed {removed} incompatible backups")?;
  Ok(())
}

pub async fn export(
  store: &SqliteStore,
  src: PathBuf,
  dest: PathBuf,
  out: &mut impl Write,
) -> Result<()> {
  let written = store.export_backup(src, dest).await?;
  writeln!(out, "Exported to {}", written.display())?;
  Ok(())
}
