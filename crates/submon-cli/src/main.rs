//! `submon`: triage tool for subscription queries.
//!
//! # Usage
//!
//! ```text
//! submon                                  # terminal UI
//! submon --api-key <KEY> fetch
//! submon list --subscription artists --all
//! submon ack 12 13 --days 60
//! submon backups --pool general
//! ```

mod app;
mod commands;
mod settings;
mod ui;

use std::{
  fs::OpenOptions,
  io::{self, Write},
  path::{Path, PathBuf},
  sync::Mutex,
  time::Duration,
};

use anyhow::{Context, Result};
use app::App;
use clap::{Parser, Subcommand, ValueEnum};
use crossterm::{
  event::{self, Event, KeyEventKind},
  execute,
  terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use settings::Overrides;
use submon_core::{config::AppConfig, model::Acknowledgment, store::BackupPool};
use submon_store_sqlite::{BackupSettings, SqliteStore};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "submon", version, about = "Track and triage subscription queries")]
struct Cli {
  /// Path to the TOML config file.
  #[arg(short, long, value_name = "FILE", default_value = "config.toml", env = "SUBMON_CONFIG")]
  config: PathBuf,

  /// Base URL of the subscription API.
  #[arg(long, env = "SUBMON_URL")]
  url: Option<String>,

  /// API access key (64 hex characters).
  #[arg(long, env = "SUBMON_API_KEY", hide_env_values = true)]
  api_key: Option<String>,

  /// Path of the SQLite store.
  #[arg(long, value_name = "FILE")]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Open the terminal UI (the default).
  Tui,
  /// Fetch subscriptions from the API and replace the local data.
  Fetch,
  /// Test the connection to the API.
  Check,
  /// Print the ordered query table.
  List {
    /// Only queries of this subscription.
    #[arg(short, long)]
    subscription: Option<String>,
    /// Include queries whose acknowledgment is still active.
    #[arg(short, long)]
    all:          bool,
    /// Print without row colors.
    #[arg(long)]
    no_color:     bool,
  },
  /// Acknowledge queries by id.
  Ack {
    #[arg(required = true)]
    ids:  Vec<i64>,
    /// Days until the acknowledgment expires (default: ui.default_ack_days).
    #[arg(short, long)]
    days: Option<i64>,
  },
  /// Clear the acknowledgment of queries by id.
  Unack {
    #[arg(required = true)]
    ids: Vec<i64>,
  },
  /// Reset every acknowledgment whose expiry has passed.
  ClearExpired,
  /// Back up the store into the general pool.
  Backup,
  /// List the backups of one pool.
  Backups {
    #[arg(short, long, value_enum, default_value_t = Pool::PreIngest)]
    pool: Pool,
  },
  /// Replace the store with a backup. The current state is saved first.
  Restore { path: PathBuf },
  /// Delete incompatible pre-ingest backups.
  PurgeBackups,
  /// Copy a backup to another file or directory.
  ExportBackup { src: PathBuf, dest: PathBuf },
  /// Manage the config file.
  Config {
    #[command(subcommand)]
    action: ConfigCommand,
  },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
  /// Write the default configuration.
  Init {
    #[arg(long)]
    force: bool,
  },
  /// Print the effective configuration.
  Show,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Pool {
  General,
  PreIngest,
}

impl From<Pool> for BackupPool {
  fn from(pool: Pool) -> Self {
    match pool {
      Pool::General => BackupPool::General,
      Pool::PreIngest => BackupPool::PreIngest,
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let command = cli.command.unwrap_or(Command::Tui);

  if let Command::Config { action: ConfigCommand::Init { force } } = command {
    init_logging(None)?;
    settings::init(&cli.config, force)?;
    println!("Wrote {}", cli.config.display());
    return Ok(());
  }

  let overrides = Overrides { url: cli.url, api_key: cli.api_key, db: cli.db };
  let config = settings::load(&cli.config, &overrides)?;

  let tui = matches!(command, Command::Tui);
  init_logging(tui.then_some(config.logging.file.as_path()))?;

  if let Command::Config { action: ConfigCommand::Show } = command {
    print!("{}", settings::show(&config)?);
    return Ok(());
  }

  config.validate()?;
  let store = open_store(&config).await?;
  tracing::debug!(path = %config.database.path.display(), "opened store");

  if tui {
    return run_tui(config, store).await;
  }

  let mut out = io::stdout().lock();
  match command {
    Command::Fetch => commands::fetch(&config, &store, &mut out).await?,
    Command::Check => commands::check(&config.api, &mut out).await?,
    Command::List { subscription, all, no_color } => {
      commands::list(&store, subscription.as_deref(), all, !no_color, &mut out).await?
    }
    Command::Ack { ids, days } => {
      let days = days.unwrap_or(config.ui.default_ack_days);
      let ack = Acknowledgment::for_days(days, submon_core::now())?;
      commands::acknowledge(&store, &ids, ack, &mut out).await?
    }
    Command::Unack { ids } => {
      commands::acknowledge(&store, &ids, Acknowledgment::cleared(), &mut out).await?
    }
    Command::ClearExpired => commands::clear_expired(&store, &mut out).await?,
    Command::Backup => commands::backup(&store, &mut out).await?,
    Command::Backups { pool } => commands::backups(&store, pool.into(), &mut out).await?,
    Command::Restore { path } => commands::restore(&store, path, &mut out).await?,
    Command::PurgeBackups => commands::purge(&store, &mut out).await?,
    Command::ExportBackup { src, dest } => commands::export(&store, src, dest, &mut out).await?,
    Command::Tui | Command::Config { .. } => {}
  }
  out.flush()?;
  Ok(())
}

/// One process-wide subscriber: a log file while the TUI owns the terminal,
/// stderr otherwise.
fn init_logging(file: Option<&Path>) -> Result<()> {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();

  match file {
    Some(path) => {
      if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
          .with_context(|| format!("creating log directory {}", parent.display()))?;
      }
      let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    }
  }
  Ok(())
}

async fn open_store(config: &AppConfig) -> Result<SqliteStore> {
  let path = &config.database.path;
  let store = SqliteStore::open(path, BackupSettings::from_config(&config.database))
    .await
    .with_context(|| format!("failed to open store at {}", path.display()))?;
  Ok(store.keep_acknowledgments_on_refresh(config.database.keep_acknowledgments_on_refresh))
}

// ─── TUI ──────────────────────────────────────────────────────────────────────

async fn run_tui(config: AppConfig, store: SqliteStore) -> Result<()> {
  let fetcher = commands::fetcher(&config, store.clone())?;
  let mut app = App::new(config, store, fetcher);
  app.reload().await;

  enable_raw_mode().context("enabling raw mode")?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
  let backend = CrosstermBackend::new(stdout);
  let mut terminal = Terminal::new(backend).context("creating terminal")?;

  let run_result = run_event_loop(&mut terminal, &mut app).await;

  // Restore terminal regardless of result.
  disable_raw_mode().ok();
  execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
  terminal.show_cursor().ok();

  run_result
}

async fn run_event_loop(
  terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
  app: &mut App,
) -> Result<()> {
  loop {
    app.poll_fetch().await;
    terminal.draw(|f| ui::draw(f, app)).context("drawing frame")?;

    // Poll for an event, yielding control to tokio while waiting.
    let maybe_event = tokio::task::block_in_place(|| {
      if event::poll(Duration::from_millis(50))? {
        Ok::<_, io::Error>(Some(event::read()?))
      } else {
        Ok(None)
      }
    })?;

    if let Some(Event::Key(key)) = maybe_event
      && key.kind == KeyEventKind::Press
      && !app.handle_key(key).await?
    {
      break;
    }
  }

  Ok(())
}
