//! Application state machine and event dispatcher.

use std::{collections::HashSet, path::PathBuf};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use submon_core::{
  config::AppConfig,
  model::{Acknowledgment, QueryKey, RowRef, SubscriptionData},
  rank::{RankedRow, order_and_color},
  store::{BackupInfo, BackupPool, SubscriptionStore, apply_acknowledgment},
};
use submon_store_sqlite::SqliteStore;
use submon_sync::{FetchError, FetchEvent, FetchStage, Fetcher};
use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};

// ─── Screen ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
  /// Subscription list and query table.
  Main,
  /// Snapshot browser for one backup pool.
  Backups,
}

/// Which pane of the main screen receives navigation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
  Subscriptions,
  Queries,
}

/// An action waiting for `y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
  Fetch,
  Restore(PathBuf),
  Purge,
}

impl Prompt {
  pub fn question(&self) -> String {
    match self {
      Prompt::Fetch => "Fetch subscriptions from the API and replace local data? (y/n)".into(),
      Prompt::Restore(path) => {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        format!("Restore {name}? The current state is backed up first. (y/n)")
      }
      Prompt::Purge => "Delete all incompatible pre-ingest backups? (y/n)".into(),
    }
  }
}

// ─── App ──────────────────────────────────────────────────────────────────────

pub struct App {
  pub config:  AppConfig,
  pub store:   SqliteStore,
  pub fetcher: Fetcher<SqliteStore>,

  /// Last snapshot read from the store.
  pub data: SubscriptionData,
  /// Instant the ack expiry and row colors are evaluated at; refreshed on
  /// every reload.
  pub now:  i64,

  pub screen: Screen,
  pub focus:  Focus,

  /// `0` is "All subscriptions", `n` is `data.subscriptions[n - 1]`.
  pub subscription_cursor: usize,
  /// Position within [`App::rows`].
  pub query_cursor:        usize,
  pub selected:            HashSet<QueryKey>,

  pub filter:        String,
  pub filter_active: bool,

  pub backup_pool:   BackupPool,
  pub backups:       Vec<BackupInfo>,
  pub backup_cursor: usize,

  pub prompt:      Option<Prompt>,
  pub status_msg:  String,
  pub fetch_stage: Option<FetchStage>,
  fetch_events:    Option<UnboundedReceiver<FetchEvent>>,
}

impl App {
  pub fn new(config: AppConfig, store: SqliteStore, fetcher: Fetcher<SqliteStore>) -> Self {
    Self {
      config,
      store,
      fetcher,
      data: SubscriptionData::default(),
      now: submon_core::now(),
      screen: Screen::Main,
      focus: Focus::Queries,
      subscription_cursor: 0,
      query_cursor: 0,
      selected: HashSet::new(),
      filter: String::new(),
      filter_active: false,
      backup_pool: BackupPool::PreIngest,
      backups: Vec::new(),
      backup_cursor: 0,
      prompt: None,
      status_msg: String::new(),
      fetch_stage: None,
      fetch_events: None,
    }
  }

  // ── Data loading ──────────────────────────────────────────────────────────

  pub async fn reload(&mut self) {
    self.data = self.store.load().await;
    self.now = submon_core::now();

    if let Some(error) = &self.data.error {
      self.status_msg = format!("Error loading subscriptions: {error}");
    }

    self.subscription_cursor = self.subscription_cursor.min(self.data.subscriptions.len());
    let keys: HashSet<QueryKey> = self
      .data
      .all_queries()
      .into_iter()
      .map(|(sub, q)| q.key(sub))
      .collect();
    self.selected.retain(|k| keys.contains(k));
    self.clamp_query_cursor();
  }

  pub async fn load_backups(&mut self) {
    match self.store.list_backups(self.backup_pool).await {
      Ok(backups) => self.backups = backups,
      Err(e) => {
        self.backups.clear();
        self.status_msg = format!("Error listing backups: {e}");
      }
    }
    self.backup_cursor = self.backup_cursor.min(self.backups.len().saturating_sub(1));
  }

  // ── Derived views ─────────────────────────────────────────────────────────

  /// Index of the subscription under the left cursor, `None` for "All".
  fn subscription_index(&self) -> Option<usize> {
    self
      .subscription_cursor
      .checked_sub(1)
      .filter(|&i| i < self.data.subscriptions.len())
  }

  /// Name of the subscription under the left cursor, `None` for "All".
  pub fn subscription_filter(&self) -> Option<&str> {
    self
      .subscription_index()
      .map(|i| self.data.subscriptions[i].name.as_str())
  }

  /// Visible rows in presentation order, colored.
  pub fn rows(&self) -> Vec<RankedRow<'_>> {
    let mut pairs = self.data.queries_at(self.subscription_index());
    if !self.filter.is_empty() {
      let matcher = SkimMatcherV2::default();
      pairs.retain(|(sub, q)| {
        [q.display_text(), q.query_text.as_str(), *sub]
          .iter()
          .any(|text| matcher.fuzzy_match(text, &self.filter).is_some())
      });
    }
    order_and_color(pairs, self.now)
  }

  pub fn is_selected(&self, row: &RankedRow<'_>) -> bool {
    self.selected.contains(&row.query.key(row.subscription))
  }

  /// The selection, or the row under the cursor when nothing is selected.
  fn targets(&self) -> Vec<RowRef> {
    let rows = self.rows();
    if self.selected.is_empty() {
      return rows
        .get(self.query_cursor)
        .map(|r| RowRef::of(r.subscription, r.query))
        .into_iter()
        .collect();
    }
    rows
      .iter()
      .filter(|r| self.is_selected(r))
      .map(|r| RowRef::of(r.subscription, r.query))
      .collect()
  }

  fn clamp_query_cursor(&mut self) {
    let len = self.rows().len();
    self.query_cursor = self.query_cursor.min(len.saturating_sub(1));
  }

  // ── Actions ───────────────────────────────────────────────────────────────

  async fn acknowledge(&mut self, ack: Acknowledgment) {
    let targets = self.targets();
    if targets.is_empty() {
      self.status_msg = "No query selected".into();
      return;
    }
    match apply_acknowledgment(&self.store, &targets, ack).await {
      Ok(n) if ack.acknowledged() => {
        self.status_msg = format!("Acknowledged {n} queries");
        self.selected.clear();
      }
      Ok(n) => {
        self.status_msg = format!("Unacknowledged {n} queries");
        self.selected.clear();
      }
      Err(e) => self.status_msg = format!("Error: {e}"),
    }
    let status = std::mem::take(&mut self.status_msg);
    self.reload().await;
    if self.status_msg.is_empty() {
      self.status_msg = status;
    }
  }

  async fn acknowledge_for(&mut self, days: i64) {
    match Acknowledgment::for_days(days, submon_core::now()) {
      Ok(ack) => self.acknowledge(ack).await,
      Err(e) => self.status_msg = format!("Error: {e}"),
    }
  }

  fn start_fetch(&mut self) {
    match self.fetcher.start() {
      Ok(handle) => {
        // The task runs detached; its result also arrives as an event.
        self.fetch_events = Some(handle.events);
        self.status_msg = "Fetch started".into();
      }
      Err(FetchError::InProgress) => self.status_msg = "A fetch is already in progress".into(),
      Err(e) => self.status_msg = format!("Fetch failed: {e}"),
    }
  }

  /// Apply any fetch events that arrived since the last frame.
  pub async fn poll_fetch(&mut self) {
    let Some(rx) = &mut self.fetch_events else { return };

    let mut events = Vec::new();
    let mut finished = false;
    loop {
      match rx.try_recv() {
        Ok(event) => events.push(event),
        Err(TryRecvError::Empty) => break,
        Err(TryRecvError::Disconnected) => {
          finished = true;
          break;
        }
      }
    }
    if finished {
      self.fetch_events = None;
    }

    for event in events {
      match event {
        FetchEvent::Progress(stage) => {
          self.fetch_stage = Some(stage);
          self.status_msg = stage.to_string();
        }
        FetchEvent::Backup(path) => {
          self.status_msg = format!("Backup created: {}", path.display());
        }
        FetchEvent::Completed(outcome) => {
          self.fetch_stage = None;
          self.reload().await;
          self.status_msg = format!(
            "Fetched {} subscriptions with {} queries",
            outcome.summary.subscriptions, outcome.summary.queries
          );
        }
        FetchEvent::Failed(message) => {
          self.fetch_stage = None;
          self.status_msg = format!("Fetch failed: {message}");
        }
      }
    }
  }

  async fn backup_now(&mut self) {
    self.status_msg = match self.store.create_backup().await {
      Ok(Some(path)) => format!("Backup created: {}", path.display()),
      Ok(None) => "Backups are disabled".into(),
      Err(e) => format!("Backup failed: {e}"),
    };
  }

  async fn open_backups(&mut self) {
    self.screen = Screen::Backups;
    self.backup_cursor = 0;
    self.load_backups().await;
  }

  async fn confirm(&mut self, prompt: Prompt) {
    match prompt {
      Prompt::Fetch => self.start_fetch(),
      Prompt::Restore(path) => match self.store.restore(path.clone()).await {
        Ok(safety) => {
          self.reload().await;
          self.load_backups().await;
          self.status_msg = format!(
            "Restored {} (previous state saved to {})",
            path.display(),
            safety.display()
          );
        }
        Err(e) => self.status_msg = format!("Restore failed: {e}"),
      },
      Prompt::Purge => match self.store.purge_incompatible_backups().await {
        Ok(n) => {
          self.load_backups().await;
          self.status_msg = format!("Removed {n} incompatible backups");
        }
        Err(e) => self.status_msg = format!("Purge failed: {e}"),
      },
    }
  }

  // ── Key handling ──────────────────────────────────────────────────────────

  /// Process a key event. Returns `true` to continue, `false` to quit.
  pub async fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
      return Ok(false);
    }

    if let Some(prompt) = self.prompt.take() {
      if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
        self.confirm(prompt).await;
      } else {
        self.status_msg = "Cancelled".into();
      }
      return Ok(true);
    }

    if self.filter_active {
      self.handle_filter_key(key);
      return Ok(true);
    }

    match self.screen {
      Screen::Main => self.handle_main_key(key).await,
      Screen::Backups => self.handle_backup_key(key).await,
    }
  }

  fn handle_filter_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.filter_active = false;
        self.filter.clear();
      }
      KeyCode::Enter => self.filter_active = false,
      KeyCode::Backspace => {
        self.filter.pop();
      }
      KeyCode::Char(c) => self.filter.push(c),
      _ => {}
    }
    self.query_cursor = 0;
  }

  async fn handle_main_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    self.status_msg.clear();
    match key.code {
      KeyCode::Char('q') => return Ok(false),

      KeyCode::Tab => {
        self.focus = match self.focus {
          Focus::Subscriptions => Focus::Queries,
          Focus::Queries => Focus::Subscriptions,
        };
      }

      KeyCode::Down | KeyCode::Char('j') => match self.focus {
        Focus::Subscriptions => {
          if self.subscription_cursor < self.data.subscriptions.len() {
            self.subscription_cursor += 1;
            self.query_cursor = 0;
          }
        }
        Focus::Queries => {
          if self.query_cursor + 1 < self.rows().len() {
            self.query_cursor += 1;
          }
        }
      },
      KeyCode::Up | KeyCode::Char('k') => match self.focus {
        Focus::Subscriptions => {
          if self.subscription_cursor > 0 {
            self.subscription_cursor -= 1;
            self.query_cursor = 0;
          }
        }
        Focus::Queries => self.query_cursor = self.query_cursor.saturating_sub(1),
      },

      KeyCode::Char(' ') if self.focus == Focus::Queries => {
        let key = self
          .rows()
          .get(self.query_cursor)
          .map(|r| r.query.key(r.subscription));
        if let Some(key) = key
          && !self.selected.remove(&key)
        {
          self.selected.insert(key);
        }
      }
      KeyCode::Esc => self.selected.clear(),

      KeyCode::Char('a') => self.acknowledge_for(self.config.ui.default_ack_days).await,
      KeyCode::Char(c @ '1'..='4') => {
        let index = c as usize - '1' as usize;
        match self.config.ui.ack_day_options.get(index).copied() {
          Some(days) => self.acknowledge_for(days).await,
          None => self.status_msg = format!("No acknowledgment option {c}"),
        }
      }
      KeyCode::Char('u') => self.acknowledge(Acknowledgment::cleared()).await,

      KeyCode::Char('r') => {
        if self.fetcher.is_running() {
          self.status_msg = "A fetch is already in progress".into();
        } else {
          self.prompt = Some(Prompt::Fetch);
        }
      }
      KeyCode::Char('l') => {
        self.reload().await;
        if self.status_msg.is_empty() {
          self.status_msg = format!("Loaded {} queries", self.data.total_queries());
        }
      }
      KeyCode::Char('b') => self.backup_now().await,
      KeyCode::Char('B') => self.open_backups().await,

      KeyCode::Char('/') => {
        self.filter_active = true;
        self.filter.clear();
        self.query_cursor = 0;
      }

      _ => {}
    }
    Ok(true)
  }

  async fn handle_backup_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    self.status_msg.clear();
    match key.code {
      KeyCode::Char('q') => return Ok(false),
      KeyCode::Esc | KeyCode::Char('h') => self.screen = Screen::Main,

      KeyCode::Tab => {
        self.backup_pool = self.backup_pool.other();
        self.backup_cursor = 0;
        self.load_backups().await;
      }
      KeyCode::Down | KeyCode::Char('j') => {
        if self.backup_cursor + 1 < self.backups.len() {
          self.backup_cursor += 1;
        }
      }
      KeyCode::Up | KeyCode::Char('k') => {
        self.backup_cursor = self.backup_cursor.saturating_sub(1);
      }

      KeyCode::Enter => match self.backups.get(self.backup_cursor) {
        Some(info) if info.compatible => {
          self.prompt = Some(Prompt::Restore(info.path.clone()));
        }
        Some(_) => self.status_msg = "That backup is incompatible and cannot be restored".into(),
        None => self.status_msg = "No backup selected".into(),
      },
      KeyCode::Char('x') => self.prompt = Some(Prompt::Purge),

      _ => {}
    }
    Ok(true)
  }
}
