//! The fetch orchestrator: API call, shape check, snapshot, ingest.
//!
//! One fetch may be in flight per [`Fetcher`] (and its clones). Progress is
//! reported on an unbounded channel so the sender never waits on a slow
//! consumer such as a render loop.

use std::{
  fmt,
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use chrono::{DateTime, Utc};
use submon_core::{
  config::ApiConfig,
  payload::Payload,
  store::{BackupIngestError, IngestSummary, SubscriptionStore},
};
use tokio::{
  sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
  task::JoinHandle,
};

use crate::{ApiClient, FetchError};

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
  Connecting,
  Fetching,
  Processing,
  Saving,
}

impl fmt::Display for FetchStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      FetchStage::Connecting => "Connecting to API...",
      FetchStage::Fetching => "Fetching subscriptions...",
      FetchStage::Processing => "Processing data...",
      FetchStage::Saving => "Saving to database...",
    })
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
  Progress(FetchStage),
  /// A pre-ingest snapshot was written.
  Backup(PathBuf),
  Completed(FetchOutcome),
  /// The user-facing message of the [`FetchError`] that ended the fetch.
  Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
  pub summary:    IngestSummary,
  pub backup:     Option<PathBuf>,
  pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
  pub api:                  ApiConfig,
  /// Snapshot the store into the pre-ingest pool before replacing it.
  pub backup_before_ingest: bool,
}

/// A running fetch. Events end with exactly one `Completed` or `Failed`.
pub struct FetchHandle {
  pub events: UnboundedReceiver<FetchEvent>,
  pub task:   JoinHandle<Result<FetchOutcome, FetchError>>,
}

// ─── In-progress guard ───────────────────────────────────────────────────────

struct Busy(Arc<AtomicBool>);

impl Busy {
  fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, FetchError> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .map_err(|_| FetchError::InProgress)?;
    Ok(Self(flag.clone()))
  }
}

impl Drop for Busy {
  fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

// ─── Fetcher ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Fetcher<S> {
  client:  ApiClient,
  store:   S,
  options: FetchOptions,
  busy:    Arc<AtomicBool>,
}

impl<S: SubscriptionStore> Fetcher<S> {
  pub fn new(client: ApiClient, store: S, options: FetchOptions) -> Self {
    Self { client, store, options, busy: Arc::new(AtomicBool::new(false)) }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn is_running(&self) -> bool { self.busy.load(Ordering::Acquire) }

  /// Spawn a fetch on the runtime. Rejected with
  /// [`FetchError::InProgress`] while another is in flight.
  pub fn start(&self) -> Result<FetchHandle, FetchError>
  where
    S: Clone + 'static,
  {
    let busy = Busy::acquire(&self.busy)?;
    let (tx, events) = unbounded_channel();
    let this = self.clone();
    let task = tokio::spawn(async move {
      let _busy = busy;
      this.report(&tx).await
    });
    Ok(FetchHandle { events, task })
  }

  /// Fetch in the current task, sending events to `tx`.
  pub async fn run(
    &self,
    tx: &UnboundedSender<FetchEvent>,
  ) -> Result<FetchOutcome, FetchError> {
    let _busy = Busy::acquire(&self.busy)?;
    self.report(tx).await
  }

  async fn report(
    &self,
    tx: &UnboundedSender<FetchEvent>,
  ) -> Result<FetchOutcome, FetchError> {
    let result = self.execute(tx).await;
    match &result {
      Ok(outcome) => {
        tracing::info!(
          subscriptions = outcome.summary.subscriptions,
          queries = outcome.summary.queries,
          "fetch completed"
        );
        tx.send(FetchEvent::Completed(outcome.clone())).ok();
      }
      Err(e) => {
        tracing::error!(error = %e, "fetch failed");
        tx.send(FetchEvent::Failed(e.to_string())).ok();
      }
    }
    result
  }

  async fn execute(
    &self,
    tx: &UnboundedSender<FetchEvent>,
  ) -> Result<FetchOutcome, FetchError> {
    let stage = |stage: FetchStage| {
      tracing::debug!(%stage, "fetch stage");
      tx.send(FetchEvent::Progress(stage)).ok();
    };

    if !self.options.api.enabled {
      return Err(FetchError::Disabled);
    }
    self.options.api.validate()?;

    stage(FetchStage::Connecting);
    stage(FetchStage::Fetching);
    let body = self.client.get_subscriptions().await?;

    stage(FetchStage::Processing);
    let payload = Payload::from_slice(&body)?;
    let fetched_at = Utc::now();

    stage(FetchStage::Saving);
    let (backup, summary) = if self.options.backup_before_ingest {
      let (path, summary) = self.store.ingest_with_backup(payload).await.map_err(|e| match e {
        BackupIngestError::Backup(e) => FetchError::Backup(Box::new(e)),
        BackupIngestError::Ingest(e) => FetchError::Persistence(Box::new(e)),
      })?;
      tx.send(FetchEvent::Backup(path.clone())).ok();
      (Some(path), summary)
    } else {
      let summary = self
        .store
        .ingest(payload)
        .await
        .map_err(|e| FetchError::Persistence(Box::new(e)))?;
      (None, summary)
    };

    Ok(FetchOutcome { summary, backup, fetched_at })
  }
}
