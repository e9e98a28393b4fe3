//! Trigger loop for the job processor.
//!
//! Two paths feed the same sequential dispatcher:
//!
//! ```text
//! Scheduler
//!     │
//!     ├─► Push: change feed event with status = collected ─┐
//!     ├─► Queue: ids sent through a JobDispatcher ──────────┤
//!     ├─► Poll: every poll_interval, list collected rows ──┴─► JobProcessor::process (one at a time)
//!     └─► Reap: processing rows older than stale_after ─► mark_error
//! ```
//!
//! Jobs seen by several paths are harmless: the second claim loses and is skipped.
//! Reaping only happens between dispatches, so it never sees a job in flight.

use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::processor::{JobProcessor, ProcessOutcome};
use crate::kernel::{ChangeEvent, JobStatus, WorkerKernel};

/// Diagnostic written to jobs reset by the reaper.
pub const STALE_JOB_MESSAGE: &str = "Scraper timeout/hang detected.";

const JOBS_TABLE: &str = "jobs";

type ChangeStream = BoxStream<'static, Result<ChangeEvent>>;

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between poll cycles
    pub poll_interval: Duration,
    /// Pause between consecutive jobs of one poll cycle
    pub inter_job_delay: Duration,
    /// `processing` jobs created longer ago than this are reaped
    pub stale_after: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            inter_job_delay: Duration::from_secs(10),
            stale_after: Duration::from_secs(5 * 60),
        }
    }
}

/// Counts from one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub pending: usize,
    pub finalized: usize,
    pub failed: usize,
    pub skipped: usize,
    pub abandoned: usize,
    pub reaped: usize,
}

impl PollSummary {
    fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Skipped => self.skipped += 1,
            ProcessOutcome::Finalized => self.finalized += 1,
            ProcessOutcome::Failed(_) => self.failed += 1,
            ProcessOutcome::Abandoned(_) => self.abandoned += 1,
        }
    }
}

/// Routing fields of a changed row.
#[derive(Debug, Deserialize)]
struct ChangedRow {
    id: Uuid,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    is_deleted: bool,
}

enum Wake {
    Shutdown,
    Poll,
    Queued(Uuid),
    Change(Option<Result<ChangeEvent>>),
}

/// Queues job ids onto a running [`Scheduler`].
#[derive(Clone)]
pub struct JobDispatcher {
    tx: mpsc::UnboundedSender<Uuid>,
}

impl JobDispatcher {
    /// Queue `id`; fails once the scheduler has been dropped.
    pub fn dispatch(&self, id: Uuid) -> Result<()> {
        self.tx
            .send(id)
            .map_err(|_| anyhow!("Scheduler is not running"))
    }
}

pub struct Scheduler {
    kernel: WorkerKernel,
    processor: JobProcessor,
    config: SchedulerConfig,
    queue_tx: mpsc::UnboundedSender<Uuid>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<Uuid>>,
}

impl Scheduler {
    pub fn new(kernel: WorkerKernel, processor: JobProcessor, config: SchedulerConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            kernel,
            processor,
            config,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
        }
    }

    /// Handle for queueing jobs from outside the loop (e.g. the webhook route).
    pub fn dispatcher(&self) -> JobDispatcher {
        JobDispatcher {
            tx: self.queue_tx.clone(),
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// A job already being processed is finished before returning.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        ensure!(
            !self.config.poll_interval.is_zero(),
            "poll_interval must be greater than zero"
        );
        let mut queue = self
            .queue_rx
            .try_lock()
            .map_err(|_| anyhow!("Scheduler is already running"))?;

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            stale_after_secs = self.config.stale_after.as_secs(),
            "Scheduler starting (change feed + polling fallback)"
        );

        self.run_poll_cycle(&shutdown).await;

        let mut feed = self.subscribe().await;

        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let wake = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Wake::Shutdown,
                _ = ticker.tick() => Wake::Poll,
                Some(id) = queue.recv() => Wake::Queued(id),
                change = next_change(&mut feed) => Wake::Change(change),
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Poll => {
                    if feed.is_none() {
                        feed = self.subscribe().await;
                    }
                    self.run_poll_cycle(&shutdown).await;
                }
                Wake::Queued(id) => {
                    info!(job_id = %id, "Queued dispatch");
                    self.processor.process(id).await;
                }
                Wake::Change(Some(Ok(event))) => {
                    self.handle_change(event).await;
                }
                Wake::Change(Some(Err(e))) => {
                    warn!(error = %e, "Change feed failed; polling only until next cycle");
                    feed = None;
                }
                Wake::Change(None) => {
                    warn!("Change feed closed; polling only until next cycle");
                    feed = None;
                }
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    async fn subscribe(&self) -> Option<ChangeStream> {
        match self.kernel.change_feed.subscribe().await {
            Ok(stream) => {
                info!("Change feed subscription active");
                Some(stream)
            }
            Err(e) => {
                warn!(error = %e, "Change feed unavailable; relying on polling");
                None
            }
        }
    }

    /// Dispatch a change event if its row is a collectable job.
    ///
    /// Returns the processing outcome, or `None` when the event was ignored.
    pub async fn handle_change(&self, event: ChangeEvent) -> Option<ProcessOutcome> {
        if event.table != JOBS_TABLE {
            return None;
        }

        let record = event.record?;
        let row: ChangedRow = match serde_json::from_value(record) {
            Ok(row) => row,
            Err(e) => {
                debug!(error = %e, "Ignoring change event with unexpected record shape");
                return None;
            }
        };

        if row.status != Some(JobStatus::Collected) || row.is_deleted {
            return None;
        }

        info!(job_id = %row.id, kind = ?event.kind, "Change feed dispatch");
        Some(self.processor.process(row.id).await)
    }

    /// Scan for pending jobs, dispatch them one by one, then reap stale ones.
    ///
    /// Stops dispatching (but still reaps) once `shutdown` is cancelled.
    pub async fn run_poll_cycle(&self, shutdown: &CancellationToken) -> PollSummary {
        let mut summary = PollSummary::default();

        match self.kernel.store.list_pending().await {
            Ok(jobs) => {
                summary.pending = jobs.len();
                if !jobs.is_empty() {
                    info!(count = jobs.len(), "Found pending jobs");
                }

                for (index, job) in jobs.iter().enumerate() {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    if index > 0 {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(self.config.inter_job_delay) => {}
                        }
                    }

                    let outcome = self.processor.process(job.id).await;
                    summary.record(&outcome);
                }
            }
            Err(e) => error!(error = %e, "Failed to scan for pending jobs"),
        }

        match self.reap_stale().await {
            Ok(reaped) => summary.reaped = reaped,
            Err(e) => error!(error = %e, "Failed to reap stale jobs"),
        }

        debug!(?summary, "Poll cycle finished");
        summary
    }

    /// Force `processing` jobs older than `stale_after` to `error`.
    pub async fn reap_stale(&self) -> Result<usize> {
        let stale_after = chrono::Duration::from_std(self.config.stale_after)
            .context("stale_after is out of range")?;
        let threshold = Utc::now() - stale_after;

        let stale = self.kernel.store.list_stale(threshold).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        info!(count = stale.len(), "Found stale jobs, resetting to error");
        let mut reaped = 0;
        for job in stale {
            match self.kernel.store.mark_error(job.id, STALE_JOB_MESSAGE).await {
                Ok(true) => {
                    warn!(job_id = %job.id, created_at = %job.created_at, "Stale job reset to error");
                    reaped += 1;
                }
                Ok(false) => debug!(job_id = %job.id, "Stale job settled before reaping"),
                Err(e) => error!(job_id = %job.id, error = %e, "Failed to reset stale job"),
            }
        }
        Ok(reaped)
    }
}

/// Next event from the feed; pending forever while unsubscribed.
async fn next_change(feed: &mut Option<ChangeStream>) -> Option<Result<ChangeEvent>> {
    match feed {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
