//! One job, end to end: claim, scrape, refine, persist.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::refiner::{FieldRefiner, RefineError};
use crate::kernel::{EnrichedFields, ExtractError, Job, WorkerKernel};

/// Configuration for the job processor
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Wall-clock budget for scrape + refine + persist
    pub timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Claim lost or job not collectable; nothing was touched.
    Skipped,
    Finalized,
    /// Marked `error` with this diagnostic.
    Failed(String),
    /// Not settled because the store failed. A failed claim leaves the job
    /// `collected` for the next poll; a failed final write leaves it
    /// `processing` for the reaper.
    Abandoned(String),
}

/// Failure inside one job's pipeline.
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("Scraper Error: {0}")]
    Scrape(#[from] ExtractError),

    #[error("Refiner Error: {0}")]
    Refine(#[from] RefineError),

    #[error("Job processing timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0:#}")]
    Persist(anyhow::Error),
}

/// Drives a single job through its state machine.
#[derive(Clone)]
pub struct JobProcessor {
    kernel: WorkerKernel,
    refiner: FieldRefiner,
    config: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(kernel: WorkerKernel, config: ProcessorConfig) -> Self {
        let refiner = FieldRefiner::new(kernel.ai.clone());
        Self {
            kernel,
            refiner,
            config,
        }
    }

    /// Process `id` if it can still be claimed.
    ///
    /// Never returns an error: every failure is folded into the outcome so a
    /// bad job can't take down the caller's loop.
    pub async fn process(&self, id: Uuid) -> ProcessOutcome {
        let job = match self.kernel.store.claim(id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                info!(job_id = %id, "Job already claimed or no longer collected, skipping");
                return ProcessOutcome::Skipped;
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "Failed to claim job");
                return ProcessOutcome::Abandoned(format!("{e:#}"));
            }
        };

        info!(job_id = %job.id, url = %job.normalized_url, "Job claimed");

        let failure = match tokio::time::timeout(self.config.timeout, self.enrich(&job)).await {
            Ok(Ok(fields)) => {
                info!(
                    job_id = %job.id,
                    title = fields.title.as_deref().unwrap_or("-"),
                    company = fields.company.as_deref().unwrap_or("-"),
                    "Job finalized"
                );
                return ProcessOutcome::Finalized;
            }
            Ok(Err(failure)) => failure,
            Err(_) => JobFailure::Timeout(self.config.timeout),
        };

        if let JobFailure::Persist(e) = &failure {
            error!(job_id = %job.id, error = %e, "Failed to persist job; leaving it for the reaper");
            return ProcessOutcome::Abandoned(failure.to_string());
        }

        let message = failure.to_string();
        warn!(job_id = %job.id, error = %message, "Job failed");

        match self.kernel.store.mark_error(job.id, &message).await {
            Ok(true) => ProcessOutcome::Failed(message),
            Ok(false) => {
                warn!(job_id = %job.id, "Job left processing before it could be marked as error");
                ProcessOutcome::Failed(message)
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to record job error");
                ProcessOutcome::Abandoned(message)
            }
        }
    }

    async fn enrich(&self, job: &Job) -> Result<EnrichedFields, JobFailure> {
        info!(job_id = %job.id, "Scraping");
        let page = self.kernel.extractor.extract(&job.normalized_url).await?;

        info!(job_id = %job.id, chars = page.content.chars().count(), "Refining");
        let refined = self.refiner.refine(&page.content, &job.normalized_url).await?;

        info!(job_id = %job.id, "Persisting");
        let fields = EnrichedFields::from(refined);
        match self.kernel.store.finalize(job.id, &fields).await {
            Ok(true) => Ok(fields),
            Ok(false) => Err(JobFailure::Persist(anyhow::anyhow!(
                "job {} left processing before it could be finalized",
                job.id
            ))),
            Err(e) => Err(JobFailure::Persist(e)),
        }
    }
}
