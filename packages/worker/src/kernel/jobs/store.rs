//! Typed access to the jobs table.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::job::{EnrichedFields, Job, NewJob};

/// Store operations the worker needs. Every write is single-row and keyed by id.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Conditional `collected -> processing`. `None` when another caller won
    /// or the job is no longer collectable.
    async fn claim(&self, id: Uuid) -> Result<Option<Job>>;

    /// Persist fields and `finalized`; `false` when the job is not `processing`.
    async fn finalize(&self, id: Uuid, fields: &EnrichedFields) -> Result<bool>;

    /// Persist `error` with a diagnostic; `false` when the job is not `processing`.
    async fn mark_error(&self, id: Uuid, message: &str) -> Result<bool>;

    /// Active `collected` rows, oldest first.
    async fn list_pending(&self) -> Result<Vec<Job>>;

    /// `processing` rows created before `threshold`.
    async fn list_stale(&self, threshold: DateTime<Utc>) -> Result<Vec<Job>>;

    async fn find(&self, id: Uuid) -> Result<Option<Job>>;

    async fn find_active_by_url(&self, normalized_url: &str) -> Result<Option<Job>>;

    async fn insert(&self, new_job: NewJob) -> Result<Job>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<()>;
}

/// [`JobStore`] over a Postgres pool.
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn claim(&self, id: Uuid) -> Result<Option<Job>> {
        Job::claim(id, &self.pool).await
    }

    async fn finalize(&self, id: Uuid, fields: &EnrichedFields) -> Result<bool> {
        Job::finalize(id, fields, &self.pool).await
    }

    async fn mark_error(&self, id: Uuid, message: &str) -> Result<bool> {
        Job::mark_error(id, message, &self.pool).await
    }

    async fn list_pending(&self) -> Result<Vec<Job>> {
        Job::find_pending(&self.pool).await
    }

    async fn list_stale(&self, threshold: DateTime<Utc>) -> Result<Vec<Job>> {
        Job::find_stale(threshold, &self.pool).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<Job>> {
        Job::find_by_id(id, &self.pool).await
    }

    async fn find_active_by_url(&self, normalized_url: &str) -> Result<Option<Job>> {
        Job::find_active_by_url(normalized_url, &self.pool).await
    }

    async fn insert(&self, new_job: NewJob) -> Result<Job> {
        Job::insert(&new_job, &self.pool).await
    }

    async fn ping(&self) -> Result<()> {
        Job::ping(&self.pool).await
    }
}
