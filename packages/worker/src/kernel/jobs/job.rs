//! Job posting model and its SQL.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

/// Lifecycle of a posting.
///
/// The worker only moves `Collected -> Processing -> {Finalized | Error}`;
/// everything after `Finalized` belongs to the board's own workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Collected,
    Processing,
    Finalized,
    Error,
    Applied,
    Assignment,
    #[sqlx(rename = "interview_r1")]
    #[serde(rename = "interview_r1")]
    InterviewR1,
    #[sqlx(rename = "interview_r2")]
    #[serde(rename = "interview_r2")]
    InterviewR2,
    #[sqlx(rename = "interview_r3")]
    #[serde(rename = "interview_r3")]
    InterviewR3,
    Hr,
    Offer,
    Rejected,
    Ghosted,
}

impl JobStatus {
    /// Finalized, error, or any downstream workflow state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Collected | JobStatus::Processing)
    }
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub normalized_url: String,
    pub status: JobStatus,

    pub title: Option<String>,
    pub company: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub work_type: Option<String>,
    pub posted_at: Option<String>,
    pub skills: Vec<String>,

    pub source: Option<String>,
    pub notes: Option<String>,
    pub resume_used_id: Option<Uuid>,

    pub error_message: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Structured fields written when a job is finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct EnrichedFields {
    #[builder(default, setter(strip_option, into))]
    pub title: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub company: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub description: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub location: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub salary: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub work_type: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub posted_at: Option<String>,
    #[builder(default)]
    pub skills: Vec<String>,
}

/// A row to insert as `collected`.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewJob {
    #[builder(setter(into))]
    pub normalized_url: String,
    #[builder(default)]
    pub fields: EnrichedFields,
    #[builder(default, setter(strip_option, into))]
    pub source: Option<String>,
}

impl Job {
    /// Build an unsaved `collected` row (used by in-memory stores).
    pub fn from_new(new_job: NewJob) -> Self {
        let NewJob {
            normalized_url,
            fields,
            source,
        } = new_job;

        Self {
            id: Uuid::new_v4(),
            normalized_url,
            status: JobStatus::Collected,
            title: fields.title,
            company: fields.company,
            description: fields.description,
            location: fields.location,
            salary: fields.salary,
            work_type: fields.work_type,
            posted_at: fields.posted_at,
            skills: fields.skills,
            source,
            notes: None,
            resume_used_id: None,
            error_message: None,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Self>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(job)
    }

    /// Active `collected` rows, oldest first.
    pub async fn find_pending(pool: &PgPool) -> Result<Vec<Self>> {
        let jobs = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM jobs
            WHERE status = 'collected'
              AND is_deleted = false
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(jobs)
    }

    /// `processing` rows created before `threshold`.
    pub async fn find_stale(threshold: DateTime<Utc>, pool: &PgPool) -> Result<Vec<Self>> {
        let jobs = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM jobs
            WHERE status = 'processing'
              AND created_at < $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(threshold)
        .fetch_all(pool)
        .await?;
        Ok(jobs)
    }

    pub async fn find_active_by_url(normalized_url: &str, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM jobs
            WHERE normalized_url = $1
              AND is_deleted = false
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(normalized_url)
        .fetch_optional(pool)
        .await?;
        Ok(job)
    }

    // ========================================================================
    // State transitions
    // ========================================================================

    /// Move `collected -> processing` if the row is still collected.
    ///
    /// The single mutual-exclusion point: concurrent callers race on the
    /// row lock and only one sees the row returned.
    pub async fn claim(id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Self>(
            r#"
            UPDATE jobs
            SET status = 'processing'
            WHERE id = $1
              AND status = 'collected'
              AND is_deleted = false
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(job)
    }

    /// Write enrichment fields and `finalized`. False if the job left `processing`.
    pub async fn finalize(id: Uuid, fields: &EnrichedFields, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'finalized',
                title = $2,
                company = $3,
                description = $4,
                location = $5,
                salary = $6,
                work_type = $7,
                posted_at = $8,
                skills = $9,
                error_message = NULL
            WHERE id = $1
              AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(&fields.title)
        .bind(&fields.company)
        .bind(&fields.description)
        .bind(&fields.location)
        .bind(&fields.salary)
        .bind(&fields.work_type)
        .bind(&fields.posted_at)
        .bind(&fields.skills)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Move `processing -> error` with a diagnostic. False if the job left `processing`.
    pub async fn mark_error(id: Uuid, message: &str, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'error',
                description = $2,
                error_message = $2
            WHERE id = $1
              AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn insert(new_job: &NewJob, pool: &PgPool) -> Result<Self> {
        let fields = &new_job.fields;
        let job = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO jobs (
                normalized_url, status, title, company, description, location,
                salary, work_type, posted_at, skills, source
            )
            VALUES ($1, 'collected', $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&new_job.normalized_url)
        .bind(&fields.title)
        .bind(&fields.company)
        .bind(&fields.description)
        .bind(&fields.location)
        .bind(&fields.salary)
        .bind(&fields.work_type)
        .bind(&fields.posted_at)
        .bind(&fields.skills)
        .bind(&new_job.source)
        .fetch_one(pool)
        .await?;
        Ok(job)
    }

    pub async fn ping(pool: &PgPool) -> Result<()> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }
}
