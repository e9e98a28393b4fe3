//! Ingest of extension-supplied page text.
//!
//! The extension already has the rendered page, so no browser is involved:
//! the text is refined directly and stored as a new `collected` row.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::refiner::{FieldRefiner, INGEST_MAX_INPUT_CHARS};
use crate::common::utils::{source_from_url, strip_html_tags};
use crate::kernel::{EnrichedFields, Job, NewJob, WorkerKernel};

pub const NO_TEXT_ERROR: &str = "No page text was provided";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub manual_text: Option<String>,
    #[serde(default)]
    pub html_content: Option<String>,
}

impl IngestRequest {
    /// `manual_text`, else tag-stripped `html_content`.
    pub fn page_text(&self) -> Option<String> {
        let manual = self.manual_text.as_deref().filter(|t| !t.trim().is_empty());
        if let Some(text) = manual {
            return Some(text.to_string());
        }
        self.html_content
            .as_deref()
            .map(strip_html_tags)
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub job: Job,
    /// An active job for this URL already existed and was returned unchanged.
    pub duplicate: bool,
}

pub struct IngestService {
    kernel: WorkerKernel,
    refiner: FieldRefiner,
}

impl IngestService {
    pub fn new(kernel: WorkerKernel) -> Self {
        let refiner =
            FieldRefiner::new(kernel.ai.clone()).with_max_input_chars(INGEST_MAX_INPUT_CHARS);
        Self { kernel, refiner }
    }

    pub async fn ingest(&self, request: IngestRequest) -> anyhow::Result<IngestResult> {
        let url = request
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("A url is required"))?
            .to_string();
        let text = request
            .page_text()
            .ok_or_else(|| anyhow::anyhow!(NO_TEXT_ERROR))?;

        if let Some(existing) = self.kernel.store.find_active_by_url(&url).await? {
            info!(job_id = %existing.id, url = %url, "Job already tracked, returning existing");
            return Ok(IngestResult {
                job: existing,
                duplicate: true,
            });
        }

        info!(url = %url, chars = text.chars().count(), "Refining extension-supplied text");
        let refined = self.refiner.refine(&text, &url).await?;

        let new_job = NewJob::builder()
            .normalized_url(url.as_str())
            .fields(EnrichedFields::from(refined))
            .source(source_from_url(&url))
            .build();
        let job = self.kernel.store.insert(new_job).await?;

        info!(job_id = %job.id, title = job.title.as_deref().unwrap_or("-"), "Job ingested");
        Ok(IngestResult {
            job,
            duplicate: false,
        })
    }
}
