//! LLM field extraction for job postings.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::common::utils::{preview, truncate_chars};
use crate::kernel::{BaseAI, EnrichedFields};

/// Page-text cap for scraped pages.
pub const WORKER_MAX_INPUT_CHARS: usize = 30_000;

/// Page-text cap for extension-supplied text.
pub const INGEST_MAX_INPUT_CHARS: usize = 50_000;

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("AI request failed: {0:#}")]
    Ai(anyhow::Error),

    #[error("ParseError: model returned invalid JSON: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
}

/// Structured posting as returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinedJob {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub company: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub salary: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_skills")]
    pub skills: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub work_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub posted_at: Option<String>,
}

impl From<RefinedJob> for EnrichedFields {
    fn from(job: RefinedJob) -> Self {
        EnrichedFields {
            title: job.title,
            company: job.company,
            description: job.description,
            location: job.location,
            salary: job.salary,
            work_type: job.work_type,
            posted_at: job.posted_at,
            skills: job.skills,
        }
    }
}

/// Accept strings, numbers (salaries like `120000`) or null.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Accept an array of strings, a comma-separated string, or null.
fn lenient_skills<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let skills = match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s.trim().to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(serde_json::Value::String(s)) => s.split(',').map(|s| s.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    Ok(skills.into_iter().filter(|s: &String| !s.is_empty()).collect())
}

/// Remove markdown code-fence markers the model tends to wrap JSON in.
pub fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Parse a model response, fenced or not.
pub fn parse_refined(response: &str) -> Result<RefinedJob, RefineError> {
    serde_json::from_str(strip_code_fences(response)).map_err(|source| RefineError::Parse { source })
}

/// Turns raw page text into [`RefinedJob`] through a [`BaseAI`].
///
/// Neither model-call nor parse failures are retried.
#[derive(Clone)]
pub struct FieldRefiner {
    ai: Arc<dyn BaseAI>,
    max_input_chars: usize,
}

impl FieldRefiner {
    pub fn new(ai: Arc<dyn BaseAI>) -> Self {
        Self {
            ai,
            max_input_chars: WORKER_MAX_INPUT_CHARS,
        }
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    pub fn build_prompt(&self, page_text: &str, url: &str) -> String {
        let text = truncate_chars(page_text, self.max_input_chars);
        format!(
            r#"You are an expert job posting extractor. Extract the job details from the page text below.
Do not summarize the description; provide the FULL description text as found on the page, preserving paragraphs and lists, cleaned of navigation artifacts.

Return ONLY valid JSON. Do not include markdown formatting.

Fields:
- title: job title (the most specific title on the page)
- company: company name
- location: specific location (e.g. "San Francisco, CA", "Remote")
- salary: salary range if available (e.g. "$120k - $150k", "$60/hr")
- description: the full job description, including responsibilities, requirements and benefits
- skills: an array of strings naming the technical and soft skills required
- workType: "Remote", "On-site", "Hybrid", "Contract", "Full-time", etc.
- postedAt: date posted if available (YYYY-MM-DD if possible, or relative like "2 days ago")

Use null for any field that is not present on the page.

URL: {url}
Text:
{text}"#
        )
    }

    pub async fn refine(&self, page_text: &str, url: &str) -> Result<RefinedJob, RefineError> {
        let prompt = self.build_prompt(page_text, url);
        debug!(
            url = %url,
            input_chars = page_text.chars().count().min(self.max_input_chars),
            "Sending page text to AI"
        );

        let response = self.ai.complete(&prompt).await.map_err(RefineError::Ai)?;
        debug!(url = %url, response = %preview(&response, 100), "AI response received");

        parse_refined(&response)
    }
}
