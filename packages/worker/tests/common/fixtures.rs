//! Canned model responses and page content.

use worker_core::kernel::{ExtractError, PageContent};

/// Fenced model output for the canonical posting.
pub const ACME_RESPONSE: &str = r#"```json
{
  "title": "Senior Engineer",
  "company": "Acme Corp",
  "location": "Remote (US)",
  "salary": "$150k - $180k",
  "description": "Build and operate the Acme data platform.",
  "skills": ["Go", "SQL"],
  "workType": "Remote",
  "postedAt": "2 days ago"
}
```"#;

/// Unfenced model output for a second posting.
pub const ANALYST_RESPONSE: &str = r#"{"title":"Data Analyst","company":"Globex","location":"Austin, TX","salary":null,"description":"Own reporting.","skills":["Excel","SQL"],"workType":"Hybrid","postedAt":null}"#;

pub fn page_with_chars(chars: usize) -> PageContent {
    PageContent {
        title: "Careers".to_string(),
        content: "a".repeat(chars),
    }
}

pub fn unreachable_error() -> ExtractError {
    ExtractError::Navigation("net::ERR_NAME_NOT_RESOLVED at https://unreachable.invalid/job".to_string())
}
