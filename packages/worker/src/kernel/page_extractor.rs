//! Page extraction with bounded retries.
//!
//! A [`PageFetcher`] performs one attempt (one fresh browser session). The
//! [`RetryingPageExtractor`] wraps it with user-agent rotation, content
//! validation and a fixed backoff, and is what the processor talks to.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::BasePageExtractor;

/// Desktop user agents rotated per attempt.
pub const USER_AGENTS: [&str; 2] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
];

/// Title and visible text of a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Navigation timed out after {}s", .0.as_secs())]
    NavigationTimeout(Duration),

    #[error("Page content too short or empty ({length} chars, need {min})")]
    ContentTooShort { length: usize, min: usize },
}

/// Configuration for page extraction.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Total attempts per URL (first try included)
    pub max_attempts: usize,
    /// Pause between a failed attempt and the next one
    pub retry_delay: Duration,
    /// Budget for navigation up to DOM-content-ready
    pub navigation_timeout: Duration,
    /// Extra wait after DOM-content-ready for client-side rendering
    pub settle_delay: Duration,
    /// Content below this many characters counts as a failed extraction
    pub min_content_chars: usize,
    /// Rotated per attempt
    pub user_agents: Vec<String>,
    /// Browser binary; auto-detected when `None`
    pub chrome_executable: Option<PathBuf>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_secs(3),
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(5),
            min_content_chars: 500,
            user_agents: USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            chrome_executable: None,
        }
    }
}

impl ExtractorConfig {
    /// User agent for a zero-based attempt number.
    pub fn user_agent_for(&self, attempt: usize) -> &str {
        if self.user_agents.is_empty() {
            return USER_AGENTS[attempt % USER_AGENTS.len()];
        }
        &self.user_agents[attempt % self.user_agents.len()]
    }
}

/// One extraction attempt.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<PageContent, ExtractError>;
}

/// [`BasePageExtractor`] that retries a [`PageFetcher`].
pub struct RetryingPageExtractor<F> {
    fetcher: F,
    config: ExtractorConfig,
}

impl<F: PageFetcher> RetryingPageExtractor<F> {
    pub fn new(fetcher: F, config: ExtractorConfig) -> Self {
        Self { fetcher, config }
    }

    fn validate(&self, page: PageContent) -> Result<PageContent, ExtractError> {
        let length = page.content.chars().count();
        if length < self.config.min_content_chars {
            return Err(ExtractError::ContentTooShort {
                length,
                min: self.config.min_content_chars,
            });
        }
        Ok(page)
    }
}

#[async_trait]
impl<F: PageFetcher> BasePageExtractor for RetryingPageExtractor<F> {
    async fn extract(&self, url: &str) -> Result<PageContent, ExtractError> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            let user_agent = self.config.user_agent_for(attempt);
            info!(url = %url, attempt = attempt + 1, "Scraping page");

            match self
                .fetcher
                .fetch(url, user_agent)
                .await
                .and_then(|page| self.validate(page))
            {
                Ok(page) => return Ok(page),
                Err(e) => {
                    warn!(url = %url, attempt = attempt + 1, error = %e, "Scrape attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| ExtractError::Browser("no attempt was made".into())))
    }
}
