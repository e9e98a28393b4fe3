// AI implementation using Gemini
//
// This is the infrastructure implementation of BaseAI.
// What to prompt for lives in domains/jobs/refiner.rs.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gemini_client::{GeminiClient, GenerateContentRequest};
use tracing::{debug, warn};

use super::BaseAI;

/// Upper bound for a single generateContent call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Gemini implementation of AI capabilities
#[derive(Clone)]
pub struct GeminiAI {
    client: GeminiClient,
    model: String,
}

impl GeminiAI {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for Gemini")?;

        Ok(Self {
            client: GeminiClient::new(api_key).with_http_client(http_client),
            model: model.into(),
        })
    }
}

#[async_trait]
impl BaseAI for GeminiAI {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .generate_content(&self.model, GenerateContentRequest::from_prompt(prompt))
            .await
            .inspect_err(|e| {
                if e.is_rate_limited() {
                    warn!(model = %self.model, "Gemini quota or rate limit reached");
                }
            })?;

        if let Some(usage) = &response.usage {
            debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "Gemini completion finished"
            );
        }

        Ok(response.text)
    }
}
