//! Gemini client errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeminiError>;

#[derive(Debug, Error)]
pub enum GeminiError {
    /// The request never got an HTTP response.
    #[error("Gemini request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// Non-2xx response; `message` is the API's own explanation when it sent one.
    #[error("Gemini API Error ({status}): {message}")]
    Api { status: u16, message: String },

    /// 2xx response without any candidate text (blocked prompt, empty output).
    #[error("No data returned from Gemini ({reason})")]
    NoContent { reason: String },

    #[error("Failed to decode Gemini response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl GeminiError {
    /// Quota or rate limiting (HTTP 429).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GeminiError::Api { status: 429, .. })
    }
}
