// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// What to prompt for, when to claim a job, and how to record failures live in
// domains/jobs and only talk to the outside world through these seams.
//
// Naming convention: Base* for trait names (e.g., BaseAI, BasePageExtractor)

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use super::change_feed::ChangeEvent;
use super::page_extractor::{ExtractError, PageContent};

// =============================================================================
// AI Trait (Infrastructure - Generic LLM capabilities)
// =============================================================================

#[async_trait]
pub trait BaseAI: Send + Sync {
    /// Complete a prompt with an LLM (returns raw text response)
    async fn complete(&self, prompt: &str) -> Result<String>;
}

// =============================================================================
// Page Extractor Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BasePageExtractor: Send + Sync {
    /// Fetch a URL and return its title and visible text.
    ///
    /// Implementations own their retry policy; an `Err` means every attempt
    /// failed and carries the last cause.
    async fn extract(&self, url: &str) -> std::result::Result<PageContent, ExtractError>;
}

// =============================================================================
// Change Feed Trait (Infrastructure - row change notifications)
// =============================================================================

#[async_trait]
pub trait BaseChangeFeed: Send + Sync {
    /// Open a new subscription to row changes.
    ///
    /// The stream ends (or yields `Err`) when the underlying connection is
    /// lost; callers re-subscribe.
    async fn subscribe(&self) -> Result<BoxStream<'static, Result<ChangeEvent>>>;
}
