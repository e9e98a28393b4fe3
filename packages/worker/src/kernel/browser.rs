//! Headless Chromium fetcher.
//!
//! Every attempt launches its own browser with a throwaway profile, loads the
//! page with images, fonts, media and stylesheets blocked, waits for client
//! rendering to settle and returns the visible text. The browser is always
//! shut down before returning, whatever the outcome.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams as FetchEnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::page_extractor::{ExtractError, ExtractorConfig, PageContent, PageFetcher};
use super::visible_text::{document_title, visible_text};

const BLOCKED_RESOURCES: [ResourceType; 4] = [
    ResourceType::Image,
    ResourceType::Font,
    ResourceType::Media,
    ResourceType::Stylesheet,
];

const PROFILE_PREFIX: &str = "job-worker-chrome-";

impl From<CdpError> for ExtractError {
    fn from(err: CdpError) -> Self {
        ExtractError::Browser(err.to_string())
    }
}

/// [`PageFetcher`] backed by a fresh headless Chromium per call.
#[derive(Debug, Clone)]
pub struct HeadlessBrowser {
    config: ExtractorConfig,
}

impl HeadlessBrowser {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PageFetcher for HeadlessBrowser {
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<PageContent, ExtractError> {
        let session = BrowserSession::launch(&self.config).await?;
        let result = session.load(url, user_agent, &self.config).await;
        session.shutdown().await;
        result
    }
}

/// Throwaway Chrome profile, deleted when dropped.
fn new_profile_dir() -> Result<TempDir, ExtractError> {
    tempfile::Builder::new()
        .prefix(PROFILE_PREFIX)
        .tempdir()
        .map_err(|e| ExtractError::Launch(format!("profile directory: {e}")))
}

/// A launched browser plus the task driving its CDP connection.
///
/// Field order matters: the browser (which kills Chrome on drop) goes before
/// the profile directory is removed, also when a timeout drops the session.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    profile_dir: TempDir,
}

impl BrowserSession {
    async fn launch(config: &ExtractorConfig) -> Result<Self, ExtractError> {
        let profile_dir = new_profile_dir()?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .request_timeout(config.navigation_timeout)
            .user_data_dir(profile_dir.path());
        if let Some(executable) = &config.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder.build().map_err(ExtractError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ExtractError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        Ok(Self {
            browser,
            handler,
            profile_dir,
        })
    }

    async fn load(
        &self,
        url: &str,
        user_agent: &str,
        config: &ExtractorConfig,
    ) -> Result<PageContent, ExtractError> {
        let page = self.browser.new_page("about:blank").await?;
        let result = render(&page, url, user_agent, config).await;
        if let Err(e) = page.close().await {
            debug!(url = %url, error = %e, "Failed to close page");
        }
        result
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "Browser close command failed");
        }
        if let Err(e) = self.browser.wait().await {
            debug!(error = %e, "Waiting for browser exit failed");
        }
        self.handler.abort();
        debug!(path = %self.profile_dir.path().display(), "Browser closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

async fn render(
    page: &Page,
    url: &str,
    user_agent: &str,
    config: &ExtractorConfig,
) -> Result<PageContent, ExtractError> {
    page.execute(SetUserAgentOverrideParams::new(user_agent))
        .await?;

    let blocker = block_heavy_resources(page).await?;

    let navigation = tokio::time::timeout(config.navigation_timeout, navigate(page, url)).await;
    let outcome = match navigation {
        Ok(Ok(())) => {
            tokio::time::sleep(config.settle_delay).await;
            let html = page.content().await?;
            Ok(PageContent {
                title: document_title(&html),
                content: visible_text(&html),
            })
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ExtractError::NavigationTimeout(config.navigation_timeout)),
    };

    blocker.abort();
    outcome
}

/// Navigate and wait for DOM-content-ready.
async fn navigate(page: &Page, url: &str) -> Result<(), ExtractError> {
    let mut dom_ready = page.event_listener::<EventDomContentEventFired>().await?;

    let response = page.execute(NavigateParams::new(url)).await?;
    if let Some(error_text) = response.result.error_text.clone() {
        return Err(ExtractError::Navigation(format!("{error_text} at {url}")));
    }

    match dom_ready.next().await {
        Some(_) => Ok(()),
        None => Err(ExtractError::Navigation(format!(
            "page closed before content loaded at {url}"
        ))),
    }
}

/// Intercept requests for heavy resource types and fail them.
async fn block_heavy_resources(page: &Page) -> Result<JoinHandle<()>, ExtractError> {
    let patterns = BLOCKED_RESOURCES
        .iter()
        .map(|resource| RequestPattern {
            url_pattern: Some("*".to_string()),
            resource_type: Some(resource.clone()),
            request_stage: Some(RequestStage::Request),
        })
        .collect();

    let mut paused = page.event_listener::<EventRequestPaused>().await?;
    page.execute(FetchEnableParams {
        patterns: Some(patterns),
        handle_auth_requests: None,
    })
    .await?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let fail = FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
            if let Err(e) = page.execute(fail).await {
                warn!(error = %e, "Failed to block intercepted request");
            }
        }
    }))
}
