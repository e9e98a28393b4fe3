use anyhow::{ensure, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domains::jobs::{ProcessorConfig, SchedulerConfig};
use crate::kernel::ExtractorConfig;

/// Default Gemini model for field extraction.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-lite";

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub poll_interval: Duration,
    pub inter_job_delay: Duration,
    pub stale_after: Duration,
    pub job_timeout: Duration,
    pub chrome_executable: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let config = Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: parse_var("PORT", 3001).context("PORT must be a valid number")?,
            gemini_api_key: env::var("GEMINI_API_KEY").context("GEMINI_API_KEY must be set")?,
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            poll_interval: Duration::from_secs(
                parse_var("POLL_INTERVAL_SECS", 30)
                    .context("POLL_INTERVAL_SECS must be a whole number of seconds")?,
            ),
            inter_job_delay: Duration::from_secs(
                parse_var("INTER_JOB_DELAY_SECS", 10)
                    .context("INTER_JOB_DELAY_SECS must be a whole number of seconds")?,
            ),
            stale_after: Duration::from_secs(
                parse_var("STALE_AFTER_SECS", 300)
                    .context("STALE_AFTER_SECS must be a whole number of seconds")?,
            ),
            job_timeout: Duration::from_secs(
                parse_var("JOB_TIMEOUT_SECS", 120)
                    .context("JOB_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            chrome_executable: env::var("CHROME_EXECUTABLE").ok().map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject tunables the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.poll_interval.is_zero(),
            "POLL_INTERVAL_SECS must be greater than zero"
        );
        ensure!(
            !self.job_timeout.is_zero(),
            "JOB_TIMEOUT_SECS must be greater than zero"
        );
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: self.poll_interval,
            inter_job_delay: self.inter_job_delay,
            stale_after: self.stale_after,
        }
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            timeout: self.job_timeout,
        }
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            chrome_executable: self.chrome_executable.clone(),
            ..Default::default()
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => Ok(raw.trim().parse::<T>()?),
        Err(_) => Ok(default),
    }
}
