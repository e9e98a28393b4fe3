// Row change notifications over Postgres LISTEN/NOTIFY
//
// The `jobs_changes` channel is fed by the trigger in
// migrations/20250101000001_jobs_change_notify.sql.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::{info, warn};

use super::BaseChangeFeed;

/// Channel the jobs trigger publishes on.
pub const JOBS_CHANNEL: &str = "jobs_changes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row change as published by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub table: String,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
}

/// [`BaseChangeFeed`] over a dedicated Postgres listener connection.
#[derive(Clone)]
pub struct PgChangeFeed {
    pool: PgPool,
}

impl PgChangeFeed {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseChangeFeed for PgChangeFeed {
    async fn subscribe(&self) -> Result<BoxStream<'static, Result<ChangeEvent>>> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .context("Failed to open listener connection")?;
        listener
            .listen(JOBS_CHANNEL)
            .await
            .with_context(|| format!("Failed to LISTEN on {JOBS_CHANNEL}"))?;

        info!(channel = JOBS_CHANNEL, "Subscribed to change feed");

        let stream = listener.into_stream().filter_map(|notification| async move {
            match notification {
                Ok(notification) => match serde_json::from_str::<ChangeEvent>(notification.payload()) {
                    Ok(event) => Some(Ok(event)),
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed change notification");
                        None
                    }
                },
                Err(e) => Some(Err(anyhow::Error::new(e).context("Change feed connection lost"))),
            }
        });

        Ok(stream.boxed())
    }
}
