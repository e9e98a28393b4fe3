//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::jobs::{IngestService, JobDispatcher};
use crate::kernel::WorkerKernel;
use crate::server::routes::{health_handler, ingest_handler, job_webhook_handler, root_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub kernel: WorkerKernel,
    pub dispatcher: JobDispatcher,
    pub ingest: Arc<IngestService>,
}

impl AppState {
    pub fn new(kernel: WorkerKernel, dispatcher: JobDispatcher) -> Self {
        let ingest = IngestService::new(kernel.clone());
        Self {
            kernel,
            dispatcher,
            ingest: Arc::new(ingest),
        }
    }
}

/// Build the HTTP router: liveness, webhook trigger and extension ingest.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/webhooks/jobs", post(job_webhook_handler))
        .route("/process-job", post(ingest_handler))
        .layer(Extension(state))
        // The browser extension posts from arbitrary page origins
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
