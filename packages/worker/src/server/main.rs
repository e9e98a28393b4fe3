// Main entry point for the job enrichment worker

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worker_core::domains::jobs::{JobProcessor, Scheduler};
use worker_core::kernel::{
    GeminiAI, HeadlessBrowser, PgChangeFeed, PostgresJobStore, RetryingPageExtractor,
    WorkerKernel,
};
use worker_core::server::{build_app, AppState};
use worker_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,worker_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Job enrichment worker starting");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(model = %config.gemini_model, "Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Wire dependencies
    let extractor_config = config.extractor_config();
    let extractor = RetryingPageExtractor::new(
        HeadlessBrowser::new(extractor_config.clone()),
        extractor_config,
    );
    let ai = GeminiAI::new(config.gemini_api_key.clone(), config.gemini_model.clone())?;
    let kernel = WorkerKernel::new(
        Arc::new(PostgresJobStore::new(pool.clone())),
        Arc::new(extractor),
        Arc::new(ai),
        Arc::new(PgChangeFeed::new(pool)),
    );

    let processor = JobProcessor::new(kernel.clone(), config.processor_config());
    let scheduler = Scheduler::new(kernel.clone(), processor, config.scheduler_config());
    let app = build_app(AppState::new(kernel, scheduler.dispatcher()));

    let shutdown = CancellationToken::new();
    tokio::spawn(listen_for_shutdown(shutdown.clone()));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
    });

    let scheduler_result = scheduler.run(shutdown.clone()).await;
    // Scheduler only returns on shutdown or error; take the server down with it
    shutdown.cancel();

    server
        .await
        .context("Server task panicked")?
        .context("Server error")?;
    scheduler_result?;

    tracing::info!("Job enrichment worker stopped");
    Ok(())
}

async fn listen_for_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing current job");
    shutdown.cancel();
}
