//! Test harnesses.
//!
//! `TestHarness` wires the worker to in-memory doubles and is what most tests
//! use. `PostgresHarness` runs against a real database in a shared container
//! (tests using it are `#[ignore]`d because they need Docker).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use worker_core::domains::jobs::{JobProcessor, ProcessorConfig, Scheduler, SchedulerConfig};
use worker_core::kernel::{BasePageExtractor, TestDependencies, WorkerKernel};
use worker_core::server::{build_app, AppState};

fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory worker: every kernel seam is a double from `TestDependencies`.
pub struct TestHarness {
    pub deps: TestDependencies,
    pub kernel: WorkerKernel,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
    }

    async fn teardown(self) {}
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_deps(TestDependencies::new())
    }

    pub fn with_deps(deps: TestDependencies) -> Self {
        init_tracing();
        let kernel = deps.kernel();
        Self { deps, kernel }
    }

    /// Replace the page extractor (e.g. with a retrying one over a scripted fetcher).
    pub fn with_extractor(mut self, extractor: Arc<dyn BasePageExtractor>) -> Self {
        self.kernel.extractor = extractor;
        self
    }

    pub fn processor(&self) -> JobProcessor {
        JobProcessor::new(self.kernel.clone(), ProcessorConfig::default())
    }

    pub fn processor_with_timeout(&self, timeout: Duration) -> JobProcessor {
        JobProcessor::new(self.kernel.clone(), ProcessorConfig { timeout })
    }

    pub fn scheduler(&self, config: SchedulerConfig) -> Scheduler {
        Scheduler::new(self.kernel.clone(), self.processor(), config)
    }

    /// Router with no scheduler behind it; queued webhooks are refused.
    pub fn app(&self) -> Router {
        self.app_for(&self.scheduler(SchedulerConfig::default()))
    }

    /// Router whose webhook route queues onto `scheduler`.
    pub fn app_for(&self, scheduler: &Scheduler) -> Router {
        build_app(AppState::new(self.kernel.clone(), scheduler.dispatcher()))
    }

    /// Poll `condition` until it holds or `timeout` passes.
    pub async fn wait_until(&self, timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }
}

/// Shared Postgres container, started once per test binary.
struct SharedTestInfra {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        init_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{}:{}/postgres", pg_host, pg_port);

        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Real database, fresh pool per test.
pub struct PostgresHarness {
    pub db_pool: PgPool,
}

impl AsyncTestContext for PostgresHarness {
    async fn setup() -> Self {
        let infra = SharedTestInfra::get().await;
        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .expect("Failed to connect to test database");
        Self { db_pool }
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}
