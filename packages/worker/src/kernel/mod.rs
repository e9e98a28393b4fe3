//! Kernel module - worker infrastructure and dependencies.

pub mod ai;
pub mod browser;
pub mod change_feed;
pub mod jobs;
pub mod page_extractor;
pub mod test_dependencies;
pub mod traits;
pub mod visible_text;
pub mod worker_kernel;

pub use ai::GeminiAI;
pub use browser::HeadlessBrowser;
pub use change_feed::{ChangeEvent, ChangeKind, PgChangeFeed, JOBS_CHANNEL};
pub use jobs::{EnrichedFields, Job, JobStatus, JobStore, NewJob, PostgresJobStore};
pub use page_extractor::{
    ExtractError, ExtractorConfig, PageContent, PageFetcher, RetryingPageExtractor, USER_AGENTS,
};
pub use test_dependencies::{
    InMemoryJobStore, MockAI, MockPageExtractor, MockPageFetcher, TestChangeFeed,
    TestDependencies,
};
pub use traits::*;
pub use worker_kernel::WorkerKernel;
