//! Job enrichment: field refinement, per-job processing, scheduling and ingest.

pub mod ingest;
pub mod processor;
pub mod refiner;
pub mod scheduler;

pub use ingest::{IngestRequest, IngestResult, IngestService, NO_TEXT_ERROR};
pub use processor::{JobFailure, JobProcessor, ProcessOutcome, ProcessorConfig};
pub use refiner::{
    parse_refined, strip_code_fences, FieldRefiner, RefineError, RefinedJob,
    INGEST_MAX_INPUT_CHARS, WORKER_MAX_INPUT_CHARS,
};
pub use scheduler::{JobDispatcher, PollSummary, Scheduler, SchedulerConfig, STALE_JOB_MESSAGE};
