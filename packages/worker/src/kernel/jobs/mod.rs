//! Job records and the store that claims and settles them.

mod job;
mod store;

pub use job::{EnrichedFields, Job, JobStatus, NewJob};
pub use store::{JobStore, PostgresJobStore};
