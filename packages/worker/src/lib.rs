// Job enrichment worker - core library
//
// Claims freshly collected job postings, scrapes their source page with a
// headless browser, structures the text with an LLM, and writes the result
// back to the shared jobs table.
//
// Infrastructure (store, browser, AI, change feed) lives in kernel/;
// enrichment logic (refiner, processor, scheduler, ingest) in domains/jobs/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
