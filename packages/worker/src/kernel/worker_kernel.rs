// WorkerKernel - core infrastructure with all dependencies
//
// Holds the store, page extractor, AI and change feed behind traits so the
// domain code can run against Postgres/Chromium/Gemini or in-memory doubles.

use std::sync::Arc;

use super::jobs::JobStore;
use super::{BaseAI, BaseChangeFeed, BasePageExtractor};

/// WorkerKernel holds all worker dependencies
#[derive(Clone)]
pub struct WorkerKernel {
    pub store: Arc<dyn JobStore>,
    pub extractor: Arc<dyn BasePageExtractor>,
    pub ai: Arc<dyn BaseAI>,
    pub change_feed: Arc<dyn BaseChangeFeed>,
}

impl WorkerKernel {
    pub fn new(
        store: Arc<dyn JobStore>,
        extractor: Arc<dyn BasePageExtractor>,
        ai: Arc<dyn BaseAI>,
        change_feed: Arc<dyn BaseChangeFeed>,
    ) -> Self {
        Self {
            store,
            extractor,
            ai,
            change_feed,
        }
    }
}
