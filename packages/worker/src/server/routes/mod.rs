// HTTP routes
pub mod health;
pub mod ingest;
pub mod webhooks;

pub use health::*;
pub use ingest::*;
pub use webhooks::*;
