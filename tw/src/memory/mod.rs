//! Two-tier conversational memory
//!
//! Short-term memory is the bounded recent window of a thread's chat
//! history. Long-term memory is a per-thread similarity index over past user
//! turns. Both are best-effort: failures degrade to empty results.

mod long_term;
mod short_term;
mod summary;

pub use long_term::{LocalLongTermMemory, LongTermMemory, memory_id};
pub use short_term::{ShortTermMemory, order_window};
pub use summary::window_summary;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store operation failed: {0}")]
    Backend(String),

    #[error("Blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Store limiter closed")]
    Closed,
}

impl From<eyre::Report> for StoreError {
    fn from(report: eyre::Report) -> Self {
        StoreError::Backend(format!("{:#}", report))
    }
}
