//! Types for the engine facade.

use serde::Serialize;
use thiserror::Error;

use crate::output::OutputError;
use crate::queue::{QueueCounts, QueueError};

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Queue manager rejected the operation.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Destination resolution failed.
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Reading or writing a saved job list failed.
    #[error("saved job list error: {0}")]
    JobList(String),
}

/// Current status of the engine.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineStatus {
    /// Whether the worker pool is running.
    pub running: bool,
    /// Current worker pool target size.
    pub workers: usize,
    /// Per-state job counts.
    pub counts: QueueCounts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;

    #[test]
    fn engine_error_display() {
        let err = EngineError::Queue(QueueError::NotFound(JobId::new()));
        assert!(err.to_string().starts_with("queue error:"));
    }
}
