//! Error types for queue manager API misuse.

use thiserror::Error;

use crate::job::JobId;

/// Caller-usage errors surfaced synchronously by the queue manager.
/// These are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The submitted descriptor is missing required fields.
    #[error("invalid descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    /// No job with that id exists in the queue.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// The job is in a state that does not allow the operation.
    #[error("job {id} is {state}, operation not allowed")]
    InvalidState { id: JobId, state: &'static str },
}
