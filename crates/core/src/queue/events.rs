//! Events published by the queue manager.

use serde::Serialize;

use crate::job::{JobId, JobState};

/// Event published after every queue mutation.
///
/// The display layer and the progress aggregator are pure consumers of
/// this stream; they never write back into job state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A job transitioned to a new state.
    StateChanged {
        job_id: JobId,
        state: JobState,
        progress: f64,
    },

    /// An active job reported fetch progress. Advisory; consumers must
    /// tolerate dropped or stale samples.
    ProgressUpdated {
        job_id: JobId,
        fraction: f64,
        bytes_per_sec: u64,
    },

    /// A job was removed from the queue.
    Removed { job_id: JobId },
}
