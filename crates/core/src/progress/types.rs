//! Snapshot types exposed to display layers.

use serde::Serialize;

use crate::job::{JobId, JobState};

/// Read-only progress view of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub state: JobState,
    /// Completed fraction in [0, 1].
    pub fraction: f64,
    /// Last observed transfer rate, zero when idle.
    pub bytes_per_sec: u64,
    /// Estimated seconds to completion, when derivable.
    pub eta_secs: Option<u64>,
}

/// Global queue summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub queued: usize,
    pub active: usize,
    pub retry_pending: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Sum of the active jobs' transfer rates.
    pub total_bytes_per_sec: u64,
}

impl QueueSummary {
    /// Jobs that have not reached a terminal state yet.
    pub fn unfinished(&self) -> usize {
        self.queued + self.active + self.retry_pending
    }

    /// Jobs that have reached a terminal state.
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}

/// Consistent copy of the aggregator's view, safe to read while
/// workers keep running.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueSnapshot {
    /// Per-job progress, in insertion order.
    pub jobs: Vec<JobProgress>,
    pub summary: QueueSummary,
}

impl QueueSnapshot {
    /// Look up one job's progress.
    pub fn job(&self, id: JobId) -> Option<&JobProgress> {
        self.jobs.iter().find(|j| j.job_id == id)
    }
}
