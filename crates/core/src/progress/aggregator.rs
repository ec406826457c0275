//! Progress aggregator implementation.
//!
//! A background task consumes the queue's broadcast stream and folds
//! it into a map guarded by a plain RwLock. Writes are brief, and
//! `snapshot()` only holds the lock for the copy, so reads never wait
//! on worker execution. Lagged events are tolerated: the stream is
//! advisory and the next state change repairs the view.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::job::{JobId, JobState};
use crate::queue::QueueEvent;

use super::types::{JobProgress, QueueSnapshot, QueueSummary};

struct Entry {
    state: JobState,
    fraction: f64,
    bytes_per_sec: u64,
    /// Last (fraction, instant) pair used to estimate fraction
    /// velocity for the ETA.
    velocity_ref: Option<(f64, Instant)>,
    eta_secs: Option<u64>,
}

impl Entry {
    fn new(state: JobState, fraction: f64) -> Self {
        Self {
            state,
            fraction,
            bytes_per_sec: 0,
            velocity_ref: None,
            eta_secs: None,
        }
    }
}

#[derive(Default)]
struct View {
    entries: HashMap<JobId, Entry>,
    /// Insertion order, for stable display.
    order: Vec<JobId>,
}

impl View {
    fn apply(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::StateChanged {
                job_id,
                state,
                progress,
            } => {
                if !self.entries.contains_key(&job_id) {
                    self.order.push(job_id);
                }
                let entry = self
                    .entries
                    .entry(job_id)
                    .or_insert_with(|| Entry::new(state.clone(), progress));

                if matches!(state, JobState::Active) {
                    // New attempt: progress and rate start over.
                    entry.fraction = 0.0;
                    entry.bytes_per_sec = 0;
                    entry.velocity_ref = None;
                    entry.eta_secs = None;
                } else {
                    entry.fraction = progress;
                }
                if state.is_terminal() {
                    entry.bytes_per_sec = 0;
                    entry.eta_secs = None;
                    if matches!(state, JobState::Succeeded { .. }) {
                        entry.fraction = 1.0;
                    }
                }
                entry.state = state;
            }
            QueueEvent::ProgressUpdated {
                job_id,
                fraction,
                bytes_per_sec,
            } => {
                let Some(entry) = self.entries.get_mut(&job_id) else {
                    return;
                };
                let now = Instant::now();
                if let Some((prev_fraction, prev_at)) = entry.velocity_ref {
                    let dt = now.duration_since(prev_at).as_secs_f64();
                    let df = fraction - prev_fraction;
                    if dt > 0.0 && df > 0.0 {
                        let velocity = df / dt;
                        entry.eta_secs = Some(((1.0 - fraction) / velocity).ceil() as u64);
                    }
                }
                entry.velocity_ref = Some((fraction, now));
                entry.fraction = entry.fraction.max(fraction);
                entry.bytes_per_sec = bytes_per_sec;
            }
            QueueEvent::Removed { job_id } => {
                self.entries.remove(&job_id);
                self.order.retain(|id| *id != job_id);
            }
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        let mut summary = QueueSummary::default();
        let mut jobs = Vec::with_capacity(self.order.len());

        for id in &self.order {
            let Some(entry) = self.entries.get(id) else {
                continue;
            };
            match entry.state {
                JobState::Queued => summary.queued += 1,
                JobState::Active => {
                    summary.active += 1;
                    summary.total_bytes_per_sec += entry.bytes_per_sec;
                }
                JobState::RetryPending { .. } => summary.retry_pending += 1,
                JobState::Succeeded { .. } => summary.succeeded += 1,
                JobState::Failed { .. } => summary.failed += 1,
                JobState::Cancelled => summary.cancelled += 1,
            }
            jobs.push(JobProgress {
                job_id: *id,
                state: entry.state.clone(),
                fraction: entry.fraction,
                bytes_per_sec: entry.bytes_per_sec,
                eta_secs: entry.eta_secs,
            });
        }

        QueueSnapshot { jobs, summary }
    }
}

/// Maintains a read-only snapshot of per-job and global progress.
pub struct ProgressAggregator {
    view: Arc<RwLock<View>>,
    task: JoinHandle<()>,
}

impl ProgressAggregator {
    /// Spawn the aggregation task on the given event stream.
    pub fn spawn(mut events: broadcast::Receiver<QueueEvent>) -> Self {
        let view = Arc::new(RwLock::new(View::default()));
        let task_view = Arc::clone(&view);

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => task_view.write().apply(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "progress aggregator lagged behind event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { view, task }
    }

    /// Consistent copy of the current view. Never blocks on worker
    /// execution; the lock is held only for the copy.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.view.read().snapshot()
    }
}

impl Drop for ProgressAggregator {
    fn drop(&mut self) {
        self.task.abort();
    }
}
