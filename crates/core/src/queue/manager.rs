//! Queue manager implementation.
//!
//! All job state transitions happen here, under one lock with brief
//! critical sections; workers and callers only ever see clones. The
//! lock is never held across an await point.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::job::{Job, JobDescriptor, JobId, JobOutcome, JobState};
use crate::metrics;
use crate::retry::{ErrorKind, RetryDecision, RetryPolicy};

use super::error::QueueError;
use super::events::QueueEvent;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-state job counts, for status displays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub active: usize,
    pub retry_pending: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueCounts {
    /// Jobs that have not reached a terminal state yet.
    pub fn unfinished(&self) -> usize {
        self.queued + self.active + self.retry_pending
    }
}

struct Inner {
    /// Insertion-ordered job table; order doubles as dispatch priority.
    jobs: Vec<Job>,
    /// Cancellation tokens of currently active jobs.
    tokens: HashMap<JobId, CancellationToken>,
    max_concurrency: usize,
}

/// Owns the ordered set of pending/active/completed jobs.
///
/// Completed jobs stay visible until explicitly cleared or removed.
pub struct QueueManager {
    inner: Mutex<Inner>,
    policy: RetryPolicy,
    events: broadcast::Sender<QueueEvent>,
    /// Signalled whenever a job may have become dispatch-eligible.
    dispatch: Notify,
}

impl QueueManager {
    pub fn new(max_concurrency: usize, policy: RetryPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                jobs: Vec::new(),
                tokens: HashMap::new(),
                max_concurrency: max_concurrency.max(1),
            }),
            policy,
            events,
            dispatch: Notify::new(),
        }
    }

    /// Queue with default concurrency and retry policy.
    pub fn with_defaults() -> Self {
        Self::new(10, RetryPolicy::default())
    }

    /// Subscribe to the queue's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub(crate) fn dispatch_notify(&self) -> &Notify {
        &self.dispatch
    }

    /// Enqueue a job built from `descriptor`, in Queued state.
    ///
    /// `destination_dir` is resolved by the caller (the engine's output
    /// layout); the queue never touches the filesystem.
    pub fn add(
        &self,
        descriptor: JobDescriptor,
        destination_dir: PathBuf,
    ) -> Result<JobId, QueueError> {
        let url = descriptor.source_url.trim();
        if url.is_empty() {
            return Err(QueueError::InvalidDescriptor {
                reason: "source URL is empty".to_string(),
            });
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(QueueError::InvalidDescriptor {
                reason: format!("unsupported URL scheme: {}", url),
            });
        }

        let title = if descriptor.title.trim().is_empty() {
            url.to_string()
        } else {
            descriptor.title.trim().to_string()
        };

        let job = Job {
            id: JobId::new(),
            source_url: url.to_string(),
            title,
            target_format: descriptor.target_format,
            collection: descriptor.collection.clone(),
            destination_dir,
            state: JobState::Queued,
            attempt: 0,
            progress: 0.0,
            last_error: None,
            enqueued_at: Utc::now(),
        };
        let id = job.id;
        let event = QueueEvent::StateChanged {
            job_id: id,
            state: job.state.clone(),
            progress: 0.0,
        };

        self.inner.lock().jobs.push(job);
        metrics::JOBS_ENQUEUED.inc();
        debug!(job_id = %id, "job enqueued");

        let _ = self.events.send(event);
        self.dispatch.notify_waiters();
        Ok(id)
    }

    /// Cancel a job.
    ///
    /// Queued and retry-pending jobs become Cancelled immediately;
    /// active jobs have their cancellation token fired and are marked
    /// Cancelled while the worker winds down cooperatively. Cancelling
    /// a terminal job is an `InvalidState` error.
    pub fn cancel(&self, id: JobId) -> Result<(), QueueError> {
        let event = {
            let mut inner = self.inner.lock();
            let idx = inner
                .jobs
                .iter()
                .position(|j| j.id == id)
                .ok_or(QueueError::NotFound(id))?;

            let state = inner.jobs[idx].state.clone();
            match state {
                JobState::Queued | JobState::RetryPending { .. } | JobState::Active => {
                    let job = &mut inner.jobs[idx];
                    job.state = JobState::Cancelled;
                    let progress = job.progress;
                    if let Some(token) = inner.tokens.get(&id) {
                        token.cancel();
                    }
                    metrics::JOBS_FINISHED.with_label_values(&["cancelled"]).inc();
                    QueueEvent::StateChanged {
                        job_id: id,
                        state: JobState::Cancelled,
                        progress,
                    }
                }
                _ => {
                    return Err(QueueError::InvalidState {
                        id,
                        state: state.state_type(),
                    });
                }
            }
        };

        info!(job_id = %id, "job cancelled");
        let _ = self.events.send(event);
        // A concurrency slot may have been freed.
        self.dispatch.notify_waiters();
        Ok(())
    }

    /// Remove a job from the queue.
    ///
    /// Pending and terminal jobs are destroyed; removing an active job
    /// instead marks it Cancelled and signals the running worker to
    /// abort cooperatively (the cancelled record stays visible until
    /// cleared).
    pub fn remove(&self, id: JobId) -> Result<(), QueueError> {
        let event = {
            let mut inner = self.inner.lock();
            let idx = inner
                .jobs
                .iter()
                .position(|j| j.id == id)
                .ok_or(QueueError::NotFound(id))?;

            if matches!(inner.jobs[idx].state, JobState::Active) {
                drop(inner);
                return self.cancel(id);
            }

            inner.jobs.remove(idx);
            inner.tokens.remove(&id);
            QueueEvent::Removed { job_id: id }
        };

        debug!(job_id = %id, "job removed");
        let _ = self.events.send(event);
        Ok(())
    }

    /// Remove all jobs that are not currently active.
    ///
    /// Active jobs cannot be force-destroyed, only cancelled
    /// individually. Returns the number of jobs removed.
    pub fn clear(&self) -> usize {
        let removed: Vec<JobId> = {
            let mut inner = self.inner.lock();
            let mut removed = Vec::new();
            inner.jobs.retain(|job| {
                if matches!(job.state, JobState::Active) {
                    true
                } else {
                    removed.push(job.id);
                    false
                }
            });
            for id in &removed {
                inner.tokens.remove(id);
            }
            removed
        };

        info!(count = removed.len(), "queue cleared");
        for id in &removed {
            let _ = self.events.send(QueueEvent::Removed { job_id: *id });
        }
        removed.len()
    }

    /// Move a queued job to `new_index` within the pending order.
    pub fn reorder(&self, id: JobId, new_index: usize) -> Result<(), QueueError> {
        {
            let mut inner = self.inner.lock();
            let from = inner
                .jobs
                .iter()
                .position(|j| j.id == id)
                .ok_or(QueueError::NotFound(id))?;

            if !matches!(inner.jobs[from].state, JobState::Queued) {
                return Err(QueueError::InvalidState {
                    id,
                    state: inner.jobs[from].state.state_type(),
                });
            }

            let job = inner.jobs.remove(from);
            let queued_positions: Vec<usize> = inner
                .jobs
                .iter()
                .enumerate()
                .filter(|(_, j)| matches!(j.state, JobState::Queued))
                .map(|(i, _)| i)
                .collect();
            let insert_at = queued_positions
                .get(new_index)
                .copied()
                .unwrap_or(inner.jobs.len());
            inner.jobs.insert(insert_at, job);
        }

        let _ = self.events.send(QueueEvent::StateChanged {
            job_id: id,
            state: JobState::Queued,
            progress: 0.0,
        });
        Ok(())
    }

    /// Hand the earliest-inserted eligible job to a worker.
    ///
    /// Eligible means Queued, or RetryPending with elapsed backoff.
    /// The job transitions to Active, its attempt counter increments
    /// and its progress resets. Atomic with respect to concurrent
    /// callers: no two callers receive the same job, and the number of
    /// active jobs never exceeds the concurrency cap.
    pub fn dequeue_next(&self) -> Option<(Job, CancellationToken)> {
        let (job, token, event) = {
            let mut inner = self.inner.lock();

            let active = inner
                .jobs
                .iter()
                .filter(|j| matches!(j.state, JobState::Active))
                .count();
            if active >= inner.max_concurrency {
                return None;
            }

            let now = Utc::now();
            let idx = inner.jobs.iter().position(|j| match &j.state {
                JobState::Queued => true,
                JobState::RetryPending { eligible_at } => *eligible_at <= now,
                _ => false,
            })?;

            let job = &mut inner.jobs[idx];
            job.state = JobState::Active;
            job.attempt += 1;
            job.progress = 0.0;

            let id = job.id;
            let snapshot = job.clone();
            let event = QueueEvent::StateChanged {
                job_id: id,
                state: JobState::Active,
                progress: 0.0,
            };

            let token = CancellationToken::new();
            inner.tokens.insert(id, token.clone());
            (snapshot, token, event)
        };

        debug!(job_id = %job.id, attempt = job.attempt, "job dispatched");
        let _ = self.events.send(event);
        Some((job, token))
    }

    /// Apply the outcome of one dispatch attempt.
    ///
    /// Success and cancellation are terminal; failures consult the
    /// retry policy, which either schedules a backoff re-entry or
    /// fails the job for good. A late report against a job that was
    /// cancelled while the worker was winding down is a no-op.
    pub fn report_outcome(&self, id: JobId, outcome: JobOutcome) -> Result<(), QueueError> {
        let event = {
            let mut inner = self.inner.lock();
            let idx = inner
                .jobs
                .iter()
                .position(|j| j.id == id)
                .ok_or(QueueError::NotFound(id))?;

            if inner.jobs[idx].state.is_terminal() {
                inner.tokens.remove(&id);
                drop(inner);
                self.dispatch.notify_waiters();
                return Ok(());
            }
            if !matches!(inner.jobs[idx].state, JobState::Active) {
                return Err(QueueError::InvalidState {
                    id,
                    state: inner.jobs[idx].state.state_type(),
                });
            }

            let policy = self.policy;
            let job = &mut inner.jobs[idx];
            match outcome {
                JobOutcome::Completed { output } => {
                    job.state = JobState::Succeeded { output };
                    job.progress = 1.0;
                    metrics::JOBS_FINISHED.with_label_values(&["succeeded"]).inc();
                    info!(job_id = %id, attempt = job.attempt, "job succeeded");
                }
                JobOutcome::Cancelled => {
                    job.state = JobState::Cancelled;
                    metrics::JOBS_FINISHED.with_label_values(&["cancelled"]).inc();
                    info!(job_id = %id, "job cancelled by worker");
                }
                JobOutcome::Failed { kind } => {
                    job.last_error = Some(kind);
                    if kind == ErrorKind::Cancelled {
                        job.state = JobState::Cancelled;
                        metrics::JOBS_FINISHED.with_label_values(&["cancelled"]).inc();
                    } else {
                        match policy.decide(job.attempt, kind) {
                            RetryDecision::RetryAfter(delay) => {
                                let eligible_at = Utc::now()
                                    + chrono::Duration::from_std(delay)
                                        .unwrap_or_else(|_| chrono::Duration::seconds(60));
                                job.state = JobState::RetryPending { eligible_at };
                                metrics::RETRIES_SCHEDULED.inc();
                                info!(
                                    job_id = %id,
                                    attempt = job.attempt,
                                    error = %kind,
                                    backoff_ms = delay.as_millis() as u64,
                                    "job scheduled for retry"
                                );
                            }
                            RetryDecision::GiveUp => {
                                job.state = JobState::Failed { error: kind };
                                metrics::JOBS_FINISHED.with_label_values(&["failed"]).inc();
                                info!(
                                    job_id = %id,
                                    attempt = job.attempt,
                                    error = %kind,
                                    "job failed"
                                );
                            }
                        }
                    }
                }
            }

            let event = QueueEvent::StateChanged {
                job_id: id,
                state: job.state.clone(),
                progress: job.progress,
            };
            inner.tokens.remove(&id);
            event
        };

        let _ = self.events.send(event);
        // A slot was freed, or a retry became schedulable.
        self.dispatch.notify_waiters();
        Ok(())
    }

    /// Record fetch progress for an active job. Advisory only: stale
    /// reports against non-active jobs are dropped silently.
    pub fn report_progress(&self, id: JobId, fraction: f64, bytes_per_sec: u64) {
        let event = {
            let mut inner = self.inner.lock();
            let Some(job) = inner.jobs.iter_mut().find(|j| j.id == id) else {
                return;
            };
            if !matches!(job.state, JobState::Active) {
                return;
            }
            // Monotone within an attempt.
            job.progress = job.progress.max(fraction.clamp(0.0, 1.0));
            QueueEvent::ProgressUpdated {
                job_id: id,
                fraction: job.progress,
                bytes_per_sec,
            }
        };
        let _ = self.events.send(event);
    }

    /// Time until the earliest retry backoff expires, if any retries
    /// are pending. Idle workers use this to bound their sleep.
    pub fn time_until_next_retry(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        let now = Utc::now();
        inner
            .jobs
            .iter()
            .filter_map(|j| match &j.state {
                JobState::RetryPending { eligible_at } => Some(
                    eligible_at
                        .signed_duration_since(now)
                        .to_std()
                        .unwrap_or(Duration::ZERO),
                ),
                _ => None,
            })
            .min()
    }

    /// Current per-state counts.
    pub fn counts(&self) -> QueueCounts {
        let inner = self.inner.lock();
        let mut counts = QueueCounts::default();
        for job in &inner.jobs {
            match job.state {
                JobState::Queued => counts.queued += 1,
                JobState::Active => counts.active += 1,
                JobState::RetryPending { .. } => counts.retry_pending += 1,
                JobState::Succeeded { .. } => counts.succeeded += 1,
                JobState::Failed { .. } => counts.failed += 1,
                JobState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Clone of the whole job table, in insertion order.
    pub fn jobs(&self) -> Vec<Job> {
        self.inner.lock().jobs.clone()
    }

    /// Clone of one job.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.inner.lock().jobs.iter().find(|j| j.id == id).cloned()
    }

    /// Adjust the concurrency cap at runtime. Raising it makes more
    /// jobs dispatchable immediately; lowering it never aborts
    /// in-flight jobs.
    pub fn set_max_concurrency(&self, max_concurrency: usize) {
        self.inner.lock().max_concurrency = max_concurrency.max(1);
        self.dispatch.notify_waiters();
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.lock().max_concurrency
    }
}
