//! Core job data types.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retry::ErrorKind;

/// Unique identifier of a job, assigned at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Output format requested for a job.
///
/// Determines both the conversion target and the output container:
/// video jobs end up as mp4, audio jobs as mp3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    #[default]
    Video,
    Audio,
}

impl TargetFormat {
    /// File extension of the converted output.
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Video => "mp4",
            TargetFormat::Audio => "mp3",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetFormat::Video => write!(f, "video"),
            TargetFormat::Audio => write!(f, "audio"),
        }
    }
}

/// What a caller submits to have a job enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Source media URL. Opaque to the engine beyond basic validation.
    pub source_url: String,

    /// Display title, used for the output file name.
    pub title: String,

    /// Requested output format.
    #[serde(default)]
    pub target_format: TargetFormat,

    /// Optional collection (e.g. playlist) this item belongs to.
    /// Items of the same collection share an output subdirectory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl JobDescriptor {
    /// Create a descriptor with the default (video) target format.
    pub fn new(source_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            target_format: TargetFormat::default(),
            collection: None,
        }
    }

    /// Set the target format.
    pub fn with_format(mut self, format: TargetFormat) -> Self {
        self.target_format = format;
        self
    }

    /// Set the collection this item belongs to.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }
}

/// Current state of a job.
///
/// State machine flow:
/// ```text
/// Queued -> Active -> Succeeded
///             |    -> RetryPending -> (backoff elapses) -> Active
///             |    -> Failed
///             |    -> Cancelled
/// Queued -> Cancelled
/// ```
/// Succeeded, Failed and Cancelled are terminal: a job in one of them
/// never transitions again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a free worker slot.
    Queued,

    /// A worker is running the fetch/convert pipeline for this job.
    Active,

    /// Failed with a transient error; becomes dispatch-eligible again
    /// once `eligible_at` has passed.
    RetryPending { eligible_at: DateTime<Utc> },

    /// Fetch and conversion both completed.
    Succeeded { output: PathBuf },

    /// Gave up after a permanent error or exhausted retries.
    Failed { error: ErrorKind },

    /// Explicitly cancelled by the caller.
    Cancelled,
}

impl JobState {
    /// Short state name for display and filtering.
    pub fn state_type(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
            JobState::RetryPending { .. } => "retry_pending",
            JobState::Succeeded { .. } => "succeeded",
            JobState::Failed { .. } => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded { .. } | JobState::Failed { .. } | JobState::Cancelled
        )
    }
}

/// A single download-and-convert unit of work.
///
/// Constructed by the queue manager on enqueue and mutated exclusively
/// through it; everything handed out of the queue is a clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source_url: String,
    pub title: String,
    pub target_format: TargetFormat,
    /// Collection the item was submitted under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Resolved output directory, set at enqueue time.
    pub destination_dir: PathBuf,
    pub state: JobState,
    /// Dispatch attempts made so far. 0 until first dispatch, never
    /// exceeds `max_retries + 1`.
    pub attempt: u32,
    /// Fraction in [0, 1], non-decreasing within one attempt and reset
    /// to 0 when a new attempt starts.
    pub progress: f64,
    /// Last recorded failure kind, kept for display.
    pub last_error: Option<ErrorKind>,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// Rebuild the descriptor this job was created from, for saved job
    /// lists.
    pub fn descriptor(&self) -> JobDescriptor {
        JobDescriptor {
            source_url: self.source_url.clone(),
            title: self.title.clone(),
            target_format: self.target_format,
            collection: self.collection.clone(),
        }
    }
}

/// Terminal outcome of one dispatch attempt, reported by a worker.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Fetch and conversion both succeeded.
    Completed { output: PathBuf },
    /// The pipeline failed with the given classified error.
    Failed { kind: ErrorKind },
    /// The worker observed the cancellation request and aborted.
    Cancelled,
}
