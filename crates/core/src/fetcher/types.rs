//! Fetch request and progress types.

use std::path::PathBuf;

use serde::Serialize;

use crate::job::{JobId, TargetFormat};

/// One fetch handed to the adapter by a worker.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub job_id: JobId,
    /// Source media URL.
    pub source_url: String,
    pub target_format: TargetFormat,
    /// Directory the fetched file is written into.
    pub work_dir: PathBuf,
}

/// Progress sample emitted by a fetcher while a transfer runs.
///
/// Samples are advisory: consumers must tolerate missing or stale ones.
/// `fraction` is non-decreasing within one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FetchProgress {
    pub job_id: JobId,
    /// Completed fraction in [0, 1]. Stays at 0 when the total size is
    /// unknown; jumps to 1 on completion.
    pub fraction: f64,
    /// Instantaneous transfer rate.
    pub bytes_per_sec: u64,
}
