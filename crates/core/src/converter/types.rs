//! Conversion job and result types.

use std::path::PathBuf;

use crate::job::{JobId, TargetFormat};

/// One conversion handed to the adapter after a successful fetch.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub job_id: JobId,
    /// Fetched input file.
    pub input_path: PathBuf,
    /// Requested output format; decides codec and container.
    pub target_format: TargetFormat,
    /// Final output file, inside the job's destination directory.
    pub output_path: PathBuf,
    /// Audio bitrate for audio targets, in kbit/s.
    pub audio_bitrate_kbps: u32,
}

/// Result of a completed conversion.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub job_id: JobId,
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    pub duration_ms: u64,
}
