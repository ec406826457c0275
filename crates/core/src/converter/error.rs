//! Error types for the converter module.

use std::path::PathBuf;

use thiserror::Error;

use crate::retry::ErrorKind;

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// ffmpeg binary not found.
    #[error("ffmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// Input file not found.
    #[error("input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Conversion process failed.
    #[error("conversion failed: {reason}")]
    ConversionFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Conversion timed out.
    #[error("conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Output directory does not exist and could not be created.
    #[error("failed to create output directory: {path}")]
    OutputDirectoryFailed { path: PathBuf },

    /// The output device is full.
    #[error("no space left writing {path}")]
    DiskFull { path: PathBuf },

    /// I/O error during conversion.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The job was cancelled before conversion started.
    #[error("conversion cancelled")]
    Cancelled,
}

impl ConverterError {
    /// Creates a new conversion failed error with stderr output.
    pub fn conversion_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Classify this error for the retry policy.
    ///
    /// A failed ffmpeg run means the media cannot be converted as
    /// requested, so it is permanent; only a timeout is worth retrying.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            ConverterError::FfmpegNotFound { .. } => ErrorKind::UnsupportedFormat,
            ConverterError::ConversionFailed { .. } => ErrorKind::UnsupportedFormat,
            ConverterError::Timeout { .. } => ErrorKind::Timeout,
            ConverterError::InputNotFound { .. } => ErrorKind::Io,
            ConverterError::OutputDirectoryFailed { .. } => ErrorKind::Io,
            ConverterError::DiskFull { .. } => ErrorKind::DiskFull,
            ConverterError::Io(_) => ErrorKind::Io,
            ConverterError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
