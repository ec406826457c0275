//! Error types for the fetcher module.

use std::path::PathBuf;

use thiserror::Error;

use crate::retry::ErrorKind;

/// Errors that can occur while fetching a media item.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// Network-level failure.
    #[error("network error: {0}")]
    Connection(String),

    /// Remote asked us to back off.
    #[error("throttled by remote (HTTP {status})")]
    Throttled { status: u16 },

    /// Retryable remote failure.
    #[error("remote server error (HTTP {status})")]
    RemoteServer { status: u16 },

    /// The source URL is invalid or the item is gone.
    #[error("invalid source: {reason}")]
    InvalidSource { reason: String },

    /// The output device is full.
    #[error("no space left writing {path}")]
    DiskFull { path: PathBuf },

    /// Other I/O failure while writing the fetched file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The fetch observed its cancellation token.
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Classify this error for the retry policy.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            FetchError::Timeout => ErrorKind::Timeout,
            FetchError::Connection(_) => ErrorKind::Connection,
            FetchError::Throttled { .. } => ErrorKind::Throttled,
            FetchError::RemoteServer { .. } => ErrorKind::RemoteServer,
            FetchError::InvalidSource { .. } => ErrorKind::InvalidSource,
            FetchError::DiskFull { .. } => ErrorKind::DiskFull,
            FetchError::Io(_) => ErrorKind::Io,
            FetchError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Map a reqwest transport error.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_builder() || err.is_request() {
            FetchError::InvalidSource {
                reason: err.to_string(),
            }
        } else {
            FetchError::Connection(err.to_string())
        }
    }

    /// Map a non-success HTTP status.
    pub(crate) fn from_status(status: reqwest::StatusCode) -> Self {
        let code = status.as_u16();
        match code {
            429 | 503 => FetchError::Throttled { status: code },
            500..=599 => FetchError::RemoteServer { status: code },
            _ => FetchError::InvalidSource {
                reason: format!("HTTP {}", code),
            },
        }
    }

    /// Map an I/O error from the output file, spotting a full disk.
    pub(crate) fn from_write(path: &std::path::Path, err: std::io::Error) -> Self {
        // ENOSPC
        if err.raw_os_error() == Some(28) {
            FetchError::DiskFull {
                path: path.to_path_buf(),
            }
        } else {
            FetchError::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            FetchError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            FetchError::Throttled { status: 429 }
        ));
        assert!(matches!(
            FetchError::from_status(reqwest::StatusCode::SERVICE_UNAVAILABLE),
            FetchError::Throttled { status: 503 }
        ));
        assert!(matches!(
            FetchError::from_status(reqwest::StatusCode::BAD_GATEWAY),
            FetchError::RemoteServer { status: 502 }
        ));
        assert!(matches!(
            FetchError::from_status(reqwest::StatusCode::NOT_FOUND),
            FetchError::InvalidSource { .. }
        ));
    }

    #[test]
    fn error_kinds_follow_taxonomy() {
        assert_eq!(FetchError::Timeout.error_kind(), ErrorKind::Timeout);
        assert_eq!(
            FetchError::Throttled { status: 429 }.error_kind(),
            ErrorKind::Throttled
        );
        assert_eq!(
            FetchError::RemoteServer { status: 500 }.error_kind(),
            ErrorKind::RemoteServer
        );
        assert_eq!(
            FetchError::InvalidSource {
                reason: "HTTP 404".into()
            }
            .error_kind(),
            ErrorKind::InvalidSource
        );
        assert_eq!(FetchError::Cancelled.error_kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn enospc_maps_to_disk_full() {
        let err = std::io::Error::from_raw_os_error(28);
        assert!(matches!(
            FetchError::from_write(std::path::Path::new("/out/a.part"), err),
            FetchError::DiskFull { .. }
        ));

        let other = std::io::Error::from_raw_os_error(13);
        assert!(matches!(
            FetchError::from_write(std::path::Path::new("/out/a.part"), other),
            FetchError::Io(_)
        ));
    }
}
