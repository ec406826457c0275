use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// High-level classification of a pipeline failure.
///
/// Transient kinds are worth another attempt; permanent kinds fail the
/// job on first sight. `Cancelled` is neither: it ends the job in the
/// Cancelled state without consulting the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Remote asked us to slow down (HTTP 429/503).
    Throttled,
    /// Network-level failure (connection reset, DNS, interrupted body).
    Connection,
    /// Retryable remote failure (other 5xx).
    RemoteServer,
    /// Source is invalid or unavailable (bad URL, 4xx).
    InvalidSource,
    /// Media cannot be converted to the requested format.
    UnsupportedFormat,
    /// No space left on the output device.
    DiskFull,
    /// Other local I/O failure.
    Io,
    /// The job was cancelled while running.
    Cancelled,
}

impl ErrorKind {
    /// Whether this kind is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::Throttled
                | ErrorKind::Connection
                | ErrorKind::RemoteServer
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Throttled => "throttled",
            ErrorKind::Connection => "connection",
            ErrorKind::RemoteServer => "remote_server",
            ErrorKind::InvalidSource => "invalid_source",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::DiskFull => "disk_full",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given backoff delay.
    RetryAfter(Duration),
    /// Do not retry; the job fails terminally.
    GiveUp,
}

/// Bounded exponential backoff policy.
///
/// A job gets at most `max_retries + 1` attempts. The delay grows as
/// `base_delay * 2^(attempt - 1)`, capped at `max_delay`, so it is
/// monotonically non-decreasing and bounded.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Decide whether the attempt that just failed should be retried.
    ///
    /// `attempt` is 1-based (1 = the first attempt). The decision is
    /// mechanical and never fails.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if !kind.is_transient() {
            return RetryDecision::GiveUp;
        }
        if attempt >= self.max_retries + 1 {
            return RetryDecision::GiveUp;
        }

        let exp = 1u32 << attempt.saturating_sub(1).min(8);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        RetryDecision::RetryAfter(delay)
    }
}
