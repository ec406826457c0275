//! HTTP fetcher configuration.

use serde::{Deserialize, Serialize};

/// Configuration for [`HttpFetcher`](super::HttpFetcher).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpFetcherConfig {
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle read timeout in seconds. A stalled transfer is surfaced as
    /// a timeout and handed to the retry policy.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Minimum interval between progress samples, in milliseconds.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,

    /// User-Agent header sent with requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    30
}

fn default_progress_interval() -> u64 {
    100 // 10 Hz
}

fn default_user_agent() -> String {
    format!("medley/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            progress_interval_ms: default_progress_interval(),
            user_agent: default_user_agent(),
        }
    }
}
