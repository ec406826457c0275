//! Mock fetcher for testing.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::fetcher::{FetchError, FetchProgress, FetchRequest, Fetcher};
use crate::retry::ErrorKind;

/// Mock implementation of the [`Fetcher`] trait.
///
/// Provides controllable behavior for testing:
/// - script per-URL failure sequences (fail N times, then succeed)
/// - simulate transfer duration and progress samples
/// - honor cooperative cancellation
/// - record every request for assertions
///
/// Clones share state, so tests can keep a handle after moving the
/// fetcher into an engine.
#[derive(Clone)]
pub struct MockFetcher {
    /// Pending failures per source URL; popped one per attempt.
    scripts: Arc<RwLock<HashMap<String, VecDeque<ErrorKind>>>>,
    /// Simulated transfer duration in milliseconds.
    fetch_duration_ms: Arc<RwLock<u64>>,
    /// Whether to emit progress samples during the transfer.
    send_progress: Arc<RwLock<bool>>,
    /// Recorded requests, in dispatch order.
    requests: Arc<RwLock<Vec<FetchRequest>>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(RwLock::new(HashMap::new())),
            fetch_duration_ms: Arc::new(RwLock::new(10)),
            send_progress: Arc::new(RwLock::new(true)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Script the next `times` attempts for `url` to fail with `kind`;
    /// attempts after that succeed.
    pub async fn fail_times(&self, url: impl Into<String>, times: usize, kind: ErrorKind) {
        let mut scripts = self.scripts.write().await;
        let entry = scripts.entry(url.into()).or_default();
        for _ in 0..times {
            entry.push_back(kind);
        }
    }

    /// Set the simulated transfer duration.
    pub async fn set_fetch_duration(&self, duration: Duration) {
        *self.fetch_duration_ms.write().await = duration.as_millis() as u64;
    }

    /// Enable or disable progress samples.
    pub async fn set_send_progress(&self, send: bool) {
        *self.send_progress.write().await = send;
    }

    /// All requests seen so far, in dispatch order.
    pub async fn recorded_requests(&self) -> Vec<FetchRequest> {
        self.requests.read().await.clone()
    }

    /// Number of fetches attempted.
    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }

    fn error_for(kind: ErrorKind) -> FetchError {
        match kind {
            ErrorKind::Timeout => FetchError::Timeout,
            ErrorKind::Throttled => FetchError::Throttled { status: 429 },
            ErrorKind::Connection => FetchError::Connection("simulated".to_string()),
            ErrorKind::RemoteServer => FetchError::RemoteServer { status: 500 },
            ErrorKind::InvalidSource => FetchError::InvalidSource {
                reason: "simulated".to_string(),
            },
            ErrorKind::DiskFull => FetchError::DiskFull {
                path: PathBuf::from("/simulated"),
            },
            ErrorKind::Io => FetchError::Io(std::io::Error::other("simulated")),
            ErrorKind::Cancelled => FetchError::Cancelled,
            // A fetcher never surfaces a conversion-format error; this
            // kind belongs to the converter taxonomy only.
            ErrorKind::UnsupportedFormat => {
                unreachable!("fetcher cannot produce UnsupportedFormat")
            }
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        progress_tx: mpsc::Sender<FetchProgress>,
        cancel: CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        self.requests.write().await.push(request.clone());

        let scripted_failure = {
            let mut scripts = self.scripts.write().await;
            scripts
                .get_mut(&request.source_url)
                .and_then(|queue| queue.pop_front())
        };

        let duration_ms = *self.fetch_duration_ms.read().await;
        let send_progress = *self.send_progress.read().await;

        // Simulate the transfer in steps so cancellation is observed
        // at chunk granularity.
        let steps = 5u64;
        let step = Duration::from_millis(duration_ms / steps);
        for i in 0..steps {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            if !step.is_zero() {
                tokio::time::sleep(step).await;
            }
            if send_progress {
                let _ = progress_tx.try_send(FetchProgress {
                    job_id: request.job_id,
                    fraction: (i + 1) as f64 / steps as f64,
                    bytes_per_sec: 1024 * 1024,
                });
            }
        }

        if let Some(kind) = scripted_failure {
            return Err(Self::error_for(kind));
        }

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        tokio::fs::create_dir_all(&request.work_dir)
            .await
            .map_err(FetchError::Io)?;
        let path = request.work_dir.join(format!("{}.part", request.job_id));
        tokio::fs::write(&path, b"simulated media")
            .await
            .map_err(FetchError::Io)?;

        Ok(path)
    }
}
