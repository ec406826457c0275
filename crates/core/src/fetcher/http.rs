//! HTTP fetcher implementation backed by reqwest streaming.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::HttpFetcherConfig;
use super::error::FetchError;
use super::traits::Fetcher;
use super::types::{FetchProgress, FetchRequest};

/// Fetcher that streams a plain HTTP(S) resource to disk.
pub struct HttpFetcher {
    client: reqwest::Client,
    config: HttpFetcherConfig,
}

impl HttpFetcher {
    /// Create a new HTTP fetcher with the given configuration.
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Connection(format!("failed to build http client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create a fetcher with default configuration.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(HttpFetcherConfig::default())
    }

    async fn remove_partial(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove partial file {:?}: {}", path, e);
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        progress_tx: mpsc::Sender<FetchProgress>,
        cancel: CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        if !request.source_url.starts_with("http://") && !request.source_url.starts_with("https://")
        {
            return Err(FetchError::InvalidSource {
                reason: format!("unsupported URL scheme: {}", request.source_url),
            });
        }

        tokio::fs::create_dir_all(&request.work_dir)
            .await
            .map_err(|e| FetchError::from_write(&request.work_dir, e))?;

        let response = self
            .client
            .get(&request.source_url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status));
        }

        let total_bytes = response.content_length();
        let path = request.work_dir.join(format!("{}.part", request.job_id));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| FetchError::from_write(&path, e))?;

        debug!(
            job_id = %request.job_id,
            url = %request.source_url,
            total_bytes = ?total_bytes,
            "fetch started"
        );

        let progress_interval = Duration::from_millis(self.config.progress_interval_ms);
        let mut downloaded: u64 = 0;
        let mut window_bytes: u64 = 0;
        let mut window_start = Instant::now();
        let mut last_emit = Instant::now();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                drop(file);
                Self::remove_partial(&path).await;
                return Err(FetchError::Cancelled);
            }

            let chunk = chunk.map_err(FetchError::from_reqwest)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::from_write(&path, e))?;

            downloaded += chunk.len() as u64;
            window_bytes += chunk.len() as u64;

            if last_emit.elapsed() >= progress_interval {
                let elapsed = window_start.elapsed().as_secs_f64();
                let bytes_per_sec = if elapsed > 0.0 {
                    (window_bytes as f64 / elapsed) as u64
                } else {
                    0
                };
                let fraction = total_bytes
                    .map(|t| (downloaded as f64 / t as f64).min(1.0))
                    .unwrap_or(0.0);

                // Advisory: drop the sample if the consumer is behind.
                let _ = progress_tx.try_send(FetchProgress {
                    job_id: request.job_id,
                    fraction,
                    bytes_per_sec,
                });

                window_bytes = 0;
                window_start = Instant::now();
                last_emit = Instant::now();
            }
        }

        file.flush()
            .await
            .map_err(|e| FetchError::from_write(&path, e))?;

        if cancel.is_cancelled() {
            Self::remove_partial(&path).await;
            return Err(FetchError::Cancelled);
        }

        let _ = progress_tx.try_send(FetchProgress {
            job_id: request.job_id,
            fraction: 1.0,
            bytes_per_sec: 0,
        });

        debug!(job_id = %request.job_id, bytes = downloaded, "fetch finished");

        Ok(path)
    }
}
