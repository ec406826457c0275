//! Trait definition for the fetcher adapter.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::FetchError;
use super::types::{FetchProgress, FetchRequest};

/// A transport that can fetch one media item to a local file.
///
/// This is the seam between the queue engine and the real network
/// transport; the engine only ever sees this contract.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Name of this fetcher implementation.
    fn name(&self) -> &str;

    /// Fetch the item into `request.work_dir` and return the path of
    /// the fetched file.
    ///
    /// Progress samples go to `progress_tx` at a bounded interval; if
    /// the receiver is dropped or the channel is full, the fetch keeps
    /// going without reporting. The cancellation token must be observed
    /// at chunk granularity; a cancelled fetch removes its partial
    /// output and returns [`FetchError::Cancelled`].
    async fn fetch(
        &self,
        request: FetchRequest,
        progress_tx: mpsc::Sender<FetchProgress>,
        cancel: CancellationToken,
    ) -> Result<PathBuf, FetchError>;
}
