//! Trait definition for the converter adapter.

use async_trait::async_trait;

use super::error::ConverterError;
use super::types::{ConversionJob, ConversionResult};

/// A converter that can transcode a fetched media file.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Name of this converter implementation.
    fn name(&self) -> &str;

    /// Convert `job.input_path` into `job.output_path`.
    ///
    /// Must be idempotent on retry: re-running against a freshly
    /// fetched input overwrites any previous output.
    async fn convert(&self, job: ConversionJob) -> Result<ConversionResult, ConverterError>;
}
