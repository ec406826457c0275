//! Mock converter for testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::converter::{ConversionJob, ConversionResult, Converter, ConverterError};

/// A recorded conversion job for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedConversion {
    /// The job that was submitted.
    pub job: ConversionJob,
    /// Whether the conversion succeeded.
    pub success: bool,
}

/// Mock implementation of the [`Converter`] trait.
///
/// Provides controllable behavior for testing:
/// - track conversion jobs for assertions
/// - inject the next error
/// - simulate conversion duration
///
/// Clones share state, so tests can keep a handle after moving the
/// converter into an engine.
#[derive(Clone)]
pub struct MockConverter {
    conversions: Arc<RwLock<Vec<RecordedConversion>>>,
    next_error: Arc<RwLock<Option<ConverterError>>>,
    conversion_duration_ms: Arc<RwLock<u64>>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    pub fn new() -> Self {
        Self {
            conversions: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            conversion_duration_ms: Arc::new(RwLock::new(0)),
        }
    }

    /// Get all recorded conversions.
    pub async fn recorded_conversions(&self) -> Vec<RecordedConversion> {
        self.conversions.read().await.clone()
    }

    /// Number of conversions performed.
    pub async fn conversion_count(&self) -> usize {
        self.conversions.read().await.len()
    }

    /// Configure the next conversion to fail with the given error.
    pub async fn set_next_error(&self, error: ConverterError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set the simulated conversion duration.
    pub async fn set_conversion_duration(&self, duration: Duration) {
        *self.conversion_duration_ms.write().await = duration.as_millis() as u64;
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn convert(&self, job: ConversionJob) -> Result<ConversionResult, ConverterError> {
        if let Some(err) = self.next_error.write().await.take() {
            self.conversions.write().await.push(RecordedConversion {
                job,
                success: false,
            });
            return Err(err);
        }

        self.conversions.write().await.push(RecordedConversion {
            job: job.clone(),
            success: true,
        });

        let duration_ms = *self.conversion_duration_ms.read().await;
        if duration_ms > 0 {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        }

        Ok(ConversionResult {
            job_id: job.job_id,
            output_path: job.output_path,
            output_size_bytes: 1024,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobId, TargetFormat};
    use std::path::PathBuf;

    fn job(id_hint: &str) -> ConversionJob {
        ConversionJob {
            job_id: JobId::new(),
            input_path: PathBuf::from(format!("/in/{}.part", id_hint)),
            target_format: TargetFormat::Audio,
            output_path: PathBuf::from(format!("/out/{}.mp3", id_hint)),
            audio_bitrate_kbps: 256,
        }
    }

    #[tokio::test]
    async fn records_successful_conversions() {
        let converter = MockConverter::new();

        converter.convert(job("a")).await.unwrap();
        converter.convert(job("b")).await.unwrap();

        let recorded = converter.recorded_conversions().await;
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].success);
        assert_eq!(recorded[0].job.input_path, PathBuf::from("/in/a.part"));
    }

    #[tokio::test]
    async fn injected_error_is_consumed_once() {
        let converter = MockConverter::new();
        converter
            .set_next_error(ConverterError::conversion_failed("boom", None))
            .await;

        assert!(converter.convert(job("fail")).await.is_err());
        assert!(converter.convert(job("ok")).await.is_ok());

        let recorded = converter.recorded_conversions().await;
        assert!(!recorded[0].success);
        assert!(recorded[1].success);
    }
}
