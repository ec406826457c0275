//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::converter::ConverterConfig;
use crate::fetcher::HttpFetcherConfig;
use crate::job::TargetFormat;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub fetcher: HttpFetcherConfig,

    #[serde(default)]
    pub converter: ConverterConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Queue and worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Worker pool size; at most this many jobs run at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Retries allowed after a job's first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Backoff delay ceiling in milliseconds.
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    /// Default target format for submitted jobs.
    #[serde(default)]
    pub output_format: TargetFormat,
}

fn default_max_concurrency() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    2000
}

fn default_retry_max_delay() -> u64 {
    60_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            output_format: TargetFormat::default(),
        }
    }
}

impl QueueConfig {
    /// Build the retry policy described by this config.
    pub fn retry_policy(&self) -> crate::retry::RetryPolicy {
        crate::retry::RetryPolicy {
            max_retries: self.max_retries,
            base_delay: std::time::Duration::from_millis(self.retry_base_delay_ms),
            max_delay: std::time::Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

/// Output location configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Base directory downloads land in.
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,

    /// Whether items of a collection get their own subdirectory.
    #[serde(default = "default_per_source_subdirs")]
    pub per_source_subdirs: bool,
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_per_source_subdirs() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_directory: default_output_directory(),
            per_source_subdirs: default_per_source_subdirs(),
        }
    }
}
