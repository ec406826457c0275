//! Converter configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for [`FfmpegConverter`](super::FfmpegConverter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to the ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// ffmpeg `-loglevel` value.
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Audio bitrate for audio targets, in kbit/s.
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,

    /// Hard cap on a single conversion, in seconds. 0 disables the cap.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_audio_bitrate() -> u32 {
    256
}

fn default_timeout() -> u64 {
    1800
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffmpeg_log_level: default_log_level(),
            audio_bitrate_kbps: default_audio_bitrate(),
            timeout_secs: default_timeout(),
        }
    }
}
