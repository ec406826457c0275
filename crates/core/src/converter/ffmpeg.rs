//! FFmpeg-based converter implementation.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::Converter;
use super::types::{ConversionJob, ConversionResult};
use crate::job::TargetFormat;

/// FFmpeg-based converter implementation.
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Builds ffmpeg arguments for a job.
    ///
    /// Audio targets extract the audio track to mp3 at the configured
    /// bitrate; video targets remux streams into an mp4 container.
    fn build_args(&self, job: &ConversionJob) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(), // Overwrite output: retries are idempotent
            "-i".to_string(),
            job.input_path.to_string_lossy().to_string(),
        ];

        match job.target_format {
            TargetFormat::Audio => {
                args.extend([
                    "-vn".to_string(),
                    "-c:a".to_string(),
                    "libmp3lame".to_string(),
                    "-b:a".to_string(),
                    format!("{}k", job.audio_bitrate_kbps),
                ]);
            }
            TargetFormat::Video => {
                args.extend([
                    "-c".to_string(),
                    "copy".to_string(),
                    "-movflags".to_string(),
                    "+faststart".to_string(),
                ]);
            }
        }

        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
        ]);

        args.push(job.output_path.to_string_lossy().to_string());

        args
    }

    fn map_spawn_error(&self, err: std::io::Error) -> ConverterError {
        if err.kind() == std::io::ErrorKind::NotFound {
            ConverterError::FfmpegNotFound {
                path: self.config.ffmpeg_path.clone(),
            }
        } else {
            ConverterError::Io(err)
        }
    }
}

fn tail_of(stderr: &[u8], max_lines: usize) -> Option<String> {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(max_lines);
    Some(lines[start..].join("\n"))
}

async fn ensure_parent_dir(path: &Path) -> Result<(), ConverterError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            // ENOSPC
            if e.raw_os_error() == Some(28) {
                ConverterError::DiskFull {
                    path: parent.to_path_buf(),
                }
            } else {
                ConverterError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                }
            }
        })?;
    }
    Ok(())
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn convert(&self, job: ConversionJob) -> Result<ConversionResult, ConverterError> {
        let start = Instant::now();

        if !tokio::fs::try_exists(&job.input_path).await.unwrap_or(false) {
            return Err(ConverterError::InputNotFound {
                path: job.input_path.clone(),
            });
        }

        ensure_parent_dir(&job.output_path).await?;

        let args = self.build_args(&job);
        debug!(job_id = %job.job_id, ?args, "running ffmpeg");

        let run = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = if self.config.timeout_secs > 0 {
            match timeout(Duration::from_secs(self.config.timeout_secs), run).await {
                Ok(result) => result.map_err(|e| self.map_spawn_error(e))?,
                Err(_) => {
                    return Err(ConverterError::Timeout {
                        timeout_secs: self.config.timeout_secs,
                    });
                }
            }
        } else {
            run.await.map_err(|e| self.map_spawn_error(e))?
        };

        if !output.status.success() {
            return Err(ConverterError::ConversionFailed {
                reason: format!("ffmpeg exited with {}", output.status),
                stderr: tail_of(&output.stderr, 20),
            });
        }

        let output_size_bytes = tokio::fs::metadata(&job.output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        debug!(
            job_id = %job.job_id,
            output = %job.output_path.display(),
            bytes = output_size_bytes,
            "conversion finished"
        );

        Ok(ConversionResult {
            job_id: job.job_id,
            output_path: job.output_path,
            output_size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use std::path::PathBuf;

    fn job(format: TargetFormat) -> ConversionJob {
        ConversionJob {
            job_id: JobId::new(),
            input_path: PathBuf::from("/in/clip.part"),
            target_format: format,
            output_path: PathBuf::from("/out/clip.mp4"),
            audio_bitrate_kbps: 256,
        }
    }

    #[test]
    fn audio_args_extract_mp3() {
        let converter = FfmpegConverter::with_defaults();
        let args = converter.build_args(&job(TargetFormat::Audio));

        assert_eq!(args[0], "-y");
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.contains(&"libmp3lame".to_string()));
        let bitrate_pos = args.iter().position(|a| a == "-b:a").unwrap();
        assert_eq!(args[bitrate_pos + 1], "256k");
    }

    #[test]
    fn video_args_remux_copy() {
        let converter = FfmpegConverter::with_defaults();
        let args = converter.build_args(&job(TargetFormat::Video));

        let codec_pos = args.iter().position(|a| a == "-c").unwrap();
        assert_eq!(args[codec_pos + 1], "copy");
        assert!(!args.contains(&"libmp3lame".to_string()));
        assert_eq!(args.last().unwrap(), "/out/clip.mp4");
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let text = (0..30)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let tail = tail_of(text.as_bytes(), 5).unwrap();
        assert!(tail.starts_with("line 25"));
        assert!(tail.ends_with("line 29"));
        assert!(tail_of(b"", 5).is_none());
    }

    #[tokio::test]
    async fn missing_input_is_reported() {
        let converter = FfmpegConverter::with_defaults();
        let result = converter.convert(job(TargetFormat::Video)).await;
        assert!(matches!(result, Err(ConverterError::InputNotFound { .. })));
    }
}
