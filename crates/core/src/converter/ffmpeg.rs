//! FFmpeg-backed converter.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::Converter;
use super::types::{AudioConstraints, ConversionJob, ConversionResult};

/// Transcodes items by running one `ffmpeg` process per conversion.
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// `ffmpeg -y -i <in> -vn -c:a <codec> [-b:a <n>k] -loglevel <lvl> [extra..] <out>`
    fn build_audio_args(
        &self,
        input: &Path,
        output: &Path,
        constraints: &AudioConstraints,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into(), "-i".into()];
        args.push(input.to_string_lossy().into_owned());
        // Cover art and video tracks are dropped
        args.push("-vn".into());
        args.push("-c:a".into());
        args.push(constraints.format.ffmpeg_codec().into());

        if let Some(kbps) = constraints.bitrate_kbps {
            args.push("-b:a".into());
            args.push(format!("{}k", kbps));
        }

        args.push("-loglevel".into());
        args.push(self.config.ffmpeg_log_level.clone());
        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.push(output.to_string_lossy().into_owned());
        args
    }

    fn spawn_error(&self, err: std::io::Error) -> ConverterError {
        if err.kind() == ErrorKind::NotFound {
            ConverterError::FfmpegNotFound {
                path: self.config.ffmpeg_path.clone(),
            }
        } else {
            ConverterError::Io(err)
        }
    }

    async fn transcode(&self, job: &ConversionJob) -> Result<ConversionResult, ConverterError> {
        let started = Instant::now();

        if !tokio::fs::try_exists(&job.input_path).await.unwrap_or(false) {
            return Err(ConverterError::InputNotFound {
                path: job.input_path.clone(),
            });
        }

        let args = self.build_audio_args(&job.input_path, &job.output_path, &job.constraints);
        debug!("{}: ffmpeg {}", job.job_id, args.join(" "));

        let mut command = Command::new(&self.config.ffmpeg_path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Dropping the output future on timeout kills ffmpeg
        let limit = Duration::from_secs(self.config.timeout_secs);
        let output = match timeout(limit, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(self.spawn_error(e)),
            Err(_) => {
                let _ = tokio::fs::remove_file(&job.output_path).await;
                return Err(ConverterError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        };

        if !output.status.success() {
            // A half-written MP3 is worse than none
            let _ = tokio::fs::remove_file(&job.output_path).await;
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ConverterError::conversion_failed(
                format!("ffmpeg exited with {}", output.status),
                (!stderr.is_empty()).then_some(stderr),
            ));
        }

        let written = tokio::fs::metadata(&job.output_path)
            .await
            .map_err(|_| ConverterError::conversion_failed("Output file not created", None))?;

        Ok(ConversionResult {
            job_id: job.job_id.clone(),
            output_path: job.output_path.clone(),
            output_size_bytes: written.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn convert(&self, job: ConversionJob) -> Result<ConversionResult, ConverterError> {
        self.transcode(&job).await
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|_| ())
            .map_err(|e| self.spawn_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::AudioFormat;
    use std::path::PathBuf;

    #[test]
    fn test_mp3_args() {
        let converter = FfmpegConverter::with_defaults();
        let args = converter.build_audio_args(
            Path::new("/music/1 - Intro.webm"),
            Path::new("/music/1 - Intro.mp3"),
            &AudioConstraints {
                format: AudioFormat::Mp3,
                bitrate_kbps: Some(192),
            },
        );

        assert_eq!(
            args,
            vec![
                "-y",
                "-i",
                "/music/1 - Intro.webm",
                "-vn",
                "-c:a",
                "libmp3lame",
                "-b:a",
                "192k",
                "-loglevel",
                "error",
                "/music/1 - Intro.mp3",
            ]
        );
    }

    #[test]
    fn test_no_bitrate_and_extra_args() {
        let converter = FfmpegConverter::new(ConverterConfig {
            extra_ffmpeg_args: vec!["-threads".to_string(), "2".to_string()],
            ..ConverterConfig::default()
        });
        let args = converter.build_audio_args(
            Path::new("/in.opus"),
            Path::new("/out.mp3"),
            &AudioConstraints {
                format: AudioFormat::Mp3,
                bitrate_kbps: None,
            },
        );

        assert!(!args.iter().any(|a| a == "-b:a"));
        assert_eq!(&args[args.len() - 3..], ["-threads", "2", "/out.mp3"]);
    }

    #[tokio::test]
    async fn test_missing_input_is_reported() {
        let converter = FfmpegConverter::with_defaults();
        let job = ConversionJob::beside(
            "job",
            PathBuf::from("/definitely/not/here.webm"),
            AudioConstraints::default(),
        );

        let err = converter.convert(job).await.unwrap_err();
        assert!(matches!(err, ConverterError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn test_validate_missing_binary() {
        let converter = FfmpegConverter::new(ConverterConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg"),
            ..ConverterConfig::default()
        });
        let err = converter.validate().await.unwrap_err();
        assert!(matches!(err, ConverterError::FfmpegNotFound { .. }));
    }
}
