//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Audio format a fetched item can be transcoded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// MPEG Audio Layer III
    Mp3,
}

impl AudioFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
        }
    }

    /// Returns the ffmpeg codec name for this format.
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            Self::Mp3 => "libmp3lame",
        }
    }

    /// Whether a file already carries this format's extension.
    pub fn matches_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(self.extension()))
            .unwrap_or(false)
    }

    /// Path of the converted file next to the source.
    pub fn output_path_for(&self, source: &Path) -> PathBuf {
        source.with_extension(self.extension())
    }
}

/// Constraints for audio conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConstraints {
    /// Target audio format.
    pub format: AudioFormat,
    /// Target bitrate in kbps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            format: AudioFormat::Mp3,
            bitrate_kbps: Some(320),
        }
    }
}

/// A single transcode request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    /// Identifier used in logs (job id plus item index).
    pub job_id: String,
    /// File produced by the extraction engine.
    pub input_path: PathBuf,
    /// Where the converted file is written.
    pub output_path: PathBuf,
    pub constraints: AudioConstraints,
}

impl ConversionJob {
    /// Builds a job writing next to the input with the target extension.
    pub fn beside(
        job_id: impl Into<String>,
        input_path: PathBuf,
        constraints: AudioConstraints,
    ) -> Self {
        let output_path = constraints.format.output_path_for(&input_path);
        Self {
            job_id: job_id.into(),
            input_path,
            output_path,
            constraints,
        }
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub job_id: String,
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_path() {
        assert!(AudioFormat::Mp3.matches_path(Path::new("/out/1 - Song.mp3")));
        assert!(AudioFormat::Mp3.matches_path(Path::new("/out/1 - Song.MP3")));
        assert!(!AudioFormat::Mp3.matches_path(Path::new("/out/1 - Song.webm")));
        assert!(!AudioFormat::Mp3.matches_path(Path::new("/out/noext")));
    }

    #[test]
    fn test_job_beside_input() {
        let job = ConversionJob::beside(
            "job-1",
            PathBuf::from("/out/2 - Song.opus"),
            AudioConstraints::default(),
        );
        assert_eq!(job.output_path, PathBuf::from("/out/2 - Song.mp3"));
    }

    #[test]
    fn test_dotted_title_keeps_stem() {
        let path = AudioFormat::Mp3.output_path_for(Path::new("/out/3 - Mr. Brightside.m4a"));
        assert_eq!(path, PathBuf::from("/out/3 - Mr. Brightside.mp3"));
    }
}
