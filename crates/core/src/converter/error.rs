use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("ffmpeg binary not found: {path}")]
    FfmpegNotFound { path: PathBuf },

    #[error("fetched file is missing: {path}")]
    InputNotFound { path: PathBuf },

    /// ffmpeg ran but did not produce a usable file.
    #[error("{reason}")]
    ConversionFailed {
        reason: String,
        stderr: Option<String>,
    },

    #[error("ffmpeg gave up after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    pub fn conversion_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Text recorded on the item outcome when this conversion fails.
    pub fn detail(&self) -> String {
        match self {
            Self::ConversionFailed {
                reason,
                stderr: Some(stderr),
            } => format!("{}: {}", reason, stderr.trim()),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_includes_stderr() {
        let err = ConverterError::conversion_failed(
            "ffmpeg exited with status 1",
            Some("Invalid data found when processing input\n".to_string()),
        );
        assert_eq!(
            err.detail(),
            "ffmpeg exited with status 1: Invalid data found when processing input"
        );
    }

    #[test]
    fn test_detail_without_stderr() {
        let err = ConverterError::Timeout { timeout_secs: 30 };
        assert_eq!(err.detail(), "ffmpeg gave up after 30s");
    }
}
