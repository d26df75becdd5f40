//! Error types for the extractor module.

use std::path::PathBuf;
use thiserror::Error;

/// Job-level extraction failures. Per-item problems are reported as
/// `ExtractedItem` variants instead.
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// yt-dlp binary not found.
    #[error("yt-dlp not found at path: {path}")]
    BinaryNotFound { path: PathBuf },

    /// The engine rejected the playlist as a whole (invalid URL, login required, ...).
    #[error("{message}")]
    Fatal { message: String },

    /// Resolving the playlist took too long.
    #[error("Playlist resolution timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The engine output could not be understood.
    #[error("Failed to parse playlist metadata: {reason}")]
    ParseError { reason: String },

    /// I/O error talking to the engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractorError {
    /// Creates a new fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }
}
