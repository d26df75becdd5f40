//! Trait definitions for the extractor module.

use async_trait::async_trait;

use super::error::ExtractorError;
use super::types::{ExtractionRequest, PlaylistSession};

/// An extraction engine that can fetch the items of a playlist.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns the name of this extractor implementation.
    fn name(&self) -> &str;

    /// Resolves playlist metadata and returns a lazy stream of item results.
    ///
    /// Each item is fetched when the stream is polled for it, so a consumer
    /// that stops polling stops the download between items. Errors returned
    /// here are job-level; per-item failures come through the stream.
    async fn open(&self, request: &ExtractionRequest) -> Result<PlaylistSession, ExtractorError>;

    /// Validates that the engine is installed and runnable.
    async fn validate(&self) -> Result<(), ExtractorError>;
}
