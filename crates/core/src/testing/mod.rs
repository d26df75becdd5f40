//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the extraction engine and
//! transcode adapters, allowing the runner and controller to be exercised
//! without yt-dlp or ffmpeg installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use listgrab_core::testing::{MockConverter, MockEntry, MockExtractor};
//!
//! let extractor = MockExtractor::new();
//! let converter = MockConverter::new();
//!
//! // Configure mock responses
//! extractor.set_entries(vec![MockEntry::fetched("Intro", "webm")]).await;
//! converter.fail_for("/music/1 - Intro.webm").await;
//!
//! // Use in a JobController...
//! ```

mod mock_converter;
mod mock_extractor;

pub use mock_converter::{MockConverter, RecordedConversion};
pub use mock_extractor::{MockEntry, MockExtractor};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;
    use std::sync::Arc;

    use super::{MockConverter, MockEntry, MockExtractor};
    use crate::config::Config;
    use crate::controller::JobController;
    use crate::job::{DownloadRequest, TargetFormat};

    /// A SoundCloud set request writing into `dir`.
    pub fn soundcloud_request(dir: &Path, format: TargetFormat) -> DownloadRequest {
        DownloadRequest::new("https://soundcloud.com/x/sets/y", dir).with_format(format)
    }

    /// A YouTube playlist request writing into `dir`.
    pub fn youtube_request(dir: &Path, format: TargetFormat) -> DownloadRequest {
        DownloadRequest::new("https://youtube.com/playlist?list=z", dir).with_format(format)
    }

    /// `count` fetched entries named `Track 1..=count` with the given extension.
    pub fn fetched_entries(count: usize, extension: &str) -> Vec<MockEntry> {
        (1..=count)
            .map(|i| MockEntry::fetched(format!("Track {}", i), extension))
            .collect()
    }

    /// Default configuration with short grace periods.
    pub fn test_config() -> Config {
        let mut config = Config::default();
        config.jobs.cancel_grace_ms = 2000;
        config.jobs.terminate_grace_ms = 100;
        config.jobs.event_buffer = 1024;
        config
    }

    /// A controller wired to fresh mocks.
    pub fn mock_controller(
        config: &Config,
    ) -> (Arc<JobController>, Arc<MockExtractor>, Arc<MockConverter>) {
        let extractor = Arc::new(MockExtractor::new());
        let converter = Arc::new(MockConverter::new());
        let controller = Arc::new(JobController::new(
            config,
            extractor.clone(),
            converter.clone(),
        ));
        (controller, extractor, converter)
    }
}
