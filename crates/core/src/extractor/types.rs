//! Types for the extractor module.

use futures::stream::BoxStream;
use std::path::{Path, PathBuf};

use crate::job::{ItemOutcome, PlaylistItem};

/// File naming template, in the engine's own syntax.
pub const OUTPUT_TEMPLATE: &str = "%(playlist_index)s - %(title)s.%(ext)s";

/// User-Agent sent to media sites.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Input for one extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub url: String,
    pub output_dir: PathBuf,
    /// File name template relative to `output_dir`.
    pub output_template: String,
    pub cookies: Option<PathBuf>,
    /// Continue past per-item failures instead of aborting the run.
    pub ignore_errors: bool,
    /// Engine format selector (e.g. `bestaudio/best`).
    pub format_selector: String,
}

impl ExtractionRequest {
    pub fn new(url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_dir: output_dir.into(),
            output_template: OUTPUT_TEMPLATE.to_string(),
            cookies: None,
            ignore_errors: true,
            format_selector: "bestaudio/best".to_string(),
        }
    }

    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_format_selector(mut self, selector: impl Into<String>) -> Self {
        self.format_selector = selector.into();
        self
    }
}

/// Substitutes the playlist index into a template, zero padded to the width
/// of the playlist size so files sort naturally.
pub fn render_output_template(template: &str, index: u32, total: Option<usize>) -> String {
    let width = total.map(|t| t.to_string().len()).unwrap_or(1);
    template.replace(
        "%(playlist_index)s",
        &format!("{:0width$}", index, width = width),
    )
}

/// Result for a single playlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedItem {
    /// The item was written to disk.
    Fetched {
        item: PlaylistItem,
        local_path: PathBuf,
    },
    /// The engine returned nothing usable for this entry (removed, private,
    /// region-locked).
    Unavailable {
        item: PlaylistItem,
        reason: Option<String>,
    },
    /// The download was attempted and failed.
    Failed { item: PlaylistItem, reason: String },
}

impl ExtractedItem {
    pub fn item(&self) -> &PlaylistItem {
        match self {
            Self::Fetched { item, .. }
            | Self::Unavailable { item, .. }
            | Self::Failed { item, .. } => item,
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Fetched { local_path, .. } => Some(local_path),
            _ => None,
        }
    }

    pub fn into_outcome(self) -> ItemOutcome {
        match self {
            Self::Fetched { item, local_path } => ItemOutcome::fetched(item, local_path),
            Self::Unavailable { item, reason } => ItemOutcome::unavailable(item, reason),
            Self::Failed { item, reason } => ItemOutcome::failed(item, reason),
        }
    }
}

/// An opened playlist: metadata plus a lazy stream of item results.
pub struct PlaylistSession {
    pub title: Option<String>,
    pub total_items: Option<usize>,
    pub items: BoxStream<'static, ExtractedItem>,
}

impl std::fmt::Debug for PlaylistSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistSession")
            .field("title", &self.title)
            .field("total_items", &self.total_items)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ItemStage;

    #[test]
    fn test_render_template_pads_to_total() {
        assert_eq!(
            render_output_template(OUTPUT_TEMPLATE, 3, Some(12)),
            "03 - %(title)s.%(ext)s"
        );
        assert_eq!(
            render_output_template(OUTPUT_TEMPLATE, 3, Some(9)),
            "3 - %(title)s.%(ext)s"
        );
        assert_eq!(
            render_output_template(OUTPUT_TEMPLATE, 7, None),
            "7 - %(title)s.%(ext)s"
        );
    }

    #[test]
    fn test_into_outcome() {
        let item = PlaylistItem {
            index: 2,
            title: "Song".to_string(),
            source_url: "https://soundcloud.com/a/song".to_string(),
        };
        let outcome = ExtractedItem::Unavailable {
            item: item.clone(),
            reason: Some("Video unavailable".to_string()),
        }
        .into_outcome();
        assert_eq!(outcome.stage, ItemStage::SkippedUnavailable);
        assert_eq!(outcome.error_detail.as_deref(), Some("Video unavailable"));

        let outcome = ExtractedItem::Fetched {
            item,
            local_path: PathBuf::from("/out/2 - Song.opus"),
        }
        .into_outcome();
        assert_eq!(outcome.stage, ItemStage::Fetched);
        assert!(outcome.local_path.is_some());
    }
}
