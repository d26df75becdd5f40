//! Extraction engine adapter.
//!
//! The engine turns a playlist URL into local files, one item at a time.
//! `YtDlpExtractor` drives the `yt-dlp` executable: a flat metadata pass lists
//! the entries, then each entry is downloaded on demand as the session stream
//! is polled.

mod config;
mod error;
mod traits;
mod types;
mod ytdlp;

pub use config::ExtractorConfig;
pub use error::ExtractorError;
pub use traits::Extractor;
pub use types::{
    render_output_template, ExtractedItem, ExtractionRequest, PlaylistSession, DEFAULT_USER_AGENT,
    OUTPUT_TEMPLATE,
};
pub use ytdlp::YtDlpExtractor;
pub(crate) use ytdlp::error_reason;
