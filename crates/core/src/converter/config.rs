//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[converter]` section: how fetched items are transcoded to MP3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub ffmpeg_path: PathBuf,

    /// Upper bound for one item's transcode.
    pub timeout_secs: u64,

    /// Keep the fetched source next to the MP3 instead of deleting it.
    pub preserve_originals: bool,

    /// Passed to `-loglevel`. Whatever ffmpeg prints at this level ends up in
    /// the failed item's detail.
    pub ffmpeg_log_level: String,

    /// Inserted right before the output path.
    pub extra_ffmpeg_args: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            timeout_secs: 600,
            preserve_originals: false,
            ffmpeg_log_level: "error".to_string(),
            extra_ffmpeg_args: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: ConverterConfig = toml::from_str(
            r#"
            preserve_originals = true
            extra_ffmpeg_args = ["-threads", "2"]
        "#,
        )
        .unwrap();

        assert!(config.preserve_originals);
        assert_eq!(config.extra_ffmpeg_args, vec!["-threads", "2"]);
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.timeout_secs, 600);
        assert_eq!(config.ffmpeg_log_level, "error");
    }
}
