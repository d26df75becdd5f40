//! Configuration for the extractor module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::types::DEFAULT_USER_AGENT;

/// Configuration for the yt-dlp backed extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Path to the yt-dlp binary. Also used for delegated MP4 downloads.
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: PathBuf,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for resolving playlist metadata in seconds.
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_secs: u64,

    /// Timeout for fetching a single item in seconds.
    #[serde(default = "default_item_timeout")]
    pub item_timeout_secs: u64,
}

fn default_ytdlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_resolve_timeout() -> u64 {
    300 // 5 minutes
}

fn default_item_timeout() -> u64 {
    1800 // 30 minutes
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: default_ytdlp_path(),
            user_agent: default_user_agent(),
            resolve_timeout_secs: default_resolve_timeout(),
            item_timeout_secs: default_item_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExtractorConfig::default();
        assert_eq!(config.ytdlp_path, PathBuf::from("yt-dlp"));
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
        assert_eq!(config.resolve_timeout_secs, 300);
    }

    #[test]
    fn test_deserialize_override() {
        let toml = r#"
            ytdlp_path = "/opt/yt-dlp"
            item_timeout_secs = 60
        "#;
        let config: ExtractorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.ytdlp_path, PathBuf::from("/opt/yt-dlp"));
        assert_eq!(config.item_timeout_secs, 60);
        assert_eq!(config.resolve_timeout_secs, 300);
    }
}
