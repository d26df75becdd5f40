//! yt-dlp backed extractor.

use async_trait::async_trait;
use futures::StreamExt;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::config::ExtractorConfig;
use super::error::ExtractorError;
use super::traits::Extractor;
use super::types::{render_output_template, ExtractedItem, ExtractionRequest, PlaylistSession};
use crate::job::{ErrorHint, PlaylistItem};

/// Titles yt-dlp reports for entries it can list but not download.
const UNAVAILABLE_TITLES: &[&str] = &["[Private video]", "[Deleted video]", "[Unavailable video]"];

/// An entry from the flat metadata pass.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedEntry {
    item: PlaylistItem,
    available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedPlaylist {
    title: Option<String>,
    entries: Vec<ResolvedEntry>,
}

/// Extracts the most relevant error line from yt-dlp stderr.
pub(crate) fn error_reason(stderr: &str) -> Option<String> {
    let error_re = Regex::new(r"(?m)^ERROR:\s*(.+)$").ok()?;
    error_re
        .captures_iter(stderr)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .or_else(|| {
            stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
        })
}

/// Extractor driving the `yt-dlp` executable.
pub struct YtDlpExtractor {
    config: Arc<ExtractorConfig>,
}

impl YtDlpExtractor {
    /// Creates a new extractor with the given configuration.
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Creates an extractor with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ExtractorConfig::default())
    }

    /// Arguments shared by every invocation.
    fn common_args(config: &ExtractorConfig, request: &ExtractionRequest) -> Vec<String> {
        let mut args = vec![
            "--user-agent".to_string(),
            config.user_agent.clone(),
            "--no-warnings".to_string(),
        ];
        if let Some(ref cookies) = request.cookies {
            args.extend(["--cookies".to_string(), cookies.to_string_lossy().to_string()]);
        }
        args
    }

    /// Arguments for the flat metadata pass.
    fn build_resolve_args(&self, request: &ExtractionRequest) -> Vec<String> {
        let mut args = vec![
            "--flat-playlist".to_string(),
            "--dump-single-json".to_string(),
        ];
        if request.ignore_errors {
            args.push("--ignore-errors".to_string());
        }
        args.extend(Self::common_args(&self.config, request));
        args.push("--".to_string());
        args.push(request.url.clone());
        args
    }

    /// Arguments to download a single entry and print its final path.
    fn build_item_args(
        config: &ExtractorConfig,
        request: &ExtractionRequest,
        item: &PlaylistItem,
        total: Option<usize>,
    ) -> Vec<String> {
        let template = render_output_template(&request.output_template, item.index, total);
        let output = request.output_dir.join(template);

        let mut args = vec![
            "-f".to_string(),
            request.format_selector.clone(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
        ];
        args.extend(Self::common_args(config, request));
        args.push("--".to_string());
        args.push(item.source_url.clone());
        args
    }

    /// Parses `--dump-single-json` output of a flat playlist pass.
    fn parse_playlist(output: &str, request_url: &str) -> Result<ResolvedPlaylist, ExtractorError> {
        #[derive(Deserialize)]
        struct FlatPlaylist {
            title: Option<String>,
            webpage_url: Option<String>,
            entries: Option<Vec<Option<FlatEntry>>>,
        }

        #[derive(Deserialize)]
        struct FlatEntry {
            id: Option<String>,
            title: Option<String>,
            url: Option<String>,
            webpage_url: Option<String>,
        }

        let playlist: FlatPlaylist =
            serde_json::from_str(output.trim()).map_err(|e| ExtractorError::ParseError {
                reason: e.to_string(),
            })?;

        // A plain video URL comes back without entries
        let Some(entries) = playlist.entries else {
            let title = playlist.title.clone().unwrap_or_else(|| "Item 1".to_string());
            return Ok(ResolvedPlaylist {
                title: playlist.title,
                entries: vec![ResolvedEntry {
                    item: PlaylistItem {
                        index: 1,
                        title,
                        source_url: playlist
                            .webpage_url
                            .unwrap_or_else(|| request_url.to_string()),
                    },
                    available: true,
                }],
            });
        };

        let entries = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let index = (i + 1) as u32;
                match entry {
                    Some(entry) => {
                        let title = entry.title.unwrap_or_else(|| format!("Item {}", index));
                        let source_url = entry
                            .webpage_url
                            .or(entry.url)
                            .or(entry.id)
                            .unwrap_or_default();
                        let available = !source_url.is_empty()
                            && !UNAVAILABLE_TITLES.contains(&title.as_str());
                        ResolvedEntry {
                            item: PlaylistItem {
                                index,
                                title,
                                source_url,
                            },
                            available,
                        }
                    }
                    None => ResolvedEntry {
                        item: PlaylistItem {
                            index,
                            title: format!("Item {}", index),
                            source_url: String::new(),
                        },
                        available: false,
                    },
                }
            })
            .collect();

        Ok(ResolvedPlaylist {
            title: playlist.title,
            entries,
        })
    }

    /// Downloads one entry.
    async fn fetch_entry(
        config: Arc<ExtractorConfig>,
        request: Arc<ExtractionRequest>,
        entry: ResolvedEntry,
        total: Option<usize>,
    ) -> ExtractedItem {
        let item = entry.item;
        if !entry.available {
            debug!("Skipping unavailable entry {}: {}", item.index, item.title);
            return ExtractedItem::Unavailable { item, reason: None };
        }

        let args = Self::build_item_args(&config, &request, &item, total);
        debug!("Fetching item {} ({})", item.index, item.source_url);

        let output = timeout(
            Duration::from_secs(config.item_timeout_secs),
            Command::new(&config.ytdlp_path)
                .args(&args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match output {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ExtractedItem::Failed {
                    item,
                    reason: format!("failed to run yt-dlp: {}", e),
                }
            }
            Err(_) => {
                return ExtractedItem::Failed {
                    item,
                    reason: format!("timed out after {} seconds", config.item_timeout_secs),
                }
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            if let Some(path) = stdout.lines().rev().find(|l| !l.trim().is_empty()) {
                return ExtractedItem::Fetched {
                    item,
                    local_path: PathBuf::from(path.trim()),
                };
            }
            return ExtractedItem::Failed {
                item,
                reason: "yt-dlp did not report an output file".to_string(),
            };
        }

        let reason = error_reason(&stderr)
            .unwrap_or_else(|| format!("yt-dlp exited with code: {:?}", output.status.code()));

        match ErrorHint::classify(&reason) {
            Some(ErrorHint::Unavailable) | Some(ErrorHint::PrivateContent) => {
                ExtractedItem::Unavailable {
                    item,
                    reason: Some(reason),
                }
            }
            _ => ExtractedItem::Failed { item, reason },
        }
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn open(&self, request: &ExtractionRequest) -> Result<PlaylistSession, ExtractorError> {
        let args = self.build_resolve_args(request);
        info!("Resolving playlist {}", request.url);

        let output = timeout(
            Duration::from_secs(self.config.resolve_timeout_secs),
            Command::new(&self.config.ytdlp_path)
                .args(&args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ExtractorError::Timeout {
            timeout_secs: self.config.resolve_timeout_secs,
        })?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExtractorError::BinaryNotFound {
                    path: self.config.ytdlp_path.clone(),
                }
            } else {
                ExtractorError::Io(e)
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        // With --ignore-errors a non-zero exit can still carry usable JSON
        let playlist = match Self::parse_playlist(&stdout, &request.url) {
            Ok(playlist) => {
                if !output.status.success() {
                    warn!(
                        "yt-dlp reported errors while resolving {}: {}",
                        request.url,
                        error_reason(&stderr).unwrap_or_default()
                    );
                }
                playlist
            }
            Err(parse_err) => {
                if output.status.success() {
                    return Err(parse_err);
                }
                return Err(ExtractorError::fatal(
                    error_reason(&stderr).unwrap_or_else(|| {
                        format!("yt-dlp exited with code: {:?}", output.status.code())
                    }),
                ));
            }
        };

        let total = playlist.entries.len();
        info!(
            "Resolved playlist {:?} with {} entries",
            playlist.title, total
        );

        let config = Arc::clone(&self.config);
        let request = Arc::new(request.clone());
        let items = futures::stream::iter(playlist.entries)
            .then(move |entry| {
                Self::fetch_entry(Arc::clone(&config), Arc::clone(&request), entry, Some(total))
            })
            .boxed();

        Ok(PlaylistSession {
            title: playlist.title,
            total_items: Some(total),
            items,
        })
    }

    async fn validate(&self) -> Result<(), ExtractorError> {
        let result = Command::new(&self.config.ytdlp_path)
            .arg("--version")
            .output()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ExtractorError::BinaryNotFound {
                    path: self.config.ytdlp_path.clone(),
                })
            }
            Err(e) => Err(ExtractorError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::DEFAULT_USER_AGENT;

    fn request() -> ExtractionRequest {
        ExtractionRequest::new("https://soundcloud.com/x/sets/y", "/music")
    }

    #[test]
    fn test_resolve_args() {
        let extractor = YtDlpExtractor::with_defaults();
        let args = extractor.build_resolve_args(
            &request().with_cookies(Some(PathBuf::from("/tmp/cookies.txt"))),
        );

        assert!(args.contains(&"--flat-playlist".to_string()));
        assert!(args.contains(&"--ignore-errors".to_string()));
        assert!(args.contains(&DEFAULT_USER_AGENT.to_string()));
        let cookies_pos = args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(args[cookies_pos + 1], "/tmp/cookies.txt");
        assert_eq!(args.last().unwrap(), "https://soundcloud.com/x/sets/y");
    }

    #[test]
    fn test_item_args_use_rendered_template() {
        let config = ExtractorConfig::default();
        let item = PlaylistItem {
            index: 4,
            title: "Song".to_string(),
            source_url: "https://soundcloud.com/x/song".to_string(),
        };
        let args = YtDlpExtractor::build_item_args(
            &config,
            &request().with_format_selector("bestaudio[abr<=128]/bestaudio/best"),
            &item,
            Some(15),
        );

        let out_pos = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[out_pos + 1], "/music/04 - %(title)s.%(ext)s");
        assert_eq!(args[1], "bestaudio[abr<=128]/bestaudio/best");
        assert!(!args.contains(&"--cookies".to_string()));
        assert_eq!(args.last().unwrap(), "https://soundcloud.com/x/song");
    }

    #[test]
    fn test_parse_playlist_with_null_entries() {
        let json = r#"{
            "_type": "playlist",
            "title": "Late Night Mix",
            "entries": [
                {"id": "a", "title": "First", "url": "https://soundcloud.com/x/first"},
                null,
                {"id": "c", "title": "[Private video]", "url": "https://www.youtube.com/watch?v=c"}
            ]
        }"#;

        let playlist = YtDlpExtractor::parse_playlist(json, "https://example.com").unwrap();
        assert_eq!(playlist.title.as_deref(), Some("Late Night Mix"));
        assert_eq!(playlist.entries.len(), 3);
        assert!(playlist.entries[0].available);
        assert_eq!(playlist.entries[1].item.index, 2);
        assert!(!playlist.entries[1].available);
        assert!(!playlist.entries[2].available);
    }

    #[test]
    fn test_parse_single_video() {
        let json = r#"{"_type": "video", "title": "Solo", "webpage_url": "https://youtu.be/abc"}"#;
        let playlist = YtDlpExtractor::parse_playlist(json, "https://youtu.be/abc").unwrap();
        assert_eq!(playlist.entries.len(), 1);
        assert_eq!(playlist.entries[0].item.title, "Solo");
        assert_eq!(playlist.entries[0].item.source_url, "https://youtu.be/abc");
    }

    #[test]
    fn test_parse_garbage() {
        let err = YtDlpExtractor::parse_playlist("not json", "https://x").unwrap_err();
        assert!(matches!(err, ExtractorError::ParseError { .. }));
    }

    #[test]
    fn test_error_reason_takes_last_error_line() {
        let stderr = "WARNING: something\nERROR: [youtube] abc: Video unavailable\n";
        assert_eq!(
            error_reason(stderr).as_deref(),
            Some("[youtube] abc: Video unavailable")
        );

        let stderr = "some trailing noise\n\n";
        assert_eq!(
            error_reason(stderr).as_deref(),
            Some("some trailing noise")
        );
    }

    #[tokio::test]
    async fn test_unavailable_entry_skips_process() {
        let entry = ResolvedEntry {
            item: PlaylistItem {
                index: 2,
                title: "Item 2".to_string(),
                source_url: String::new(),
            },
            available: false,
        };
        let result = YtDlpExtractor::fetch_entry(
            Arc::new(ExtractorConfig::default()),
            Arc::new(request()),
            entry,
            Some(3),
        )
        .await;
        assert!(matches!(result, ExtractedItem::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_open_missing_binary() {
        let mut config = ExtractorConfig::default();
        config.ytdlp_path = PathBuf::from("/nonexistent/yt-dlp");
        let extractor = YtDlpExtractor::new(config);

        let err = extractor.open(&request()).await.unwrap_err();
        assert!(matches!(err, ExtractorError::BinaryNotFound { .. }));
    }
}
