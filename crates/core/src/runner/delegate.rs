//! Delegated MP4 downloads for video platforms.
//!
//! On video sites a single yt-dlp process downloads and muxes the whole
//! playlist. The runner only supervises it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use url::Url;

use crate::extractor::OUTPUT_TEMPLATE;
use crate::job::{DownloadRequest, Quality};
use crate::supervisor::ProcessCommand;

/// Best MP4 video plus M4A audio, falling back to a progressive MP4.
pub const VIDEO_FORMAT_SELECTOR: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/mp4";

/// Whether the URL host is one of `domains` or a subdomain of one.
pub fn is_video_platform(url: &str, domains: &[String]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();

    domains.iter().any(|domain| {
        let domain = domain.trim().to_ascii_lowercase();
        !domain.is_empty()
            && (host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })
}

/// Format selector honoring the quality preset's height cap.
pub fn video_format_selector(quality: Quality) -> String {
    match quality.max_video_height() {
        None => VIDEO_FORMAT_SELECTOR.to_string(),
        Some(height) => format!(
            "bestvideo[ext=mp4][height<={h}]+bestaudio[ext=m4a]/mp4[height<={h}]/mp4",
            h = height
        ),
    }
}

/// Builds the yt-dlp command for a delegated download.
pub fn build_command(
    ytdlp_path: &Path,
    request: &DownloadRequest,
    cookies: Option<&Path>,
) -> ProcessCommand {
    let output = request.output_directory.join(OUTPUT_TEMPLATE);

    let mut command = ProcessCommand::new(ytdlp_path)
        .arg("-f")
        .arg(video_format_selector(request.quality))
        .args(["--merge-output-format", "mp4"])
        .arg("--output")
        .arg(output.to_string_lossy());

    if let Some(cookies) = cookies {
        command = command.arg("--cookies").arg(cookies.to_string_lossy());
    }

    command.arg(request.playlist_url.clone())
}

/// MP4 files currently in `dir`.
pub async fn list_mp4_files(dir: &Path) -> HashSet<PathBuf> {
    let mut files = HashSet::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return files;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_mp4 = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
        if is_mp4 {
            files.insert(path);
        }
    }
    files
}
