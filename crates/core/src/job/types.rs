//! Types shared by the runner, the controller and the HTTP driver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output format requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    /// Keep whatever container the extraction engine produced.
    #[default]
    AsIs,
    /// Transcode every fetched item to MP3.
    Mp3,
    /// Video download muxed into MP4 (delegated to the external tool on video sites).
    Mp4,
}

/// Quality preset for source selection and transcoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    #[default]
    Best,
    Good,
    Normal,
}

impl Quality {
    /// Format selector handed to the extraction engine for audio fetches.
    pub fn audio_selector(&self) -> &'static str {
        match self {
            Quality::Best => "bestaudio/best",
            Quality::Good => "bestaudio[abr<=192]/bestaudio/best",
            Quality::Normal => "bestaudio[abr<=128]/bestaudio/best",
        }
    }

    /// Bitrate used when transcoding to MP3.
    pub fn mp3_bitrate_kbps(&self) -> u32 {
        match self {
            Quality::Best => 320,
            Quality::Good => 192,
            Quality::Normal => 128,
        }
    }

    /// Video height cap for the delegated MP4 download.
    pub fn max_video_height(&self) -> Option<u32> {
        match self {
            Quality::Best => None,
            Quality::Good => Some(1080),
            Quality::Normal => Some(720),
        }
    }
}

/// A playlist download submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub playlist_url: String,
    pub output_directory: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies_file: Option<PathBuf>,
    #[serde(default)]
    pub target_format: TargetFormat,
    #[serde(default)]
    pub quality: Quality,
}

impl DownloadRequest {
    pub fn new(playlist_url: impl Into<String>, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            playlist_url: playlist_url.into(),
            output_directory: output_directory.into(),
            cookies_file: None,
            target_format: TargetFormat::AsIs,
            quality: Quality::Best,
        }
    }

    pub fn with_format(mut self, target_format: TargetFormat) -> Self {
        self.target_format = target_format;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_cookies(mut self, cookies_file: impl Into<PathBuf>) -> Self {
        self.cookies_file = Some(cookies_file.into());
        self
    }
}

/// One entry of a playlist as reported by the extraction engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// 1-based position in the playlist.
    pub index: u32,
    pub title: String,
    pub source_url: String,
}

/// Terminal classification of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStage {
    Fetched,
    Converted,
    SkippedUnavailable,
    Failed,
}

impl ItemStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStage::Fetched => "fetched",
            ItemStage::Converted => "converted",
            ItemStage::SkippedUnavailable => "skipped_unavailable",
            ItemStage::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemStage::Fetched | ItemStage::Converted)
    }
}

/// What happened to a single playlist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item: PlaylistItem,
    pub stage: ItemStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ItemOutcome {
    pub fn fetched(item: PlaylistItem, local_path: PathBuf) -> Self {
        Self {
            item,
            stage: ItemStage::Fetched,
            local_path: Some(local_path),
            error_detail: None,
        }
    }

    pub fn unavailable(item: PlaylistItem, reason: Option<String>) -> Self {
        Self {
            item,
            stage: ItemStage::SkippedUnavailable,
            local_path: None,
            error_detail: reason,
        }
    }

    pub fn failed(item: PlaylistItem, reason: impl Into<String>) -> Self {
        Self {
            item,
            stage: ItemStage::Failed,
            local_path: None,
            error_detail: Some(reason.into()),
        }
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Preparing,
    Fetching,
    Converting,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Preparing => "preparing",
            JobStatus::Fetching => "fetching",
            JobStatus::Converting => "converting",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the live (or most recent) job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub id: String,
    pub request: DownloadRequest,
    pub status: JobStatus,
    pub outcomes: Vec<ItemOutcome>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<FinalReport>,
}

impl JobState {
    pub fn new(id: impl Into<String>, request: DownloadRequest) -> Self {
        Self {
            id: id.into(),
            request,
            status: JobStatus::Idle,
            outcomes: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            report: None,
        }
    }
}

/// Progress notification pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
}

impl ProgressEvent {
    pub fn new(job_id: impl Into<String>, status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            message: message.into(),
            current_index: None,
            total_count: None,
        }
    }

    pub fn with_counts(mut self, current: usize, total: Option<usize>) -> Self {
        self.current_index = Some(current);
        self.total_count = total;
        self
    }
}

/// Advice attached to a job-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHint {
    FormatUnavailable,
    PrivateContent,
    Unavailable,
}

impl ErrorHint {
    /// Classifies an engine error message.
    pub fn classify(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        if lower.contains("requested format is not available") {
            Some(ErrorHint::FormatUnavailable)
        } else if lower.contains("private video")
            || lower.contains("sign in")
            || lower.contains("login required")
        {
            Some(ErrorHint::PrivateContent)
        } else if lower.contains("video unavailable") {
            Some(ErrorHint::Unavailable)
        } else {
            None
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorHint::FormatUnavailable => {
                "Try selecting 'Original Format' instead of MP4, or check if the videos support the requested quality."
            }
            ErrorHint::PrivateContent => {
                "Some videos in the playlist might be private. Try using a cookies file if you have access."
            }
            ErrorHint::Unavailable => {
                "Some videos might be region-locked or removed. The downloader will skip these."
            }
        }
    }
}

/// A job-level error surfaced once in the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<ErrorHint>,
}

impl JobError {
    /// Builds an error and classifies its hint from the message text.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        let hint = ErrorHint::classify(&message);
        Self { message, hint }
    }
}

/// Result of a finished job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_title: Option<String>,
    pub total_items: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    /// Sorted by playlist index.
    pub outcomes: Vec<ItemOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl FinalReport {
    /// Builds a report from outcomes in arrival order.
    pub fn from_outcomes(
        job_id: impl Into<String>,
        status: JobStatus,
        playlist_title: Option<String>,
        total_items: Option<usize>,
        mut outcomes: Vec<ItemOutcome>,
        error: Option<JobError>,
    ) -> Self {
        outcomes.sort_by_key(|o| o.item.index);

        let success_count = outcomes.iter().filter(|o| o.stage.is_success()).count();
        let failure_count = outcomes
            .iter()
            .filter(|o| o.stage == ItemStage::Failed)
            .count();
        let skipped_count = outcomes
            .iter()
            .filter(|o| o.stage == ItemStage::SkippedUnavailable)
            .count();

        Self {
            job_id: job_id.into(),
            status,
            playlist_title,
            total_items: total_items.unwrap_or(outcomes.len()).max(outcomes.len()),
            success_count,
            failure_count,
            skipped_count,
            outcomes,
            error,
        }
    }

    /// Builds a report for a failure that happened before any item was processed.
    pub fn failed(job_id: impl Into<String>, error: JobError) -> Self {
        Self::from_outcomes(job_id, JobStatus::Failed, None, None, Vec::new(), Some(error))
    }

    /// Human readable summary shown once the job ends.
    pub fn summary(&self) -> String {
        if self.status == JobStatus::Cancelled && self.outcomes.is_empty() {
            return "cancelled, 0 items processed".to_string();
        }

        let title = self.playlist_title.as_deref().unwrap_or("playlist");
        let mut summary = match self.status {
            JobStatus::Cancelled => format!(
                "'{}' cancelled: {} of {} items processed ({} succeeded, {} failed, {} skipped)",
                title,
                self.outcomes.len(),
                self.total_items,
                self.success_count,
                self.failure_count,
                self.skipped_count
            ),
            JobStatus::Failed => format!("'{}' failed", title),
            _ => format!(
                "'{}' finished: {} items, {} succeeded, {} failed, {} skipped",
                title, self.total_items, self.success_count, self.failure_count, self.skipped_count
            ),
        };

        if let Some(ref error) = self.error {
            summary.push_str(&format!("\n{}", error.message));
            if let Some(hint) = error.hint {
                summary.push_str(&format!("\n\nTip: {}", hint.message()));
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: u32) -> PlaylistItem {
        PlaylistItem {
            index,
            title: format!("Track {}", index),
            source_url: format!("https://example.com/{}", index),
        }
    }

    #[test]
    fn test_report_counts_and_sorting() {
        let outcomes = vec![
            ItemOutcome::fetched(item(3), PathBuf::from("/out/3 - Track 3.m4a")),
            ItemOutcome::failed(item(1), "HTTP Error 403"),
            ItemOutcome::unavailable(item(2), None),
        ];

        let report =
            FinalReport::from_outcomes("job", JobStatus::Completed, None, Some(3), outcomes, None);

        assert_eq!(report.total_items, 3);
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failure_count, 1);
        assert_eq!(report.skipped_count, 1);
        let indices: Vec<u32> = report.outcomes.iter().map(|o| o.item.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_total_never_below_outcomes() {
        let outcomes = vec![
            ItemOutcome::fetched(item(1), PathBuf::from("/a")),
            ItemOutcome::fetched(item(2), PathBuf::from("/b")),
        ];
        let report =
            FinalReport::from_outcomes("job", JobStatus::Completed, None, Some(1), outcomes, None);
        assert_eq!(report.total_items, 2);
    }

    #[test]
    fn test_hint_classification() {
        assert_eq!(
            ErrorHint::classify("ERROR: Requested format is not available"),
            Some(ErrorHint::FormatUnavailable)
        );
        assert_eq!(
            ErrorHint::classify("ERROR: [youtube] abc: Private video. Sign in"),
            Some(ErrorHint::PrivateContent)
        );
        assert_eq!(
            ErrorHint::classify("ERROR: [youtube] abc: Video unavailable"),
            Some(ErrorHint::Unavailable)
        );
        assert_eq!(ErrorHint::classify("connection reset"), None);
    }

    #[test]
    fn test_summary_cancelled_empty() {
        let report = FinalReport::from_outcomes(
            "job",
            JobStatus::Cancelled,
            Some("Mix".to_string()),
            Some(10),
            Vec::new(),
            None,
        );
        assert_eq!(report.summary(), "cancelled, 0 items processed");
    }

    #[test]
    fn test_summary_includes_hint() {
        let report = FinalReport::failed("job", JobError::classified("ERROR: Private video"));
        let summary = report.summary();
        assert!(summary.contains("failed"));
        assert!(summary.contains("Tip: Some videos in the playlist might be private"));
    }

    #[test]
    fn test_request_deserialize_defaults() {
        let json = r#"{"playlist_url": "https://soundcloud.com/x/sets/y", "output_directory": "/music"}"#;
        let request: DownloadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.target_format, TargetFormat::AsIs);
        assert_eq!(request.quality, Quality::Best);
        assert!(request.cookies_file.is_none());
    }

    #[test]
    fn test_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Cancelling.is_terminal());
        assert!(!JobStatus::Idle.is_terminal());
    }
}
