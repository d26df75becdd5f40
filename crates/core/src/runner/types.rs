//! Types for the job runner.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::job::{FinalReport, ItemOutcome, JobStatus, ProgressEvent};

/// Message from a running job to the controller that owns its state.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    /// The job entered a new status.
    Transition(JobStatus),
    /// A new item outcome, in arrival order.
    Append(ItemOutcome),
    /// Replaces the outcome at `position` (arrival order) after conversion.
    Revise {
        position: usize,
        outcome: ItemOutcome,
    },
    /// Progress notification for subscribers.
    Progress(ProgressEvent),
    /// Sent by the controller when a cancel request arrives.
    CancelRequested,
    /// The job ended.
    Finished(FinalReport),
}

/// Sending half of a job's update channel.
pub type JobUpdates = mpsc::UnboundedSender<JobUpdate>;

/// Settings the runner takes from the global configuration.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// yt-dlp binary used for delegated video downloads.
    pub ytdlp_path: PathBuf,
    pub video_domains: Vec<String>,
    pub terminate_grace: Duration,
    pub preserve_originals: bool,
}

impl RunnerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ytdlp_path: config.extractor.ytdlp_path.clone(),
            video_domains: config.jobs.video_domains.clone(),
            terminate_grace: Duration::from_millis(config.jobs.terminate_grace_ms),
            preserve_originals: config.converter.preserve_originals,
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
