//! Job runner.
//!
//! The runner is the pipeline state machine for a single job:
//! `Idle -> Preparing -> Fetching -> (Converting)? -> Completed | Failed | Cancelled`,
//! with `Cancelling` as a transient state while in-flight work drains.

mod delegate;
mod job_runner;
mod types;

pub use delegate::{
    build_command, is_video_platform, list_mp4_files, video_format_selector,
    VIDEO_FORMAT_SELECTOR,
};
pub use job_runner::JobRunner;
pub use types::{JobUpdate, JobUpdates, RunnerSettings};
