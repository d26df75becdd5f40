//! Job data model.
//!
//! A job downloads one playlist. Its state is owned by the controller and
//! exposed to callers as `JobState` snapshots, `ProgressEvent`s while it runs,
//! and a `FinalReport` once it ends.

mod types;

pub use types::{
    DownloadRequest, ErrorHint, FinalReport, ItemOutcome, ItemStage, JobError, JobState,
    JobStatus, PlaylistItem, ProgressEvent, Quality, TargetFormat,
};
