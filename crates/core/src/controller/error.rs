//! Error types for the job controller.

use thiserror::Error;

/// Errors returned by the caller-facing controller API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// Another job has not reached a terminal status yet.
    #[error("a job is already running: {job_id}")]
    AlreadyRunning { job_id: String },

    /// The id does not name the current job.
    #[error("job not found: {0}")]
    NotFound(String),

    /// The job already ended.
    #[error("job is not running: {0}")]
    NotRunning(String),

    /// The request failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
