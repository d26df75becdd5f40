//! Job controller.
//!
//! Process-wide single-flight guard. It owns the only `JobState`, applies the
//! runner's updates to it from a dedicated task, and fans progress events out
//! to subscribers through a bounded broadcast channel.

mod error;
mod job_controller;

pub use error::ControllerError;
pub use job_controller::{validate_request, JobController};
