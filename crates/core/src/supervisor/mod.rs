//! Process supervisor.
//!
//! Runs a single external process at a time in its own process group,
//! captures the tail of its stderr, and stops it on request with a graceful
//! signal followed by a forced kill.

mod process;
mod types;

pub use process::{ProcessHandle, ProcessSupervisor};
pub use types::{ExitReport, ProcessCommand, SupervisorError, STDERR_TAIL_LINES};
