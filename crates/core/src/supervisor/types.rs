//! Types for the process supervisor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Number of stderr lines kept for error reporting.
pub const STDERR_TAIL_LINES: usize = 40;

/// An external command to run under supervision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl std::fmt::Display for ProcessCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitReport {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
    /// Last lines written to stderr.
    pub stderr_tail: String,
    /// Whether the process ended after a terminate request.
    pub terminated: bool,
}

impl ExitReport {
    /// Report used when the exit status could not be observed.
    pub(crate) fn lost(terminated: bool) -> Self {
        Self {
            code: None,
            success: false,
            stderr_tail: String::new(),
            terminated,
        }
    }
}

/// Errors from the process supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A supervised process is still running.
    #[error("a supervised process is already running (pid {pid:?})")]
    AlreadyRunning { pid: Option<u32> },

    /// The program could not be found.
    #[error("program not found: {program}")]
    NotFound { program: PathBuf },

    /// Spawning the process failed.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
