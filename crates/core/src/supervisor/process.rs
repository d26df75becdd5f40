//! Single-slot process supervisor.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::types::{ExitReport, ProcessCommand, SupervisorError, STDERR_TAIL_LINES};

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// How long to wait for the exit status after a forced kill.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// How long to keep draining stderr once the process has exited.
const STDERR_DRAIN: Duration = Duration::from_secs(1);

/// A process started by [`ProcessSupervisor::spawn`].
#[derive(Debug)]
pub struct ProcessHandle {
    id: u64,
    pid: Option<u32>,
    exit_tx: watch::Sender<Option<ExitReport>>,
    kill: Notify,
    terminate_requested: AtomicBool,
}

impl ProcessHandle {
    /// Whether the exit status has been collected.
    pub fn is_finished(&self) -> bool {
        self.exit_tx.borrow().is_some()
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate_requested.load(Ordering::SeqCst)
    }

    /// Waits for the process to exit.
    pub async fn wait(&self) -> ExitReport {
        let mut rx = self.exit_tx.subscribe();
        let report = match rx.wait_for(Option::is_some).await {
            Ok(seen) => seen.clone(),
            Err(_) => None,
        };
        report.unwrap_or_else(|| ExitReport::lost(self.terminate_requested()))
    }
}

/// Runs at most one external process at a time and can stop it on request.
pub struct ProcessSupervisor {
    active: Arc<Mutex<Option<Arc<ProcessHandle>>>>,
    next_id: AtomicU64,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Spawns a command in its own process group.
    pub async fn spawn(
        &self,
        command: ProcessCommand,
    ) -> Result<Arc<ProcessHandle>, SupervisorError> {
        let mut active = self.active.lock().await;
        if let Some(ref handle) = *active {
            if !handle.is_finished() {
                return Err(SupervisorError::AlreadyRunning { pid: handle.pid });
            }
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own group so termination reaches helpers the tool spawns (ffmpeg muxing)
        #[cfg(unix)]
        cmd.process_group(0);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SupervisorError::NotFound {
                    program: command.program.clone(),
                }
            } else {
                SupervisorError::Spawn {
                    program: command.program.clone(),
                    source: e,
                }
            }
        })?;

        let (exit_tx, _) = watch::channel(None);
        let handle = Arc::new(ProcessHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            pid: child.id(),
            exit_tx,
            kill: Notify::new(),
            terminate_requested: AtomicBool::new(false),
        });

        info!("Spawned supervised process {:?}: {}", handle.pid, command);
        *active = Some(Arc::clone(&handle));

        tokio::spawn(Self::watch_process(
            child,
            Arc::clone(&handle),
            Arc::clone(&self.active),
        ));

        Ok(handle)
    }

    /// Owns the child until it exits, then publishes the exit report.
    async fn watch_process(
        mut child: Child,
        handle: Arc<ProcessHandle>,
        active: Arc<Mutex<Option<Arc<ProcessHandle>>>>,
    ) {
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[supervised] {}", line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail
            })
        });

        let status = tokio::select! {
            status = child.wait() => status,
            _ = handle.kill.notified() => {
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill supervised process {:?}: {}", handle.pid, e);
                }
                child.wait().await
            }
        };

        let stderr_tail = match stderr_task {
            Some(task) => match timeout(STDERR_DRAIN, task).await {
                Ok(Ok(tail)) => tail.into_iter().collect::<Vec<_>>().join("\n"),
                _ => String::new(),
            },
            None => String::new(),
        };

        let report = match status {
            Ok(status) => ExitReport {
                code: status.code(),
                success: status.success(),
                stderr_tail,
                terminated: handle.terminate_requested(),
            },
            Err(e) => {
                warn!("Failed to collect exit status of {:?}: {}", handle.pid, e);
                ExitReport {
                    stderr_tail,
                    ..ExitReport::lost(handle.terminate_requested())
                }
            }
        };

        debug!(
            "Supervised process {:?} exited with {:?}",
            handle.pid, report.code
        );
        {
            let mut active = active.lock().await;
            if active.as_ref().is_some_and(|h| h.id == handle.id) {
                *active = None;
            }
        }

        // The slot is free by the time waiters see the exit
        handle.exit_tx.send_replace(Some(report));
    }

    /// Waits for a supervised process to exit.
    pub async fn wait(&self, handle: &ProcessHandle) -> ExitReport {
        handle.wait().await
    }

    /// Stops a supervised process: graceful signal first, then a forced kill
    /// once `grace` has elapsed. Safe to call repeatedly.
    pub async fn terminate(&self, handle: &ProcessHandle, grace: Duration) {
        if handle.is_finished() {
            return;
        }
        handle.terminate_requested.store(true, Ordering::SeqCst);
        info!("Terminating supervised process {:?}", handle.pid);

        #[cfg(unix)]
        {
            signal_group(handle.pid, nix::sys::signal::Signal::SIGTERM);
            if timeout(grace, handle.wait()).await.is_ok() {
                return;
            }
            warn!(
                "Process {:?} still running after {:?}, killing",
                handle.pid, grace
            );
            signal_group(handle.pid, nix::sys::signal::Signal::SIGKILL);
        }
        // Elsewhere only the direct child is killed, without a graceful step
        #[cfg(not(unix))]
        let _ = grace;

        handle.kill.notify_one();
        if timeout(KILL_WAIT, handle.wait()).await.is_err() {
            warn!("Process {:?} did not report exit after kill", handle.pid);
        }
    }

    /// Terminates whichever process is currently live, if any.
    pub async fn terminate_active(&self, grace: Duration) {
        let handle = self.active.lock().await.clone();
        if let Some(handle) = handle {
            self.terminate(&handle, grace).await;
        }
    }

    /// The live handle, if a process is running.
    pub async fn active(&self) -> Option<Arc<ProcessHandle>> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|h| !h.is_finished())
            .cloned()
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    match nix::sys::signal::killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => {}
        // Group already gone
        Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {} to process group {}: {}", signal, pid, e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> ProcessCommand {
        ProcessCommand::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_wait_reports_exit_code_and_stderr() {
        let supervisor = ProcessSupervisor::new();
        let handle = supervisor
            .spawn(sh("echo first >&2; echo boom >&2; exit 3"))
            .await
            .unwrap();

        let report = supervisor.wait(&handle).await;
        assert_eq!(report.code, Some(3));
        assert!(!report.success);
        assert!(!report.terminated);
        assert!(report.stderr_tail.ends_with("boom"));
    }

    #[tokio::test]
    async fn test_single_slot() {
        let supervisor = ProcessSupervisor::new();
        let handle = supervisor.spawn(sh("sleep 30")).await.unwrap();

        let err = supervisor.spawn(sh("true")).await.unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyRunning { .. }));

        supervisor
            .terminate(&handle, Duration::from_millis(500))
            .await;
        assert!(handle.is_finished());

        let second = supervisor.spawn(sh("exit 0")).await.unwrap();
        assert!(supervisor.wait(&second).await.success);
    }

    #[tokio::test]
    async fn test_terminate_graceful() {
        let supervisor = ProcessSupervisor::new();
        let handle = supervisor.spawn(sh("sleep 30")).await.unwrap();

        let started = Instant::now();
        supervisor.terminate(&handle, Duration::from_secs(2)).await;
        let report = handle.wait().await;

        assert!(report.terminated);
        assert!(!report.success);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(supervisor.active().await.is_none());
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let supervisor = ProcessSupervisor::new();
        let handle = supervisor
            .spawn(sh("trap '' TERM; sleep 30"))
            .await
            .unwrap();
        // Give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        supervisor
            .terminate(&handle, Duration::from_millis(300))
            .await;

        assert!(handle.is_finished());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(handle.wait().await.terminated);
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let supervisor = ProcessSupervisor::new();
        let handle = supervisor.spawn(sh("sleep 30")).await.unwrap();

        supervisor.terminate(&handle, Duration::from_secs(1)).await;
        supervisor.terminate(&handle, Duration::from_secs(1)).await;
        supervisor.terminate_active(Duration::from_secs(1)).await;

        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let supervisor = ProcessSupervisor::new();
        let err = supervisor
            .spawn(ProcessCommand::new("/nonexistent/yt-dlp"))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound { .. }));
        assert!(supervisor.active().await.is_none());
    }
}
