//! Single-flight job controller.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{Config, JobsConfig};
use crate::converter::Converter;
use crate::extractor::Extractor;
use crate::job::{DownloadRequest, FinalReport, JobError, JobState, JobStatus, ProgressEvent};
use crate::runner::{JobRunner, JobUpdate, JobUpdates, RunnerSettings};
use crate::supervisor::ProcessSupervisor;

use super::error::ControllerError;

/// Handles for the job started last.
struct ActiveJob {
    id: String,
    cancel: CancellationToken,
    updates: JobUpdates,
    status: watch::Receiver<JobStatus>,
    task: JoinHandle<()>,
}

impl ActiveJob {
    fn is_running(&self) -> bool {
        !self.status.borrow().is_terminal()
    }
}

/// Starts, cancels and reports on download jobs, one at a time.
pub struct JobController {
    runner: Arc<JobRunner>,
    state: Arc<RwLock<Option<JobState>>>,
    active: Mutex<Option<ActiveJob>>,
    events: broadcast::Sender<ProgressEvent>,
    cancel_grace: Duration,
    terminate_grace: Duration,
}

impl JobController {
    /// Creates a controller with its own process supervisor.
    pub fn new(
        config: &Config,
        extractor: Arc<dyn Extractor>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        let runner = JobRunner::new(
            extractor,
            converter,
            Arc::new(ProcessSupervisor::new()),
            RunnerSettings::from_config(config),
        );
        Self::with_runner(runner, &config.jobs)
    }

    pub fn with_runner(runner: JobRunner, jobs: &JobsConfig) -> Self {
        let (events, _) = broadcast::channel(jobs.event_buffer.max(1));
        Self {
            runner: Arc::new(runner),
            state: Arc::new(RwLock::new(None)),
            active: Mutex::new(None),
            events,
            cancel_grace: Duration::from_millis(jobs.cancel_grace_ms),
            terminate_grace: Duration::from_millis(jobs.terminate_grace_ms),
        }
    }

    /// Starts a job and returns its id without waiting for it.
    pub async fn start(&self, request: DownloadRequest) -> Result<String, ControllerError> {
        validate_request(&request)?;

        let mut active = self.active.lock().await;
        if let Some(job) = active.as_ref().filter(|job| job.is_running()) {
            return Err(ControllerError::AlreadyRunning {
                job_id: job.id.clone(),
            });
        }

        let job_id = Uuid::new_v4().to_string();
        *self.state.write().await = Some(JobState::new(job_id.clone(), request.clone()));

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(JobStatus::Idle);
        let cancel = CancellationToken::new();

        tokio::spawn(apply_updates(
            job_id.clone(),
            updates_rx,
            Arc::clone(&self.state),
            self.events.clone(),
            status_tx,
        ));

        let task = tokio::spawn(run_job(
            Arc::clone(&self.runner),
            job_id.clone(),
            request,
            cancel.clone(),
            updates_tx.clone(),
        ));

        info!("Started job {}", job_id);
        *active = Some(ActiveJob {
            id: job_id.clone(),
            cancel,
            updates: updates_tx,
            status: status_rx,
            task,
        });

        Ok(job_id)
    }

    /// Requests cancellation and waits a bounded time for the job to stop.
    /// Repeated calls while the job is stopping are no-ops.
    pub async fn cancel(&self, job_id: &str) -> Result<(), ControllerError> {
        let (cancel, updates, mut status) = {
            let active = self.active.lock().await;
            let job = active
                .as_ref()
                .filter(|job| job.id == job_id)
                .ok_or_else(|| ControllerError::NotFound(job_id.to_string()))?;
            if !job.is_running() {
                return Err(ControllerError::NotRunning(job_id.to_string()));
            }
            (job.cancel.clone(), job.updates.clone(), job.status.clone())
        };

        if !cancel.is_cancelled() {
            info!("Cancelling job {}", job_id);
            let _ = updates.send(JobUpdate::CancelRequested);
            cancel.cancel();
        }

        let stopped = timeout(self.cancel_grace, async {
            self.runner
                .supervisor()
                .terminate_active(self.terminate_grace)
                .await;
            let _ = status.wait_for(|s| s.is_terminal()).await;
        })
        .await;

        if stopped.is_err() {
            warn!(
                "Job {} did not stop within {:?}, still cancelling",
                job_id, self.cancel_grace
            );
        }

        Ok(())
    }

    /// Snapshot of the job with the given id.
    pub async fn status(&self, job_id: &str) -> Result<JobState, ControllerError> {
        self.state
            .read()
            .await
            .as_ref()
            .filter(|state| state.id == job_id)
            .cloned()
            .ok_or_else(|| ControllerError::NotFound(job_id.to_string()))
    }

    /// Snapshot of the latest job, if any was started.
    pub async fn current(&self) -> Option<JobState> {
        self.state.read().await.clone()
    }

    /// Whether a job is currently running.
    pub async fn is_busy(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|job| job.is_running())
    }

    /// Progress events of the running job, from now on. The stream ends after
    /// the event carrying a terminal status, or immediately when no job runs.
    pub async fn subscribe(&self) -> BoxStream<'static, ProgressEvent> {
        // Subscribe before checking the status so the terminal event cannot slip
        // between the two
        let rx = self.events.subscribe();

        let job_id = {
            let active = self.active.lock().await;
            match active.as_ref().filter(|job| job.is_running()) {
                Some(job) => job.id.clone(),
                None => return futures::stream::empty().boxed(),
            }
        };

        futures::stream::unfold(Some(rx), move |rx| {
            let job_id = job_id.clone();
            async move {
                let mut rx = rx?;
                loop {
                    match rx.recv().await {
                        Ok(event) if event.job_id == job_id => {
                            let next = if event.status.is_terminal() {
                                None
                            } else {
                                Some(rx)
                            };
                            return Some((event, next));
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(missed)) => {
                            debug!("Subscriber lagged, {} events dropped", missed);
                            continue;
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        })
        .boxed()
    }

    /// Raw event feed across all jobs.
    pub fn events(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Cancels the running job and stops any supervised process.
    pub async fn shutdown(&self) {
        let active = self.active.lock().await.take();

        if let Some(ref job) = active {
            if job.is_running() {
                info!("Shutting down: cancelling job {}", job.id);
                let _ = job.updates.send(JobUpdate::CancelRequested);
                job.cancel.cancel();
            }
        }

        self.runner
            .supervisor()
            .terminate_active(self.terminate_grace)
            .await;

        if let Some(job) = active {
            if timeout(self.cancel_grace, job.task).await.is_err() {
                warn!("Job {} did not finish before shutdown", job.id);
            }
        }
    }
}

/// Checks a request before a job is created for it.
pub fn validate_request(request: &DownloadRequest) -> Result<(), ControllerError> {
    let url = request.playlist_url.trim();
    if url.is_empty() {
        return Err(ControllerError::InvalidRequest(
            "playlist_url cannot be empty".to_string(),
        ));
    }

    let parsed = Url::parse(url)
        .map_err(|e| ControllerError::InvalidRequest(format!("invalid playlist_url: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ControllerError::InvalidRequest(format!(
            "unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }

    if request.output_directory.as_os_str().is_empty() {
        return Err(ControllerError::InvalidRequest(
            "output_directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Runs the job and reports a failure if the runner task dies.
async fn run_job(
    runner: Arc<JobRunner>,
    job_id: String,
    request: DownloadRequest,
    cancel: CancellationToken,
    updates: JobUpdates,
) {
    let run = {
        let job_id = job_id.clone();
        let updates = updates.clone();
        tokio::spawn(async move { runner.run(&job_id, request, cancel, updates).await })
    };

    if let Err(e) = run.await {
        error!("Runner for job {} stopped unexpectedly: {}", job_id, e);
        let report = FinalReport::failed(
            job_id,
            JobError::classified(format!("Job stopped unexpectedly: {}", e)),
        );
        let _ = updates.send(JobUpdate::Finished(report));
    }
}

/// Single writer of the job state. Ends with the job.
async fn apply_updates(
    job_id: String,
    mut updates: mpsc::UnboundedReceiver<JobUpdate>,
    state: Arc<RwLock<Option<JobState>>>,
    events: broadcast::Sender<ProgressEvent>,
    status: watch::Sender<JobStatus>,
) {
    while let Some(update) = updates.recv().await {
        let mut guard = state.write().await;
        let Some(job) = guard.as_mut().filter(|job| job.id == job_id) else {
            break;
        };
        if job.status.is_terminal() {
            break;
        }

        match update {
            JobUpdate::Transition(next) => {
                // Only the final report ends a cancellation
                if job.status == JobStatus::Cancelling && next != JobStatus::Cancelling {
                    continue;
                }
                job.status = next;
                status.send_replace(next);
            }
            JobUpdate::Append(outcome) => job.outcomes.push(outcome),
            JobUpdate::Revise { position, outcome } => {
                if let Some(slot) = job.outcomes.get_mut(position) {
                    *slot = outcome;
                }
            }
            JobUpdate::Progress(mut event) => {
                event.status = job.status;
                let _ = events.send(event);
            }
            JobUpdate::CancelRequested => {
                if job.status != JobStatus::Cancelling {
                    job.status = JobStatus::Cancelling;
                    status.send_replace(JobStatus::Cancelling);
                    let _ = events.send(ProgressEvent::new(
                        &job_id,
                        JobStatus::Cancelling,
                        "Cancellation requested",
                    ));
                }
            }
            JobUpdate::Finished(report) => {
                job.status = report.status;
                job.ended_at = Some(Utc::now());
                let event = ProgressEvent::new(&job_id, report.status, report.summary())
                    .with_counts(report.outcomes.len(), Some(report.total_items));
                job.report = Some(report);
                status.send_replace(job.status);
                let _ = events.send(event);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_request() {
        assert!(validate_request(&DownloadRequest::new(
            "https://soundcloud.com/x/sets/y",
            "/music"
        ))
        .is_ok());

        let err = validate_request(&DownloadRequest::new("  ", "/music")).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidRequest(_)));

        let err = validate_request(&DownloadRequest::new("ftp://example.com/a", "/music"))
            .unwrap_err();
        assert!(err.to_string().contains("scheme"));

        let err = validate_request(&DownloadRequest::new("not a url", "/music")).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidRequest(_)));

        let err = validate_request(&DownloadRequest::new(
            "https://soundcloud.com/x/sets/y",
            PathBuf::new(),
        ))
        .unwrap_err();
        assert!(err.to_string().contains("output_directory"));
    }
}
