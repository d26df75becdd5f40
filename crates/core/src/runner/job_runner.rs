//! Job runner implementation.
//!
//! Drives one playlist through the pipeline:
//! - Preparing: output directory, cookies
//! - Fetching: item by item through the extractor, or one delegated
//!   yt-dlp process for MP4 downloads from video sites
//! - Converting: optional MP3 transcode of fetched items
//!
//! Every change is reported through the job's update channel. The runner never
//! touches `JobState` directly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::converter::{AudioConstraints, AudioFormat, ConversionJob, Converter};
use crate::extractor::{error_reason, ExtractionRequest, Extractor};
use crate::job::{
    DownloadRequest, FinalReport, ItemOutcome, ItemStage, JobError, JobStatus, ProgressEvent,
    TargetFormat,
};
use crate::metrics;
use crate::supervisor::ProcessSupervisor;

use super::delegate;
use super::types::{JobUpdate, JobUpdates, RunnerSettings};

/// Runs download jobs. One instance is shared by every job of a controller.
pub struct JobRunner {
    extractor: Arc<dyn Extractor>,
    converter: Arc<dyn Converter>,
    supervisor: Arc<ProcessSupervisor>,
    settings: RunnerSettings,
}

/// Per-run bookkeeping mirrored to the controller.
struct RunContext<'a> {
    job_id: &'a str,
    updates: &'a JobUpdates,
    status: JobStatus,
    title: Option<String>,
    total: Option<usize>,
    outcomes: Vec<ItemOutcome>,
}

impl<'a> RunContext<'a> {
    fn new(job_id: &'a str, updates: &'a JobUpdates) -> Self {
        Self {
            job_id,
            updates,
            status: JobStatus::Idle,
            title: None,
            total: None,
            outcomes: Vec::new(),
        }
    }

    fn send(&self, update: JobUpdate) {
        // The controller may already be gone during shutdown
        let _ = self.updates.send(update);
    }

    fn transition(&mut self, status: JobStatus, message: impl Into<String>) {
        if self.status == status {
            return;
        }
        self.status = status;
        self.send(JobUpdate::Transition(status));
        self.send(JobUpdate::Progress(ProgressEvent::new(
            self.job_id,
            status,
            message,
        )));
    }

    fn progress(&self, message: impl Into<String>, current: usize, total: Option<usize>) {
        self.send(JobUpdate::Progress(
            ProgressEvent::new(self.job_id, self.status, message).with_counts(current, total),
        ));
    }

    fn append(&mut self, outcome: ItemOutcome) {
        self.send(JobUpdate::Append(outcome.clone()));
        self.outcomes.push(outcome);
    }

    fn revise(&mut self, position: usize, outcome: ItemOutcome) {
        self.send(JobUpdate::Revise {
            position,
            outcome: outcome.clone(),
        });
        self.outcomes[position] = outcome;
    }

    fn report(&self, status: JobStatus, error: Option<JobError>) -> FinalReport {
        FinalReport::from_outcomes(
            self.job_id,
            status,
            self.title.clone(),
            self.total,
            self.outcomes.clone(),
            error,
        )
    }

    fn cancelled(&mut self) -> FinalReport {
        self.transition(JobStatus::Cancelling, "Cancelling");
        self.report(JobStatus::Cancelled, None)
    }

    fn failed(&self, error: JobError) -> FinalReport {
        warn!("Job {} failed: {}", self.job_id, error.message);
        self.report(JobStatus::Failed, Some(error))
    }
}

impl JobRunner {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        converter: Arc<dyn Converter>,
        supervisor: Arc<ProcessSupervisor>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            extractor,
            converter,
            supervisor,
            settings,
        }
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Runs a job to its end and returns the final report. The report is also
    /// sent as [`JobUpdate::Finished`].
    pub async fn run(
        &self,
        job_id: &str,
        request: DownloadRequest,
        cancel: CancellationToken,
        updates: JobUpdates,
    ) -> FinalReport {
        let started = Instant::now();
        let mut ctx = RunContext::new(job_id, &updates);

        info!(
            "Starting job {} for {} ({:?}, {:?})",
            job_id, request.playlist_url, request.target_format, request.quality
        );

        let report = self.execute(&mut ctx, &request, &cancel).await;

        let result = report.status.as_str();
        metrics::JOBS_TOTAL.with_label_values(&[result]).inc();
        metrics::JOB_DURATION
            .with_label_values(&[result])
            .observe(started.elapsed().as_secs_f64());

        info!("Job {} ended: {}", job_id, report.summary());
        ctx.send(JobUpdate::Finished(report.clone()));
        report
    }

    async fn execute(
        &self,
        ctx: &mut RunContext<'_>,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> FinalReport {
        ctx.transition(JobStatus::Preparing, "Preparing download");

        if let Err(e) = tokio::fs::create_dir_all(&request.output_directory).await {
            return ctx.failed(JobError::classified(format!(
                "Failed to create output directory {}: {}",
                request.output_directory.display(),
                e
            )));
        }

        let cookies = self.resolve_cookies(request).await;

        if cancel.is_cancelled() {
            return ctx.cancelled();
        }

        if request.target_format == TargetFormat::Mp4
            && delegate::is_video_platform(&request.playlist_url, &self.settings.video_domains)
        {
            return self.run_delegated(ctx, request, cookies, cancel).await;
        }

        if let Some(report) = self.fetch(ctx, request, cookies, cancel).await {
            return report;
        }

        if cancel.is_cancelled() {
            return ctx.cancelled();
        }

        if request.target_format == TargetFormat::Mp3 {
            if let Some(report) = self.convert(ctx, request, cancel).await {
                return report;
            }
        }

        ctx.report(JobStatus::Completed, None)
    }

    /// Keeps the cookies file only if it still exists. A missing file is
    /// ignored without raising an outcome.
    async fn resolve_cookies(&self, request: &DownloadRequest) -> Option<PathBuf> {
        let cookies = request.cookies_file.as_ref()?;
        if tokio::fs::try_exists(cookies).await.unwrap_or(false) {
            Some(cookies.clone())
        } else {
            debug!(
                "Cookies file {} does not exist, continuing without it",
                cookies.display()
            );
            None
        }
    }

    /// Fetches every item through the extractor. Returns a report only when
    /// the job ends here (fatal error or cancellation).
    async fn fetch(
        &self,
        ctx: &mut RunContext<'_>,
        request: &DownloadRequest,
        cookies: Option<PathBuf>,
        cancel: &CancellationToken,
    ) -> Option<FinalReport> {
        ctx.transition(JobStatus::Fetching, "Fetching playlist information");

        let extraction = ExtractionRequest::new(
            request.playlist_url.clone(),
            request.output_directory.clone(),
        )
        .with_cookies(cookies)
        .with_format_selector(request.quality.audio_selector());

        let session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Some(ctx.cancelled()),
            result = self.extractor.open(&extraction) => result,
        };

        let session = match session {
            Ok(session) => session,
            Err(e) => return Some(ctx.failed(JobError::classified(e.to_string()))),
        };

        ctx.title = session.title.clone();
        ctx.total = session.total_items;
        ctx.progress(
            format!(
                "Found {} items in '{}'",
                session
                    .total_items
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                session.title.as_deref().unwrap_or("playlist")
            ),
            0,
            session.total_items,
        );

        let mut items = session.items;
        loop {
            // No new item is started once cancellation is requested
            if cancel.is_cancelled() {
                return Some(ctx.cancelled());
            }

            // Polled before the token, so a cancel only wins against an item
            // that is already downloading
            let mut in_flight = items.next();
            let polled = tokio::select! {
                biased;
                next = &mut in_flight => Some(next),
                _ = cancel.cancelled() => None,
            };

            match polled {
                Some(Some(extracted)) => self.record_item(ctx, extracted.into_outcome()),
                Some(None) => break,
                None => {
                    ctx.transition(JobStatus::Cancelling, "Cancelling after the current item");
                    if let Ok(Some(extracted)) =
                        timeout(self.settings.terminate_grace, in_flight).await
                    {
                        self.record_item(ctx, extracted.into_outcome());
                    }
                    return Some(ctx.cancelled());
                }
            }
        }

        None
    }

    fn record_item(&self, ctx: &mut RunContext<'_>, outcome: ItemOutcome) {
        metrics::ITEMS_TOTAL
            .with_label_values(&[outcome.stage.as_str()])
            .inc();

        let message = match outcome.stage {
            ItemStage::Fetched | ItemStage::Converted => {
                format!("Downloaded {}: {}", outcome.item.index, outcome.item.title)
            }
            ItemStage::SkippedUnavailable => format!(
                "Skipped unavailable item {}: {}",
                outcome.item.index, outcome.item.title
            ),
            ItemStage::Failed => format!(
                "Failed item {}: {} ({})",
                outcome.item.index,
                outcome.item.title,
                outcome.error_detail.as_deref().unwrap_or("unknown error")
            ),
        };

        ctx.append(outcome);
        ctx.progress(message, ctx.outcomes.len(), ctx.total);
    }

    /// Transcodes fetched items to MP3. Returns a report only on cancellation.
    async fn convert(
        &self,
        ctx: &mut RunContext<'_>,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Option<FinalReport> {
        let format = AudioFormat::Mp3;
        let pending: Vec<usize> = ctx
            .outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.stage == ItemStage::Fetched)
            .filter(|(_, o)| {
                o.local_path
                    .as_deref()
                    .is_some_and(|p| !format.matches_path(p))
            })
            .map(|(position, _)| position)
            .collect();

        if pending.is_empty() {
            debug!("Job {}: nothing to convert", ctx.job_id);
            return None;
        }

        ctx.transition(
            JobStatus::Converting,
            format!("Converting {} items to MP3", pending.len()),
        );

        let constraints = AudioConstraints {
            format,
            bitrate_kbps: Some(request.quality.mp3_bitrate_kbps()),
        };
        let total = pending.len();

        for (done, position) in pending.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Some(ctx.cancelled());
            }

            let outcome = ctx.outcomes[position].clone();
            let Some(input) = outcome.local_path.clone() else {
                continue;
            };
            let job = ConversionJob::beside(
                format!("{}#{}", ctx.job_id, outcome.item.index),
                input.clone(),
                constraints.clone(),
            );
            let output = job.output_path.clone();
            let started = Instant::now();

            let mut conversion = self.converter.convert(job);
            let result = tokio::select! {
                result = &mut conversion => Some(result),
                _ = cancel.cancelled() => None,
            };
            let result = match result {
                Some(result) => Some(result),
                None => {
                    ctx.transition(
                        JobStatus::Cancelling,
                        "Cancelling after the current conversion",
                    );
                    match timeout(self.settings.terminate_grace, &mut conversion).await {
                        Ok(result) => Some(result),
                        Err(_) => {
                            drop(conversion);
                            // Abandoned mid-write
                            let _ = tokio::fs::remove_file(&output).await;
                            None
                        }
                    }
                }
            };

            let Some(result) = result else {
                return Some(ctx.cancelled());
            };

            let revised = match result {
                Ok(converted) => {
                    metrics::CONVERSIONS_TOTAL.with_label_values(&["success"]).inc();
                    metrics::CONVERSION_DURATION
                        .with_label_values(&[])
                        .observe(started.elapsed().as_secs_f64());

                    if !self.settings.preserve_originals && converted.output_path != input {
                        if let Err(e) = tokio::fs::remove_file(&input).await {
                            warn!("Failed to remove original {}: {}", input.display(), e);
                        }
                    }

                    ItemOutcome {
                        stage: ItemStage::Converted,
                        local_path: Some(converted.output_path),
                        ..outcome
                    }
                }
                Err(e) => {
                    metrics::CONVERSIONS_TOTAL.with_label_values(&["failed"]).inc();
                    warn!(
                        "Conversion of item {} failed: {}",
                        outcome.item.index,
                        e.detail()
                    );
                    ItemOutcome {
                        stage: ItemStage::Failed,
                        error_detail: Some(e.detail()),
                        ..outcome
                    }
                }
            };

            let message = format!(
                "Converted {}/{}: {}",
                done + 1,
                total,
                revised.item.title
            );
            ctx.revise(position, revised);
            ctx.progress(message, done + 1, Some(total));

            if cancel.is_cancelled() {
                return Some(ctx.cancelled());
            }
        }

        None
    }

    /// Hands the whole download to one supervised yt-dlp process.
    async fn run_delegated(
        &self,
        ctx: &mut RunContext<'_>,
        request: &DownloadRequest,
        cookies: Option<PathBuf>,
        cancel: &CancellationToken,
    ) -> FinalReport {
        ctx.transition(
            JobStatus::Fetching,
            "Downloading videos as MP4 with yt-dlp",
        );
        metrics::DELEGATED_RUNS.inc();

        let before = delegate::list_mp4_files(&request.output_directory).await;
        let command =
            delegate::build_command(&self.settings.ytdlp_path, request, cookies.as_deref());

        let handle = match self.supervisor.spawn(command).await {
            Ok(handle) => handle,
            Err(e) => return ctx.failed(JobError::classified(e.to_string())),
        };

        let exit = tokio::select! {
            exit = self.supervisor.wait(&handle) => exit,
            _ = cancel.cancelled() => {
                ctx.transition(JobStatus::Cancelling, "Stopping yt-dlp");
                self.supervisor
                    .terminate(&handle, self.settings.terminate_grace)
                    .await;
                self.supervisor.wait(&handle).await
            }
        };

        if cancel.is_cancelled() || exit.terminated {
            return ctx.cancelled();
        }

        if exit.success {
            return ctx.report(JobStatus::Completed, None);
        }

        let message = error_reason(&exit.stderr_tail)
            .unwrap_or_else(|| format!("yt-dlp exited with code: {:?}", exit.code));
        let error = JobError::classified(message);

        let after = delegate::list_mp4_files(&request.output_directory).await;
        let produced = after.difference(&before).count();
        if produced > 0 {
            warn!(
                "yt-dlp exited with {:?} after writing {} files",
                exit.code, produced
            );
            ctx.report(JobStatus::Completed, Some(error))
        } else {
            ctx.failed(error)
        }
    }
}
