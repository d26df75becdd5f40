//! Scripted converter that never spawns ffmpeg.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::converter::{ConversionJob, ConversionResult, Converter, ConverterError};

/// One call to [`MockConverter::convert`].
#[derive(Debug, Clone)]
pub struct RecordedConversion {
    pub job: ConversionJob,
    pub success: bool,
}

#[derive(Debug, Default)]
struct Script {
    history: Vec<RecordedConversion>,
    broken_inputs: HashSet<PathBuf>,
    pending_error: Option<ConverterError>,
    delay: Duration,
}

/// Converter double for runner and controller tests.
///
/// A successful conversion drops a stub file at the output path when the
/// output directory exists, so tests can look at the filesystem afterwards.
/// Inputs registered with [`fail_for`](Self::fail_for) fail the way a corrupt
/// download makes ffmpeg fail.
#[derive(Debug, Default)]
pub struct MockConverter {
    script: Mutex<Script>,
}

impl MockConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recorded_conversions(&self) -> Vec<RecordedConversion> {
        self.script.lock().await.history.clone()
    }

    pub async fn conversion_count(&self) -> usize {
        self.script.lock().await.history.len()
    }

    pub async fn fail_for(&self, input: impl AsRef<Path>) {
        self.script
            .lock()
            .await
            .broken_inputs
            .insert(input.as_ref().to_path_buf());
    }

    /// The next `convert` or `validate` call returns `error`.
    pub async fn set_next_error(&self, error: ConverterError) {
        self.script.lock().await.pending_error = Some(error);
    }

    /// Every conversion sleeps this long before answering.
    pub async fn set_conversion_duration(&self, duration: Duration) {
        self.script.lock().await.delay = duration;
    }

    async fn outcome_for(&self, job: &ConversionJob) -> Result<(), ConverterError> {
        let mut script = self.script.lock().await;
        if let Some(err) = script.pending_error.take() {
            return Err(err);
        }
        if script.broken_inputs.contains(&job.input_path) {
            return Err(ConverterError::conversion_failed(
                "ffmpeg exited with exit status: 1",
                Some("Invalid data found when processing input".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn convert(&self, job: ConversionJob) -> Result<ConversionResult, ConverterError> {
        let delay = self.script.lock().await.delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.outcome_for(&job).await;
        if outcome.is_ok() && job.output_path.parent().is_some_and(Path::exists) {
            tokio::fs::write(&job.output_path, b"ID3").await?;
        }

        self.script.lock().await.history.push(RecordedConversion {
            job: job.clone(),
            success: outcome.is_ok(),
        });
        outcome?;

        Ok(ConversionResult {
            job_id: job.job_id,
            output_path: job.output_path,
            output_size_bytes: 3,
            duration_ms: delay.as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        match self.script.lock().await.pending_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
