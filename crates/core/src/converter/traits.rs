use async_trait::async_trait;

use super::error::ConverterError;
use super::types::{ConversionJob, ConversionResult};

/// Transcodes one fetched item into the requested audio format.
///
/// The runner holds this behind an `Arc<dyn Converter>` so tests can swap in
/// a scripted implementation.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    async fn convert(&self, job: ConversionJob) -> Result<ConversionResult, ConverterError>;

    /// Checks that the backing tool can be launched.
    async fn validate(&self) -> Result<(), ConverterError>;
}
