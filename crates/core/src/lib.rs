pub mod config;
pub mod controller;
pub mod converter;
pub mod extractor;
pub mod job;
pub mod metrics;
pub mod runner;
pub mod supervisor;
pub mod testing;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use controller::{ControllerError, JobController};
pub use converter::{Converter, ConverterConfig, ConverterError, FfmpegConverter};
pub use extractor::{Extractor, ExtractorConfig, ExtractorError, YtDlpExtractor};
pub use job::{
    DownloadRequest, FinalReport, ItemOutcome, ItemStage, JobState, JobStatus, ProgressEvent,
    Quality, TargetFormat,
};
pub use runner::{JobRunner, JobUpdate, RunnerSettings};
pub use supervisor::{ProcessCommand, ProcessSupervisor};
