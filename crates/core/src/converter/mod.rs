//! Converter module for transcoding fetched items.
//!
//! This module provides the `Converter` trait and an FFmpeg implementation.
//! The runner only ever asks for MP3 output; the source container is whatever
//! the extraction engine produced (webm, m4a, opus, ...).
//!
//! # Example
//!
//! ```ignore
//! use listgrab_core::converter::{AudioConstraints, ConversionJob, Converter, FfmpegConverter};
//!
//! let converter = FfmpegConverter::with_defaults();
//! converter.validate().await?;
//!
//! let job = ConversionJob::beside(
//!     "job-1/3",
//!     PathBuf::from("/music/3 - Song.webm"),
//!     AudioConstraints::default(),
//! );
//! let result = converter.convert(job).await?;
//! println!("Converted in {} ms", result.duration_ms);
//! ```

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::FfmpegConverter;
pub use traits::Converter;
pub use types::{AudioConstraints, AudioFormat, ConversionJob, ConversionResult};
