use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::converter::ConverterConfig;
use crate::extractor::ExtractorConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Job execution settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Progress events buffered per subscriber before the oldest are dropped.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// How long a cancel request waits for the job to reach a terminal status.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
    /// Grace period between the stop signal and the forced kill of a
    /// supervised process. Also bounds how long a cancelled job waits for the
    /// item in flight.
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    /// Hosts whose MP4 requests are delegated to a single yt-dlp process.
    #[serde(default = "default_video_domains")]
    pub video_domains: Vec<String>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            cancel_grace_ms: default_cancel_grace_ms(),
            terminate_grace_ms: default_terminate_grace_ms(),
            video_domains: default_video_domains(),
        }
    }
}

fn default_event_buffer() -> usize {
    256
}

fn default_cancel_grace_ms() -> u64 {
    3000
}

fn default_terminate_grace_ms() -> u64 {
    2000
}

fn default_video_domains() -> Vec<String> {
    [
        "youtube.com",
        "youtu.be",
        "m.youtube.com",
        "www.youtube.com",
        "music.youtube.com",
    ]
    .iter()
    .map(|d| d.to_string())
    .collect()
}
