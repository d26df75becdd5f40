use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Tool paths are not empty
/// - Buffers and timeouts are not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.extractor.ytdlp_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "extractor.ytdlp_path cannot be empty".to_string(),
        ));
    }

    if config.converter.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.ffmpeg_path cannot be empty".to_string(),
        ));
    }

    let zeroes = [
        ("extractor.resolve_timeout_secs", config.extractor.resolve_timeout_secs),
        ("extractor.item_timeout_secs", config.extractor.item_timeout_secs),
        ("converter.timeout_secs", config.converter.timeout_secs),
        ("jobs.event_buffer", config.jobs.event_buffer as u64),
        ("jobs.cancel_grace_ms", config.jobs.cancel_grace_ms),
        ("jobs.terminate_grace_ms", config.jobs.terminate_grace_ms),
    ];
    if let Some((name, _)) = zeroes.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::ValidationError(format!(
            "{} cannot be 0",
            name
        )));
    }

    Ok(())
}
