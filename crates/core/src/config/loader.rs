use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;
use tracing::info;

use super::{types::Config, ConfigError};

/// Defaults, then the TOML file at `path`, then `LISTGRAB_*` variables.
///
/// A missing file is not an error: defaults apply and `LISTGRAB_` variables
/// still override them (`LISTGRAB_JOBS__EVENT_BUFFER=64`).
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        info!(
            "Configuration file {} not found, using defaults",
            path.display()
        );
    }

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LISTGRAB_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Parses TOML alone, without the file or environment layers.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
