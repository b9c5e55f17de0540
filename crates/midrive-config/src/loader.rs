//! Configuration file loading and validation
//!
//! - [`load_config`] - Strict loader, errors if the file is missing
//! - [`load_config_from_env`] - Uses `MIDRIVE_CONFIG` when set, defaults otherwise
//! - [`load_config_from_str`] - Parses TOML text

use crate::constants::ENV_MIDRIVE_CONFIG;
use crate::Config;
use std::path::{Path, PathBuf};
use tracing::debug;

// Generated by build.rs from the workspace-root midrive.toml
include!(concat!(env!("OUT_DIR"), "/embedded_configs.rs"));

/// Errors that can occur during config loading
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file (strict - no side effects)
///
/// Returns `ConfigError::NotFound` if the file does not exist.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    debug!(path = %path.display(), "Loading config file");
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from `$MIDRIVE_CONFIG`, or the embedded defaults when unset
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    match std::env::var_os(ENV_MIDRIVE_CONFIG) {
        Some(path) => load_config(Path::new(&path)),
        None => load_config_from_str(DEFAULT_CONFIG),
    }
}

/// Load configuration from a TOML string
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut all_errors = Vec::new();

    if config.session.request_timeout_ms == 0 {
        all_errors.push("session.request_timeout_ms must be greater than 0".to_string());
    }
    if config.session.event_channel_capacity == 0 {
        all_errors.push("session.event_channel_capacity must be greater than 0".to_string());
    }
    if config.transport.channel_capacity == 0 {
        all_errors.push("transport.channel_capacity must be greater than 0".to_string());
    }
    if config.transport.connection_timeout_ms == 0 {
        all_errors.push("transport.connection_timeout_ms must be greater than 0".to_string());
    }
    if config.transport.server_started_timeout_ms == 0 {
        all_errors.push("transport.server_started_timeout_ms must be greater than 0".to_string());
    }
    if config.transport.terminal_pid_timeout_ms == 0 {
        all_errors.push("transport.terminal_pid_timeout_ms must be greater than 0".to_string());
    }
    if config.transport.serial_baud_rate == 0 {
        all_errors.push("transport.serial_baud_rate must be greater than 0".to_string());
    }
    if config.transport.retry_interval_ms > config.transport.max_retry_interval_ms {
        all_errors.push(
            "transport.retry_interval_ms must not exceed transport.max_retry_interval_ms"
                .to_string(),
        );
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(all_errors.join("; ")))
    }
}
