//! Top-level configuration type

use crate::constants::DEFAULT_LOG_LEVEL;
use crate::session::{SessionConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root of `midrive.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file; stderr when absent
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Use UTC timestamps instead of local time
    #[serde(default)]
    pub utc: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            utc: false,
        }
    }
}
