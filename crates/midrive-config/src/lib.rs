//! Configuration types and loading for midrive
//!
//! This crate provides:
//! - Configuration structures for the session, transports and logging
//! - Config file loading (TOML format) with validation
//! - The `constants` module holding every default value
//!
//! # Usage
//!
//! ```rust,ignore
//! use midrive_config::{load_config, Config};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("midrive.toml"))?;
//! println!("request timeout: {}ms", config.session.request_timeout_ms);
//! ```

mod loader;

// Default constants for all configuration values
pub mod constants;

mod session;
mod types;

pub use loader::{
    load_config, load_config_from_env, load_config_from_str, ConfigError, DEFAULT_CONFIG,
};
pub use session::{SessionConfig, TransportConfig};
pub use types::{Config, LoggingConfig};

pub use constants::{
    DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS, DEFAULT_TCP_KEEPALIVE_RETRIES,
    DEFAULT_TCP_KEEPALIVE_TIME_SECS, LOCALHOST_IPV4,
};
