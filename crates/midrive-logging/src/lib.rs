//! Logging setup for midrive
//!
//! Wraps `tracing` and `tracing-subscriber` so every consumer of the engine
//! initializes logging the same way. The engine itself only emits `tracing`
//! events; sent lines are logged at `trace` with a `->` marker and received
//! lines with `<-`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use midrive_logging::{init, init_with_file, LogConfig, LogOutput};
//!
//! // Front end embedding the engine, logs on stderr
//! init(LogConfig::new().output(LogOutput::Stderr));
//!
//! // Engine log file (the returned guard must outlive the session)
//! let _guard = init_with_file(LogConfig::new().debug(true), Path::new("/tmp/midrive.log"))?;
//!
//! // From the `[logging]` table; MIDRIVE_LOG_FILE overrides its `file`
//! let _guard = init_from_settings(&config.logging)?;
//! ```

use midrive_config::constants::ENV_MIDRIVE_LOG_FILE;
use midrive_config::LoggingConfig;
use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing::{debug, error, info, trace, warn, Level};
pub use tracing_appender::non_blocking::WorkerGuard;

/// Output destination for logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOutput {
    /// Write logs to stdout
    Stdout,
    /// Write logs to stderr (default; stdout often belongs to the front end's protocol)
    #[default]
    Stderr,
}

/// Timestamp format for log output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampFormat {
    #[default]
    Local,
    Utc,
}

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable debug-level logging (overrides default_level)
    pub debug: bool,
    /// Default log level when RUST_LOG is not set
    pub default_level: String,
    pub output: LogOutput,
    /// Show module target in log output
    pub show_target: bool,
    pub timestamp_format: TimestampFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_level: "info".to_string(),
            output: LogOutput::default(),
            show_target: true,
            timestamp_format: TimestampFormat::default(),
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[logging]` section of `midrive.toml`
    pub fn from_settings(settings: &LoggingConfig) -> Self {
        let config = Self::new().default_level(settings.level.clone());
        if settings.utc {
            config.timestamp_format(TimestampFormat::Utc)
        } else {
            config
        }
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
        }
    }
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` overrides the configured level (e.g. `RUST_LOG=midrive_mi=trace`
/// shows every line crossing the transport).
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init(config: LogConfig) {
    use tracing_subscriber::fmt::time::{LocalTime, UtcTime};

    let filter = config.build_filter();

    macro_rules! with_timer_init {
        ($builder:expr, $ts_format:expr) => {
            match $ts_format {
                TimestampFormat::Utc => $builder.with_timer(UtcTime::rfc_3339()).init(),
                TimestampFormat::Local => $builder.with_timer(LocalTime::rfc_3339()).init(),
            }
        };
    }

    match config.output {
        LogOutput::Stdout => {
            let builder = fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_ansi(std::io::stdout().is_terminal());
            with_timer_init!(builder, config.timestamp_format);
        }
        LogOutput::Stderr => {
            let builder = fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal());
            with_timer_init!(builder, config.timestamp_format);
        }
    }
}

/// Initialize logging to a file through a non-blocking `tracing-appender` writer.
///
/// The returned `WorkerGuard` must be held until shutdown so buffered lines
/// are flushed.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created.
pub fn init_with_file(config: LogConfig, log_path: &Path) -> std::io::Result<WorkerGuard> {
    use tracing_subscriber::fmt::time::{LocalTime, UtcTime};

    let filter = config.build_filter();

    let log_dir = log_path.parent().unwrap_or(Path::new("."));
    if !log_dir.as_os_str().is_empty() {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| std::io::Error::other(format!("Failed to create log directory: {}", e)))?;
    }
    let log_filename = log_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("midrive.log");

    let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(config.show_target)
        .with_writer(non_blocking)
        .with_ansi(false);

    match config.timestamp_format {
        TimestampFormat::Utc => builder.with_timer(UtcTime::rfc_3339()).init(),
        TimestampFormat::Local => builder.with_timer(LocalTime::rfc_3339()).init(),
    }

    Ok(guard)
}

/// Initialize logging from the `[logging]` settings.
///
/// Logs to a file when `MIDRIVE_LOG_FILE` or `file` names one, otherwise to
/// stderr. The guard is `Some` only for file logging.
pub fn init_from_settings(settings: &LoggingConfig) -> std::io::Result<Option<WorkerGuard>> {
    let config = LogConfig::from_settings(settings);
    match log_file(std::env::var_os(ENV_MIDRIVE_LOG_FILE), settings) {
        Some(path) => init_with_file(config, &path).map(Some),
        None => {
            init(config);
            Ok(None)
        }
    }
}

/// A non-empty environment override wins over the configured file
fn log_file(env_override: Option<OsString>, settings: &LoggingConfig) -> Option<PathBuf> {
    env_override
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| settings.file.clone())
}

/// Initialize logging for tests.
///
/// Uses `with_test_writer()` so output is captured per test.
/// Safe to call multiple times.
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_from_settings() {
        let settings = LoggingConfig {
            level: "warn".to_string(),
            file: None,
            utc: true,
        };
        let config = LogConfig::from_settings(&settings);
        assert_eq!(config.default_level, "warn");
        assert_eq!(config.timestamp_format, TimestampFormat::Utc);
        assert_eq!(config.output, LogOutput::Stderr);
    }

    #[test]
    fn test_build_filter_respects_debug_flag() {
        let config = LogConfig::new().default_level("warn").debug(true);
        let filter_str = format!("{:?}", config.build_filter());
        assert!(
            filter_str.contains("debug") || filter_str.contains("DEBUG"),
            "Expected debug level in filter: {}",
            filter_str
        );
    }

    #[test]
    fn test_log_file_env_override() {
        let settings = LoggingConfig {
            level: "info".to_string(),
            file: Some(PathBuf::from("/var/log/midrive.log")),
            utc: false,
        };
        assert_eq!(
            log_file(Some(OsString::from("/tmp/engine.log")), &settings),
            Some(PathBuf::from("/tmp/engine.log"))
        );
        assert_eq!(
            log_file(Some(OsString::new()), &settings),
            Some(PathBuf::from("/var/log/midrive.log"))
        );
        assert_eq!(
            log_file(None, &LoggingConfig { file: None, ..settings }),
            None
        );
    }

    #[test]
    fn test_init_test_does_not_panic() {
        init_test();
        init_test();
    }
}
