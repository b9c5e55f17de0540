//! Session and transport configuration
//!
//! Timeouts, channel capacities and transport tunables for one debugger
//! session. Every field has a serde default so partial TOML files work.

use crate::constants::{
    DEFAULT_CONNECTION_TIMEOUT_MS, DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_EXIT_DRAIN_GRACE_MS,
    DEFAULT_MAX_CONNECTION_REFUSED_ATTEMPTS, DEFAULT_MAX_RETRY_INTERVAL_MS,
    DEFAULT_READY_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETRY_INTERVAL_MS,
    DEFAULT_SERIAL_BAUD_RATE, DEFAULT_SERIAL_READ_IDLE_MS, DEFAULT_SERVER_STARTED_TIMEOUT_MS,
    DEFAULT_STDOUT_ABORT_PROBE_MS, DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS,
    DEFAULT_TCP_KEEPALIVE_TIME_SECS, DEFAULT_TERMINAL_PID_TIMEOUT_MS,
    DEFAULT_TERMINAL_POLL_INTERVAL_MS, DEFAULT_TRANSPORT_CHANNEL_CAPACITY,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Session Config
// ============================================================================

/// Per-session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default timeout for one command's reply, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How long `wait_ready` waits for the first prompt
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    /// Capacity of each event subscriber channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_ready_timeout_ms() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

// ============================================================================
// Transport Config
// ============================================================================

/// Transport tunables shared by every channel kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Capacity of the received-line channel
    #[serde(default = "default_transport_channel_capacity")]
    pub channel_capacity: usize,
    /// Connection timeout in milliseconds (TCP connect, serial login)
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Initial retry interval when connecting
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Backoff ceiling when connecting
    #[serde(default = "default_max_retry_interval_ms")]
    pub max_retry_interval_ms: u64,
    /// Maximum "connection refused" attempts before fast-fail
    #[serde(default = "default_max_connection_refused_attempts")]
    pub max_connection_refused_attempts: u32,
    /// Grace period for stdout/stderr readers to drain after process exit
    #[serde(default = "default_exit_drain_grace_ms")]
    pub exit_drain_grace_ms: u64,
    /// How long a primary-channel EOF waits for the process to exit before
    /// reporting an abnormal exit by itself
    #[serde(default = "default_stdout_abort_probe_ms")]
    pub stdout_abort_probe_ms: u64,
    /// Timeout for a companion debug server's started banner
    #[serde(default = "default_server_started_timeout_ms")]
    pub server_started_timeout_ms: u64,
    /// Timeout for the terminal-hosted shell to report its pids
    #[serde(default = "default_terminal_pid_timeout_ms")]
    pub terminal_pid_timeout_ms: u64,
    /// Liveness polling interval for the terminal-hosted shell
    #[serde(default = "default_terminal_poll_interval_ms")]
    pub terminal_poll_interval_ms: u64,
    /// Serial port baud rate
    #[serde(default = "default_serial_baud_rate")]
    pub serial_baud_rate: u32,
    /// Idle window when reading partial serial lines
    #[serde(default = "default_serial_read_idle_ms")]
    pub serial_read_idle_ms: u64,
    /// TCP keep-alive idle time (seconds)
    #[serde(default = "default_tcp_keepalive_time_secs")]
    pub tcp_keepalive_time_secs: u64,
    /// TCP keep-alive probe interval (seconds)
    #[serde(default = "default_tcp_keepalive_interval_secs")]
    pub tcp_keepalive_interval_secs: u64,
}

fn default_transport_channel_capacity() -> usize {
    DEFAULT_TRANSPORT_CHANNEL_CAPACITY
}

fn default_connection_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

fn default_max_retry_interval_ms() -> u64 {
    DEFAULT_MAX_RETRY_INTERVAL_MS
}

fn default_max_connection_refused_attempts() -> u32 {
    DEFAULT_MAX_CONNECTION_REFUSED_ATTEMPTS
}

fn default_exit_drain_grace_ms() -> u64 {
    DEFAULT_EXIT_DRAIN_GRACE_MS
}

fn default_stdout_abort_probe_ms() -> u64 {
    DEFAULT_STDOUT_ABORT_PROBE_MS
}

fn default_server_started_timeout_ms() -> u64 {
    DEFAULT_SERVER_STARTED_TIMEOUT_MS
}

fn default_terminal_pid_timeout_ms() -> u64 {
    DEFAULT_TERMINAL_PID_TIMEOUT_MS
}

fn default_terminal_poll_interval_ms() -> u64 {
    DEFAULT_TERMINAL_POLL_INTERVAL_MS
}

fn default_serial_baud_rate() -> u32 {
    DEFAULT_SERIAL_BAUD_RATE
}

fn default_serial_read_idle_ms() -> u64 {
    DEFAULT_SERIAL_READ_IDLE_MS
}

fn default_tcp_keepalive_time_secs() -> u64 {
    DEFAULT_TCP_KEEPALIVE_TIME_SECS
}

fn default_tcp_keepalive_interval_secs() -> u64 {
    DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_transport_channel_capacity(),
            connection_timeout_ms: default_connection_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            max_retry_interval_ms: default_max_retry_interval_ms(),
            max_connection_refused_attempts: default_max_connection_refused_attempts(),
            exit_drain_grace_ms: default_exit_drain_grace_ms(),
            stdout_abort_probe_ms: default_stdout_abort_probe_ms(),
            server_started_timeout_ms: default_server_started_timeout_ms(),
            terminal_pid_timeout_ms: default_terminal_pid_timeout_ms(),
            terminal_poll_interval_ms: default_terminal_poll_interval_ms(),
            serial_baud_rate: default_serial_baud_rate(),
            serial_read_idle_ms: default_serial_read_idle_ms(),
            tcp_keepalive_time_secs: default_tcp_keepalive_time_secs(),
            tcp_keepalive_interval_secs: default_tcp_keepalive_interval_secs(),
        }
    }
}

impl TransportConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn exit_drain_grace(&self) -> Duration {
        Duration::from_millis(self.exit_drain_grace_ms)
    }

    pub fn stdout_abort_probe(&self) -> Duration {
        Duration::from_millis(self.stdout_abort_probe_ms)
    }

    pub fn server_started_timeout(&self) -> Duration {
        Duration::from_millis(self.server_started_timeout_ms)
    }

    pub fn terminal_pid_timeout(&self) -> Duration {
        Duration::from_millis(self.terminal_pid_timeout_ms)
    }

    pub fn terminal_poll_interval(&self) -> Duration {
        Duration::from_millis(self.terminal_poll_interval_ms)
    }

    pub fn serial_read_idle(&self) -> Duration {
        Duration::from_millis(self.serial_read_idle_ms)
    }

    /// Builder-style override of the exit drain grace, mostly for tests
    pub fn with_exit_drain_grace_ms(mut self, ms: u64) -> Self {
        self.exit_drain_grace_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TransportConfig = toml::from_str("exit_drain_grace_ms = 250").unwrap();
        assert_eq!(config.exit_drain_grace_ms, 250);
        assert_eq!(config.serial_baud_rate, DEFAULT_SERIAL_BAUD_RATE);
        assert_eq!(config.exit_drain_grace(), Duration::from_millis(250));
    }

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
    }
}
