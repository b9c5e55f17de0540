//! Default constants for midrive configuration
//!
//! Single source of truth for default values. Everything that is configurable
//! has its default here.
//!
//! # Organization
//!
//! - Timeouts: command, connection and readiness timeouts in milliseconds
//! - Exit handling: drain grace periods for the process-exit race
//! - Retry: connection retry and backoff
//! - Channel Capacities: internal channel buffer sizes
//! - Serial: serial port line settings
//! - TCP: keepalive tuning

// ============================================================================
// HOSTS
// ============================================================================

/// What "localhost" is pinned to for debug-server connections
pub const LOCALHOST_IPV4: std::net::Ipv4Addr = std::net::Ipv4Addr::new(127, 0, 0, 1);

// ============================================================================
// ENVIRONMENT VARIABLES
// ============================================================================

/// Config file path override
pub const ENV_MIDRIVE_CONFIG: &str = "MIDRIVE_CONFIG";

/// Engine log file path; overrides `[logging] file`
pub const ENV_MIDRIVE_LOG_FILE: &str = "MIDRIVE_LOG_FILE";

// ============================================================================
// TIMEOUTS (milliseconds)
// ============================================================================

/// Per-command reply timeout
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Connection establishment timeout (TCP connect, serial login)
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;

/// How long to wait for the first `(gdb)` prompt
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 30_000;

/// How long to wait for a companion debug server to print its started banner
pub const DEFAULT_SERVER_STARTED_TIMEOUT_MS: u64 = 10_000;

/// How long to wait for the terminal-hosted shell to report its pids
pub const DEFAULT_TERMINAL_PID_TIMEOUT_MS: u64 = 10_000;

/// Polling interval for the terminal-hosted shell liveness check
pub const DEFAULT_TERMINAL_POLL_INTERVAL_MS: u64 = 500;

// ============================================================================
// EXIT HANDLING
// ============================================================================

/// Grace period for stdout/stderr readers to drain after the process exits
pub const DEFAULT_EXIT_DRAIN_GRACE_MS: u64 = 100;

/// After the primary channel ends, how long to wait to see the process exit
/// before reporting an abnormal exit on its own
pub const DEFAULT_STDOUT_ABORT_PROBE_MS: u64 = 50;

// ============================================================================
// RETRY
// ============================================================================

/// Initial retry interval between connection attempts
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 100;

/// Backoff ceiling between connection attempts
pub const DEFAULT_MAX_RETRY_INTERVAL_MS: u64 = 2_000;

/// "Connection refused" attempts before fast-fail
pub const DEFAULT_MAX_CONNECTION_REFUSED_ATTEMPTS: u32 = 5;

// ============================================================================
// CHANNEL CAPACITIES
// ============================================================================

/// Session event channel capacity (per subscriber)
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Transport line channel capacity
pub const DEFAULT_TRANSPORT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// SERIAL
// ============================================================================

/// Serial port baud rate
pub const DEFAULT_SERIAL_BAUD_RATE: u32 = 115_200;

/// Idle read window used while reading partial serial lines (login prompts)
pub const DEFAULT_SERIAL_READ_IDLE_MS: u64 = 1_000;

// ============================================================================
// TCP
// ============================================================================

/// TCP keep-alive idle time before probes start
pub const DEFAULT_TCP_KEEPALIVE_TIME_SECS: u64 = 30;

/// Interval between TCP keep-alive probes
pub const DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS: u64 = 10;

/// TCP keep-alive probe count (Linux, Android, FreeBSD)
pub const DEFAULT_TCP_KEEPALIVE_RETRIES: u32 = 3;

// ============================================================================
// LOGGING
// ============================================================================

/// Default log level when RUST_LOG is unset
pub const DEFAULT_LOG_LEVEL: &str = "info";
