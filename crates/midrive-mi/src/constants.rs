//! MI protocol constants
//!
//! Centralizes the literal strings exchanged with the debugger.

/// Stopped record reasons
pub mod stop_reasons {
    pub const BREAKPOINT_HIT: &str = "breakpoint-hit";
    pub const END_STEPPING_RANGE: &str = "end-stepping-range";
    pub const SIGNAL_RECEIVED: &str = "signal-received";
    pub const EXITED: &str = "exited";
    pub const EXITED_NORMALLY: &str = "exited-normally";
    pub const EXITED_SIGNALLED: &str = "exited-signalled";
    /// clrdbg first/second chance exception
    pub const EXCEPTION_RECEIVED: &str = "exception-received";
}

/// Signal names reported in `*stopped`
pub mod signals {
    /// What an `-exec-interrupt` shows up as on gdb and lldb
    pub const SIGINT: &str = "SIGINT";
    pub const SIGTRAP: &str = "SIGTRAP";
}

/// Result field names used across command projections
pub mod fields {
    pub const MSG: &str = "msg";
    pub const CODE: &str = "code";
    pub const THREAD_ID: &str = "thread-id";
    pub const STACK: &str = "stack";
    pub const FRAME: &str = "frame";
    pub const DEPTH: &str = "depth";
    pub const VALUE: &str = "value";
    pub const BKPT: &str = "bkpt";
    pub const NUMBER: &str = "number";
}

/// Transport-level literals
pub mod transport {
    /// Sent before closing a shell-hosted debugger so the remote shell exits
    pub const FAREWELL: &str = "logout";
    /// Serial login prompt suffix
    pub const LOGIN_PROMPT: &str = "login:";
    /// Default serial shell prompt
    pub const SHELL_PROMPT: &str = "$";
    /// Name used in `PidUnavailable` errors
    pub const TCP: &str = "tcp";
    pub const SERIAL: &str = "serial";
    pub const SHELL: &str = "shell";
    pub const LOOPBACK: &str = "loopback";
}

/// Dialect display names
pub mod dialects {
    pub const GDB: &str = "GDB";
    pub const LLDB: &str = "LLDB";
    pub const CLRDBG: &str = "clrdbg";
}

/// Default option values for command construction
pub mod defaults {
    /// Upper bound used when listing var-object children
    pub const MAX_CHILDREN: u32 = 1000;
    /// First GDB version whose async switch is spelled `mi-async`
    pub const MI_ASYNC_MIN_VERSION: (u32, u32) = (7, 8);
}
