//! Error types for MI sessions

use crate::parser::ParseError;
use crate::protocol::ResultClass;
use crate::value::ValueError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Socket errors, spawn failures, write failures on the channel
    ///
    /// Terminal for the session that observes it.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection establishment did not complete in time
    ///
    /// Use for: TCP connect, serial login, debug-server started banner,
    /// terminal pid handshake. The transport is torn down before this is returned.
    #[error("Timed out establishing connection: {0}")]
    ConnectTimeout(String),

    /// Send after close, or the reader side is gone
    #[error("Channel closed")]
    ChannelClosed,

    /// The channel has no knowable process id (network, serial, remote shell)
    #[error("Process id is not available on a {0} transport")]
    PidUnavailable(&'static str),

    /// A reply line did not conform to the MI grammar
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A command completed with a result class other than the one it expects
    #[error("Unexpected result class for '{command}': expected {expected}, got {actual}")]
    UnexpectedResultClass {
        command: String,
        expected: ResultClass,
        actual: ResultClass,
    },

    /// The active dialect cannot perform the operation; nothing was sent
    #[error("'{operation}' is not supported by {dialect}")]
    NotSupported {
        dialect: &'static str,
        operation: &'static str,
    },

    /// Double release, use of a released token, or an operation that needs a
    /// hold the caller does not have
    #[error("Lock discipline violation: {0}")]
    LockDiscipline(String),

    /// `^error` reply; `msg` is the debugger's own text
    #[error("Debugger error for '{command}': {msg}")]
    Debugger {
        command: String,
        msg: String,
        code: Option<String>,
    },

    /// The debugger exited (or the session closed) before the reply arrived
    #[error("Debugger exited (code: {})", .exit_code.as_deref().unwrap_or("unknown"))]
    DebuggerExited { exit_code: Option<String> },

    /// Request timeout
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// Caller-provided cancellation fired
    #[error("Operation cancelled")]
    Cancelled,

    /// The session is in a state where the operation makes no sense
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Bad caller input rejected before anything was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Projection of a reply into a typed result failed
    #[error(transparent)]
    Value(#[from] ValueError),
}

impl Error {
    /// True for errors after which the session cannot continue
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::ConnectTimeout(_)
                | Error::ChannelClosed
                | Error::DebuggerExited { .. }
                | Error::LockDiscipline(_)
        )
    }

    pub(crate) fn not_supported(dialect: &'static str, operation: &'static str) -> Self {
        Error::NotSupported { dialect, operation }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Debugger {
            command: "-exec-continue".to_string(),
            msg: "The program is not being run.".to_string(),
            code: None,
        };
        assert_eq!(
            err.to_string(),
            "Debugger error for '-exec-continue': The program is not being run."
        );
    }

    #[test]
    fn test_exited_display_without_code() {
        let err = Error::DebuggerExited { exit_code: None };
        assert_eq!(err.to_string(), "Debugger exited (code: unknown)");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.is_terminal());
    }

    #[test]
    fn test_capability_error_is_not_terminal() {
        assert!(!Error::not_supported("LLDB", "break-watch").is_terminal());
    }
}
