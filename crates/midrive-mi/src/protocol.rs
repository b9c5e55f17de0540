//! MI protocol records
//!
//! One [`Reply`] is produced per received line. Results are matched to
//! commands strictly in send order; the optional numeric token is kept only
//! for logging.

use crate::constants::{fields, stop_reasons};
use crate::value::{Lookup, Tuple, Value, ValueError};
use std::fmt;

/// How a command completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

impl ResultClass {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "done" => Some(ResultClass::Done),
            "running" => Some(ResultClass::Running),
            "connected" => Some(ResultClass::Connected),
            "error" => Some(ResultClass::Error),
            "exit" => Some(ResultClass::Exit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultClass::Done => "done",
            ResultClass::Running => "running",
            ResultClass::Connected => "connected",
            ResultClass::Error => "error",
            ResultClass::Exit => "exit",
        }
    }
}

impl fmt::Display for ResultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Async record prefix: `*` exec, `+` status, `=` notify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    Exec,
    Status,
    Notify,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncClass {
    Stopped,
    Running,
    ThreadCreated,
    ThreadExited,
    ThreadSelected,
    ThreadGroupAdded,
    ThreadGroupStarted,
    ThreadGroupExited,
    LibraryLoaded,
    LibraryUnloaded,
    BreakpointCreated,
    BreakpointModified,
    BreakpointDeleted,
    /// clrdbg `=message`
    Message,
    Other(String),
}

impl AsyncClass {
    pub fn parse(text: &str) -> Self {
        match text {
            "stopped" => AsyncClass::Stopped,
            "running" => AsyncClass::Running,
            "thread-created" => AsyncClass::ThreadCreated,
            "thread-exited" => AsyncClass::ThreadExited,
            "thread-selected" => AsyncClass::ThreadSelected,
            "thread-group-added" => AsyncClass::ThreadGroupAdded,
            "thread-group-started" => AsyncClass::ThreadGroupStarted,
            "thread-group-exited" => AsyncClass::ThreadGroupExited,
            "library-loaded" => AsyncClass::LibraryLoaded,
            "library-unloaded" => AsyncClass::LibraryUnloaded,
            "breakpoint-created" => AsyncClass::BreakpointCreated,
            "breakpoint-modified" => AsyncClass::BreakpointModified,
            "breakpoint-deleted" => AsyncClass::BreakpointDeleted,
            "message" => AsyncClass::Message,
            other => AsyncClass::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AsyncClass::Stopped => "stopped",
            AsyncClass::Running => "running",
            AsyncClass::ThreadCreated => "thread-created",
            AsyncClass::ThreadExited => "thread-exited",
            AsyncClass::ThreadSelected => "thread-selected",
            AsyncClass::ThreadGroupAdded => "thread-group-added",
            AsyncClass::ThreadGroupStarted => "thread-group-started",
            AsyncClass::ThreadGroupExited => "thread-group-exited",
            AsyncClass::LibraryLoaded => "library-loaded",
            AsyncClass::LibraryUnloaded => "library-unloaded",
            AsyncClass::BreakpointCreated => "breakpoint-created",
            AsyncClass::BreakpointModified => "breakpoint-modified",
            AsyncClass::BreakpointDeleted => "breakpoint-deleted",
            AsyncClass::Message => "message",
            AsyncClass::Other(s) => s,
        }
    }
}

impl fmt::Display for AsyncClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream record channel: `~` console, `@` target, `&` log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamChannel {
    Console,
    Target,
    Log,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub token: Option<u64>,
    pub class: ResultClass,
    pub results: Tuple,
}

impl ResultRecord {
    /// `msg` of an `^error` record, if present
    pub fn error_message(&self) -> Option<String> {
        self.results.try_find_str(fields::MSG)
    }
}

impl Lookup for ResultRecord {
    fn lookup(&self, name: &str) -> Result<Option<&Value>, ValueError> {
        self.results.lookup(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsyncRecord {
    pub token: Option<u64>,
    pub kind: AsyncKind,
    pub class: AsyncClass,
    pub results: Tuple,
}

impl AsyncRecord {
    /// Project a `*stopped` record; `None` for any other class
    pub fn stop_event(&self) -> Option<StopEvent> {
        if self.class != AsyncClass::Stopped {
            return None;
        }
        Some(StopEvent {
            reason: self.results.try_find_str("reason"),
            thread_id: self.results.try_find_u32(fields::THREAD_ID),
            frame: self.results.find_tuple(fields::FRAME).ok().cloned(),
            signal_name: self.results.try_find_str("signal-name"),
            exit_code: self.results.try_find_str("exit-code"),
        })
    }
}

impl Lookup for AsyncRecord {
    fn lookup(&self, name: &str) -> Result<Option<&Value>, ValueError> {
        self.results.lookup(name)
    }
}

/// `*stopped` projection
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StopEvent {
    pub reason: Option<String>,
    pub thread_id: Option<u32>,
    pub frame: Option<Tuple>,
    pub signal_name: Option<String>,
    pub exit_code: Option<String>,
}

impl StopEvent {
    pub fn is_exit(&self) -> bool {
        matches!(
            self.reason.as_deref(),
            Some(
                stop_reasons::EXITED | stop_reasons::EXITED_NORMALLY | stop_reasons::EXITED_SIGNALLED
            )
        )
    }

    pub fn is_breakpoint_hit(&self) -> bool {
        self.reason.as_deref() == Some(stop_reasons::BREAKPOINT_HIT)
    }

    /// A step (`-exec-next`, `-exec-step`, ...) finished
    pub fn is_step_complete(&self) -> bool {
        self.reason.as_deref() == Some(stop_reasons::END_STEPPING_RANGE)
    }

    /// clrdbg stopped on a thrown exception
    pub fn is_exception(&self) -> bool {
        self.reason.as_deref() == Some(stop_reasons::EXCEPTION_RECEIVED)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub channel: StreamChannel,
    pub text: String,
}

/// One parsed line
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Result(ResultRecord),
    Async(AsyncRecord),
    Stream(StreamRecord),
    /// `(gdb)`
    Prompt,
    /// Command echo (`-...`) or blank line
    Noise(String),
    /// Anything else; the dialect may claim it, otherwise it is target output
    Unrecognized(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_class_round_trip_names() {
        for class in [
            ResultClass::Done,
            ResultClass::Running,
            ResultClass::Connected,
            ResultClass::Error,
            ResultClass::Exit,
        ] {
            assert_eq!(ResultClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(ResultClass::parse("stopped"), None);
    }

    #[test]
    fn test_unknown_async_class_is_kept() {
        let class = AsyncClass::parse("cmd-param-changed");
        assert_eq!(class, AsyncClass::Other("cmd-param-changed".to_string()));
        assert_eq!(class.to_string(), "cmd-param-changed");
    }

    fn stop(reason: &str) -> StopEvent {
        StopEvent {
            reason: Some(reason.to_string()),
            ..StopEvent::default()
        }
    }

    #[test]
    fn test_stop_reasons() {
        assert!(stop("exited-normally").is_exit());
        assert!(stop("exited-signalled").is_exit());
        assert!(!stop("signal-received").is_exit());
        assert!(stop("breakpoint-hit").is_breakpoint_hit());
        assert!(stop("end-stepping-range").is_step_complete());
        assert!(stop("exception-received").is_exception());
        assert!(!StopEvent::default().is_breakpoint_hit());
    }
}
