//! Backend dialects
//!
//! A dialect turns the backend-independent command vocabulary into the exact
//! text one debugger accepts, and says what that debugger can do. The
//! defaults here are the common MI spelling; [`Gdb`], [`Lldb`] and [`Clrdbg`]
//! override only where their syntax or semantics differ.
//!
//! Dialects build text and never talk to the debugger themselves; execution,
//! locking and result projection live in [`CommandFactory`](crate::CommandFactory).

mod clrdbg;
mod gdb;
mod lldb;

pub use clrdbg::Clrdbg;
pub use gdb::Gdb;
pub use lldb::Lldb;

use crate::commands::types::{
    checksum_arguments, BreakLocation, BreakOptions, DebuggerVersion, ExceptionBreakState,
    ExceptionCategory, PrintValues, TargetArchitecture,
};
use crate::constants::{defaults, signals, stop_reasons};
use crate::error::{Error, Result};
use crate::parser::escape_c_string;
use crate::protocol::{ResultClass, StopEvent};
use crate::session::SessionOptions;
use crate::value::Tuple;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Static facts about a backend, fixed once the dialect is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DialectCapabilities {
    pub data_breakpoints: bool,
    pub child_process_debugging: bool,
    pub stop_on_dynamic_lib_load: bool,
    /// The debugger formats frames itself (no `-stack-list-arguments`)
    pub frame_formatting: bool,
    pub breakpoint_checksums: bool,
    pub commands_while_running: bool,
    pub exception_breakpoints: bool,
}

/// How thread/frame-scoped commands reach the right context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStyle {
    /// `-thread-select` / `-stack-select-frame`, then the command
    Select,
    /// `--thread N --frame M` appended to the command
    Flags,
}

/// Which backend a session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Gdb,
    Lldb,
    Clrdbg,
}

impl DialectKind {
    pub fn create(self) -> Box<dyn Dialect> {
        match self {
            DialectKind::Gdb => Box::new(Gdb),
            DialectKind::Lldb => Box::new(Lldb),
            DialectKind::Clrdbg => Box::new(Clrdbg),
        }
    }
}

impl std::str::FromStr for DialectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gdb" => Ok(DialectKind::Gdb),
            "lldb" => Ok(DialectKind::Lldb),
            "clrdbg" => Ok(DialectKind::Clrdbg),
            other => Err(Error::InvalidArgument(format!(
                "unknown debugger dialect '{}'",
                other
            ))),
        }
    }
}

/// Quote an argument for the MI command line
pub(crate) fn quote(text: &str) -> String {
    format!("\"{}\"", escape_c_string(text))
}

/// Dialect-specific command text.
///
/// Operations a backend cannot perform return `Error::NotSupported` before
/// anything is sent.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn kind(&self) -> DialectKind;

    /// Display name, used in `NotSupported` errors
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> DialectCapabilities;

    fn context_style(&self) -> ContextStyle {
        ContextStyle::Flags
    }

    fn unsupported(&self, operation: &'static str) -> Error {
        Error::not_supported(self.name(), operation)
    }

    // ------------------------------------------------------------------
    // Stack and variables
    // ------------------------------------------------------------------

    fn stack_list_arguments(&self, print: PrintValues, low: u32, high: u32) -> Result<String> {
        Ok(format!(
            "-stack-list-arguments {} {} {}",
            print.as_mi(),
            low,
            high
        ))
    }

    fn var_create(&self, expression: &str, _eval_flags: u32) -> String {
        format!("-var-create - * {}", quote(expression))
    }

    fn var_list_children(&self, name: &str, _property_flags: u32) -> String {
        format!(
            "-var-list-children --simple-values {} 0 {}",
            quote(name),
            defaults::MAX_CHILDREN
        )
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    fn exec_run(&self, _options: &SessionOptions) -> Result<String> {
        Ok("-exec-run".to_string())
    }

    fn exec_continue(&self, _options: &SessionOptions) -> Result<String> {
        Ok("-exec-continue".to_string())
    }

    /// Command and expected class used to kill the debuggee
    fn terminate(&self) -> (&'static str, Option<ResultClass>) {
        ("-exec-abort", None)
    }

    /// Command delivering `signal` to the debuggee and resuming it
    fn signal(&self, _signal: &str) -> Result<String> {
        Err(self.unsupported("signal"))
    }

    fn can_detach(&self) -> bool {
        true
    }

    fn is_async_break_signal(&self, stop: &StopEvent) -> bool {
        stop.reason.as_deref() == Some(stop_reasons::SIGNAL_RECEIVED)
            && stop.signal_name.as_deref() == Some(signals::SIGINT)
    }

    // ------------------------------------------------------------------
    // Breakpoints
    // ------------------------------------------------------------------

    fn break_insert(&self, location: &BreakLocation, options: &BreakOptions) -> Result<String> {
        let mut cmd = String::from("-break-insert -f ");
        if let Some(condition) = &options.condition {
            cmd.push_str("-c ");
            cmd.push_str(&quote(condition));
            cmd.push(' ');
        }
        if !options.enabled {
            cmd.push_str("-d ");
        }
        if !options.checksums.is_empty() {
            if !self.capabilities().breakpoint_checksums {
                return Err(self.unsupported("breakpoint checksums"));
            }
            if matches!(location, BreakLocation::Line { .. }) {
                cmd.push_str(&checksum_arguments(&options.checksums));
                cmd.push(' ');
            }
        }
        cmd.push_str(&location.to_mi());
        Ok(cmd)
    }

    /// Hardware watchpoint on `size` bytes at `address`
    fn break_watch(&self, _address: &str, _size: u32) -> Result<String> {
        Err(self.unsupported("data breakpoints"))
    }

    /// Console text for a catchpoint
    fn catch(&self, _event: &str, _once: bool) -> Result<String> {
        Err(self.unsupported("catch"))
    }

    fn exception_categories(&self) -> &'static [ExceptionCategory] {
        &[]
    }

    fn exception_insert(
        &self,
        _category: ExceptionCategory,
        _names: Option<&[String]>,
        _state: ExceptionBreakState,
    ) -> Result<String> {
        Err(self.unsupported("exception breakpoints"))
    }

    fn exception_delete(&self, _ids: &[u64]) -> Result<String> {
        Err(self.unsupported("exception breakpoints"))
    }

    /// Category and stage of an `exception-received` stop
    fn decode_exception_received(
        &self,
        _results: &Tuple,
    ) -> Result<(ExceptionCategory, ExceptionBreakState)> {
        Err(self.unsupported("exception breakpoints"))
    }

    // ------------------------------------------------------------------
    // Settings and probes
    // ------------------------------------------------------------------

    /// `None` when the backend has no such switch (treated as success)
    fn just_my_code(&self, _enabled: bool) -> Option<String> {
        None
    }

    fn step_filtering(&self, _enabled: bool) -> Option<String> {
        None
    }

    fn set_env_command(&self, _name: &str, _value: &str) -> Result<String> {
        Err(self.unsupported("set environment variable"))
    }

    fn list_target_features(&self) -> Result<&'static str> {
        Err(self.unsupported("list target features"))
    }

    /// Console command listing the addresses of a source line; `None` when
    /// the backend cannot answer
    fn start_addresses_command(&self, _file: &str, _line: u32) -> Option<String> {
        None
    }

    /// Console command whose output names the target architecture; `None`
    /// when the architecture is fixed
    fn target_architecture_command(&self) -> Option<&'static str> {
        None
    }

    fn parse_target_architecture(&self, _console: &str) -> TargetArchitecture {
        TargetArchitecture::Unknown
    }

    /// MI command printing the debugger version on the console stream
    fn version_command(&self) -> Option<&'static str> {
        Some("-gdb-version")
    }

    fn parse_version(&self, console: &str) -> Option<DebuggerVersion> {
        DebuggerVersion::scan(console)
    }

    /// Whether switching to async mode needs the version first
    fn async_mode_needs_version(&self) -> bool {
        false
    }

    /// Command switching the debugger to async execution; `None` when the
    /// backend is always async or has no such mode
    fn async_mode_command(&self, _version: Option<&DebuggerVersion>) -> Option<String> {
        None
    }
}

/// First `major.minor[.patch]` in `text`
pub(crate) fn scan_version(text: &str) -> Option<(u32, u32, Option<u32>)> {
    static PATTERN: OnceLock<Option<regex::Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| regex::Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").ok())
        .as_ref()?;
    let caps = pattern.captures(text)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = caps.get(3).and_then(|m| m.as_str().parse().ok());
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::types::{Checksum, HashAlgorithm};

    #[test]
    fn test_capability_table() {
        let gdb = Gdb.capabilities();
        assert!(gdb.data_breakpoints);
        assert!(gdb.child_process_debugging);
        assert!(gdb.stop_on_dynamic_lib_load);
        assert!(!gdb.breakpoint_checksums);

        let lldb = Lldb.capabilities();
        assert_eq!(lldb, DialectCapabilities::default());

        let clrdbg = Clrdbg.capabilities();
        assert!(clrdbg.frame_formatting);
        assert!(clrdbg.breakpoint_checksums);
        assert!(clrdbg.commands_while_running);
        assert!(clrdbg.exception_breakpoints);
        assert!(!clrdbg.data_breakpoints);
    }

    #[test]
    fn test_break_insert_common_form() {
        let location = BreakLocation::Line {
            file: "main.c".to_string(),
            line: 42,
        };
        let options = BreakOptions {
            condition: Some("i == \"x\"".to_string()),
            enabled: false,
            checksums: vec![],
        };
        assert_eq!(
            Gdb.break_insert(&location, &options).unwrap(),
            r#"-break-insert -f -c "i == \"x\"" -d main.c:42"#
        );
        assert_eq!(
            Lldb.break_insert(&BreakLocation::Function("main".to_string()), &BreakOptions::default())
                .unwrap(),
            "-break-insert -f main"
        );
    }

    #[test]
    fn test_checksums_need_capability() {
        let location = BreakLocation::Line {
            file: "Program.cs".to_string(),
            line: 7,
        };
        let options = BreakOptions {
            checksums: vec![
                Checksum::from_hex(HashAlgorithm::Sha1, "A0B1").unwrap(),
                Checksum::from_hex(HashAlgorithm::Md5, "ff00").unwrap(),
                Checksum::from_hex(HashAlgorithm::Sha1, "c2d3").unwrap(),
            ],
            ..BreakOptions::default()
        };
        assert_eq!(
            Clrdbg.break_insert(&location, &options).unwrap(),
            "-break-insert -f --SHA1checksum a0b1,c2d3 --MD5checksum ff00 Program.cs:7"
        );
        assert!(matches!(
            Gdb.break_insert(&location, &options),
            Err(Error::NotSupported { dialect: "GDB", .. })
        ));
    }

    #[test]
    fn test_async_break_signal() {
        let stop = StopEvent {
            reason: Some("signal-received".to_string()),
            signal_name: Some("SIGINT".to_string()),
            ..StopEvent::default()
        };
        assert!(Gdb.is_async_break_signal(&stop));
        let trap = StopEvent {
            signal_name: Some("SIGTRAP".to_string()),
            ..stop
        };
        assert!(!Gdb.is_async_break_signal(&trap));
    }

    #[test]
    fn test_signal_command_text() {
        assert_eq!(
            Gdb.signal("SIGUSR1").unwrap(),
            r#"-interpreter-exec console "signal SIGUSR1""#
        );
        assert!(matches!(
            Lldb.signal("SIGUSR1"),
            Err(Error::NotSupported { dialect: "LLDB", .. })
        ));
    }

    #[test]
    fn test_dialect_kind_from_str() {
        assert_eq!("GDB".parse::<DialectKind>().unwrap(), DialectKind::Gdb);
        assert_eq!(
            "clrdbg".parse::<DialectKind>().unwrap().create().name(),
            "clrdbg"
        );
        assert!("windbg".parse::<DialectKind>().is_err());
    }

    #[test]
    fn test_scan_version() {
        assert_eq!(scan_version("GNU gdb (GDB) 12.1\n"), Some((12, 1, None)));
        assert_eq!(
            scan_version("GNU gdb (Ubuntu 7.11.1-0ubuntu1~16.5) 7.11.1"),
            Some((7, 11, Some(1)))
        );
        assert_eq!(scan_version("no digits"), None);
    }
}
