use super::{quote, ContextStyle, Dialect, DialectCapabilities, DialectKind};
use crate::commands::types::{DebuggerVersion, TargetArchitecture};
use crate::constants::{defaults, dialects};
use crate::error::{Error, Result};
use crate::protocol::ResultClass;

/// GNU gdb
#[derive(Debug, Clone, Copy, Default)]
pub struct Gdb;

impl Dialect for Gdb {
    fn kind(&self) -> DialectKind {
        DialectKind::Gdb
    }

    fn name(&self) -> &'static str {
        dialects::GDB
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            data_breakpoints: true,
            child_process_debugging: true,
            stop_on_dynamic_lib_load: true,
            ..DialectCapabilities::default()
        }
    }

    fn context_style(&self) -> ContextStyle {
        ContextStyle::Select
    }

    fn terminate(&self) -> (&'static str, Option<ResultClass>) {
        ("kill", None)
    }

    fn signal(&self, signal: &str) -> Result<String> {
        Ok(format!(
            "-interpreter-exec console {}",
            quote(&format!("signal {}", signal))
        ))
    }

    fn break_watch(&self, address: &str, size: u32) -> Result<String> {
        let cast = match size {
            1 => "char",
            2 => "short",
            4 => "int",
            8 => "double",
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unsupported watchpoint size {}",
                    other
                )))
            }
        };
        Ok(format!("-break-watch *({}*)({})", cast, address))
    }

    fn catch(&self, event: &str, once: bool) -> Result<String> {
        Ok(format!("{} {}", if once { "tcatch" } else { "catch" }, event))
    }

    fn set_env_command(&self, name: &str, value: &str) -> Result<String> {
        Ok(format!("set env {} {}", name, value))
    }

    fn list_target_features(&self) -> Result<&'static str> {
        Ok("-list-target-features")
    }

    fn start_addresses_command(&self, file: &str, line: u32) -> Option<String> {
        Some(format!("info line {}:{}", file, line))
    }

    fn target_architecture_command(&self) -> Option<&'static str> {
        Some("show architecture")
    }

    fn parse_target_architecture(&self, console: &str) -> TargetArchitecture {
        let text = console.to_ascii_lowercase();
        // order matters: "arm" is a prefix of "arm64"
        if text.contains("x86-64") {
            TargetArchitecture::X64
        } else if text.contains("i386") {
            TargetArchitecture::X86
        } else if text.contains("arm64") || text.contains("aarch64") {
            TargetArchitecture::Arm64
        } else if text.contains("arm") {
            TargetArchitecture::Arm
        } else if text.contains("mips") {
            TargetArchitecture::Mips
        } else {
            TargetArchitecture::Unknown
        }
    }

    fn async_mode_needs_version(&self) -> bool {
        true
    }

    fn async_mode_command(&self, version: Option<&DebuggerVersion>) -> Option<String> {
        let modern = version.is_some_and(|v| v.at_least(defaults::MI_ASYNC_MIN_VERSION));
        Some(if modern {
            "-gdb-set mi-async on".to_string()
        } else {
            "-gdb-set target-async on".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_sizes() {
        assert_eq!(
            Gdb.break_watch("0x601040", 4).unwrap(),
            "-break-watch *(int*)(0x601040)"
        );
        assert_eq!(
            Gdb.break_watch("0x601040", 8).unwrap(),
            "-break-watch *(double*)(0x601040)"
        );
        assert!(matches!(
            Gdb.break_watch("0x601040", 3),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_console_commands() {
        assert_eq!(Gdb.catch("throw", false).unwrap(), "catch throw");
        assert_eq!(Gdb.catch("fork", true).unwrap(), "tcatch fork");
        assert_eq!(
            Gdb.signal("SIGUSR1").unwrap(),
            r#"-interpreter-exec console "signal SIGUSR1""#
        );
        assert_eq!(
            Gdb.set_env_command("LANG", "C").unwrap(),
            "set env LANG C"
        );
    }

    #[test]
    fn test_architecture() {
        let arch = |s: &str| Gdb.parse_target_architecture(s);
        assert_eq!(
            arch("The target architecture is set to \"auto\" (currently \"i386:x86-64\").\n"),
            TargetArchitecture::X64
        );
        assert_eq!(arch("currently \"i386\""), TargetArchitecture::X86);
        assert_eq!(arch("currently \"aarch64\""), TargetArchitecture::Arm64);
        assert_eq!(arch("currently \"arm\""), TargetArchitecture::Arm);
        assert_eq!(arch("currently \"riscv\""), TargetArchitecture::Unknown);
    }

    #[test]
    fn test_async_mode_by_version() {
        let v = |text: &str| DebuggerVersion::scan(text);
        assert_eq!(
            Gdb.async_mode_command(v("GNU gdb 12.1").as_ref()).as_deref(),
            Some("-gdb-set mi-async on")
        );
        assert_eq!(
            Gdb.async_mode_command(v("GNU gdb 7.6.1").as_ref()).as_deref(),
            Some("-gdb-set target-async on")
        );
        assert_eq!(
            Gdb.async_mode_command(None).as_deref(),
            Some("-gdb-set target-async on")
        );
    }
}
