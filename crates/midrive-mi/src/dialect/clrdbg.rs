use super::{quote, Dialect, DialectCapabilities, DialectKind};
use crate::commands::types::{
    ExceptionBreakState, ExceptionCategory, PrintValues, TargetArchitecture,
};
use crate::constants::{defaults, dialects};
use crate::error::{Error, Result};
use crate::protocol::ResultClass;
use crate::session::SessionOptions;
use crate::value::{Lookup, Tuple};

/// The managed-code debugger
#[derive(Debug, Clone, Copy, Default)]
pub struct Clrdbg;

impl Clrdbg {
    fn not_on_core_dump(options: &SessionOptions, what: &str) -> Result<()> {
        if options.core_dump {
            return Err(Error::InvalidState(format!(
                "cannot {} while debugging a core dump",
                what
            )));
        }
        Ok(())
    }
}

impl Dialect for Clrdbg {
    fn kind(&self) -> DialectKind {
        DialectKind::Clrdbg
    }

    fn name(&self) -> &'static str {
        dialects::CLRDBG
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            frame_formatting: true,
            breakpoint_checksums: true,
            commands_while_running: true,
            exception_breakpoints: true,
            ..DialectCapabilities::default()
        }
    }

    fn stack_list_arguments(&self, _print: PrintValues, _low: u32, _high: u32) -> Result<String> {
        Err(self.unsupported("stack list arguments"))
    }

    fn var_create(&self, expression: &str, eval_flags: u32) -> String {
        format!(
            "-var-create - * {} --evalFlags {}",
            quote(expression),
            eval_flags
        )
    }

    fn var_list_children(&self, name: &str, property_flags: u32) -> String {
        format!(
            "-var-list-children --simple-values {} --propertyInfoFlags {} 0 {}",
            quote(name),
            property_flags,
            defaults::MAX_CHILDREN
        )
    }

    fn exec_run(&self, options: &SessionOptions) -> Result<String> {
        Self::not_on_core_dump(options, "run")?;
        Ok(if options.no_debug {
            "-exec-run --noDebug".to_string()
        } else {
            "-exec-run".to_string()
        })
    }

    fn exec_continue(&self, options: &SessionOptions) -> Result<String> {
        Self::not_on_core_dump(options, "continue")?;
        Ok("-exec-continue".to_string())
    }

    fn terminate(&self) -> (&'static str, Option<ResultClass>) {
        ("-exec-abort", Some(ResultClass::Done))
    }

    fn exception_categories(&self) -> &'static [ExceptionCategory] {
        &[ExceptionCategory::Clr, ExceptionCategory::Mda]
    }

    fn exception_insert(
        &self,
        category: ExceptionCategory,
        names: Option<&[String]>,
        state: ExceptionBreakState,
    ) -> Result<String> {
        let mut cmd = String::from("-break-exception-insert ");
        if category == ExceptionCategory::Mda {
            cmd.push_str("--mda ");
        }
        cmd.push_str(state.as_mi());
        cmd.push(' ');
        match names {
            Some(names) if !names.is_empty() => cmd.push_str(&names.join(" ")),
            _ => cmd.push('*'),
        }
        Ok(cmd)
    }

    fn exception_delete(&self, ids: &[u64]) -> Result<String> {
        if ids.is_empty() {
            return Err(Error::InvalidArgument(
                "no exception breakpoints to delete".to_string(),
            ));
        }
        let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
        Ok(format!("-break-exception-delete {}", ids.join(" ")))
    }

    fn decode_exception_received(
        &self,
        results: &Tuple,
    ) -> Result<(ExceptionCategory, ExceptionBreakState)> {
        let category = match results.find_str("exception-category")?.as_str() {
            "clr" => ExceptionCategory::Clr,
            "mda" => ExceptionCategory::Mda,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unknown exception category '{}'",
                    other
                )))
            }
        };
        let state = match results.find_str("exception-stage")?.as_str() {
            "throw" => ExceptionBreakState::THROWN,
            "user-unhandled" => ExceptionBreakState::USER_UNHANDLED,
            "unhandled" => ExceptionBreakState::UNHANDLED,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unknown exception stage '{}'",
                    other
                )))
            }
        };
        Ok((category, state))
    }

    fn just_my_code(&self, enabled: bool) -> Option<String> {
        Some(format!("-gdb-set just-my-code {}", u8::from(enabled)))
    }

    fn step_filtering(&self, enabled: bool) -> Option<String> {
        Some(format!(
            "-gdb-set enable-step-filtering {}",
            u8::from(enabled)
        ))
    }

    fn parse_target_architecture(&self, _console: &str) -> TargetArchitecture {
        TargetArchitecture::X64
    }

    fn version_command(&self) -> Option<&'static str> {
        None
    }
}
