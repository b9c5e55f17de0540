use super::{quote, Dialect, DialectCapabilities, DialectKind};
use crate::commands::types::TargetArchitecture;
use crate::constants::dialects;

/// lldb-mi
#[derive(Debug, Clone, Copy, Default)]
pub struct Lldb;

impl Dialect for Lldb {
    fn kind(&self) -> DialectKind {
        DialectKind::Lldb
    }

    fn name(&self) -> &'static str {
        dialects::LLDB
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::default()
    }

    // lldb-mi wants a floating var-object frame spelled "-"
    fn var_create(&self, expression: &str, _eval_flags: u32) -> String {
        format!("-var-create - - {}", quote(expression))
    }

    fn target_architecture_command(&self) -> Option<&'static str> {
        Some("platform status")
    }

    fn parse_target_architecture(&self, console: &str) -> TargetArchitecture {
        let Some(triple) = console.lines().find(|l| l.contains("Triple:")) else {
            return TargetArchitecture::Unknown;
        };
        let triple = triple.to_ascii_lowercase();
        if triple.contains("x86_64") {
            TargetArchitecture::X64
        } else if triple.contains("x86") || triple.contains("i386") {
            TargetArchitecture::X86
        } else if triple.contains("aarch64") || triple.contains("arm64") {
            TargetArchitecture::Arm64
        } else if triple.contains("arm") {
            TargetArchitecture::Arm
        } else {
            TargetArchitecture::Unknown
        }
    }
}
