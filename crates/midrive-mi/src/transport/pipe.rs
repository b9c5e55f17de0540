//! Local child-process channels
//!
//! The debugger (or a launcher piping a remote one) runs as a child with
//! piped stdio. stdout is the primary channel, stderr the side channel.

use super::stream::StreamParts;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::info;

pub(crate) struct ProcessSpec<'a> {
    pub kind: &'static str,
    pub program: &'a str,
    pub args: &'a [String],
    pub cwd: Option<&'a Path>,
    pub env: Option<&'a HashMap<String, String>>,
    pub farewell: Option<String>,
    /// Whether the child's pid is the debugger's pid
    pub pid_is_debugger: bool,
}

/// Spawn a child and wrap its stdio
pub(crate) fn spawn(spec: ProcessSpec<'_>) -> Result<StreamParts> {
    info!(
        transport = spec.kind,
        "Launching debugger: {} {}",
        spec.program,
        spec.args.join(" ")
    );

    let mut cmd = Command::new(spec.program);
    cmd.args(spec.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = spec.cwd {
        cmd.current_dir(cwd);
    }
    if let Some(env) = spec.env {
        for (key, value) in env {
            cmd.env(key, value);
        }
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Transport(format!("failed to start {}: {}", spec.program, e)))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Transport("Failed to get stdin".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Transport("Failed to get stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Transport("Failed to get stderr".to_string()))?;
    let pid = if spec.pid_is_debugger { child.id() } else { None };

    Ok(StreamParts::new(spec.kind, stdin, stdout)
        .stderr(stderr)
        .pid(pid)
        .farewell(spec.farewell)
        .exit(wait_for_exit(child)))
}

/// Resolves with the child's exit code; the child is killed if this future is
/// dropped first
pub(crate) async fn wait_for_exit(mut child: Child) -> Option<String> {
    match child.wait().await {
        Ok(status) => describe_status(status),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to wait for debugger process");
            None
        }
    }
}

fn describe_status(status: std::process::ExitStatus) -> Option<String> {
    if let Some(code) = status.code() {
        return Some(code.to_string());
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(format!("signal {}", signal));
        }
    }
    None
}
