//! Companion debug server (gdbserver, debugserver, ...)
//!
//! Started before the main channel opens. Readiness is the first output line
//! matching the configured pattern; no match within
//! `server_started_timeout_ms` kills the server and fails with
//! `ConnectTimeout`.

use super::config::DebugServerSpec;
use crate::error::{Error, Result};
use midrive_config::TransportConfig;
use regex::Regex;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A running companion server; killed on drop
pub struct DebugServer {
    program: String,
    child: Child,
    pid: Option<u32>,
    drain: JoinHandle<()>,
}

impl std::fmt::Debug for DebugServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugServer")
            .field("program", &self.program)
            .field("pid", &self.pid)
            .finish()
    }
}

impl DebugServer {
    pub async fn start(spec: &DebugServerSpec, config: &TransportConfig) -> Result<Self> {
        let pattern = Regex::new(&spec.started_pattern).map_err(|e| {
            Error::InvalidArgument(format!(
                "invalid started pattern '{}': {}",
                spec.started_pattern, e
            ))
        })?;

        info!(program = %spec.program, args = ?spec.args, "Starting debug server");
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Transport(format!("failed to start {}: {}", spec.program, e))
            })?;
        let pid = child.id();

        let (tx, mut rx) = mpsc::channel::<String>(64);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let timeout = config.server_started_timeout();
        let ready = tokio::time::timeout(timeout, async {
            while let Some(line) = rx.recv().await {
                debug!(server = %spec.program, "{}", line);
                if pattern.is_match(&line) {
                    return true;
                }
            }
            false
        })
        .await;

        match ready {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::Transport(format!(
                    "{} exited before reporting readiness",
                    spec.program
                )))
            }
            Err(_) => {
                warn!(
                    program = %spec.program,
                    timeout_ms = timeout.as_millis() as u64,
                    "Debug server did not report readiness, killing it"
                );
                let _ = child.start_kill();
                return Err(Error::ConnectTimeout(format!(
                    "{} did not report readiness within {}ms",
                    spec.program,
                    timeout.as_millis()
                )));
            }
        }

        info!(program = %spec.program, pid = ?pid, "Debug server ready");
        let program = spec.program.clone();
        let log_name = program.clone();
        let drain = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                debug!(server = %log_name, "{}", line);
            }
        });

        Ok(Self {
            program,
            child,
            pid,
            drain,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the server process is still running
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for DebugServer {
    fn drop(&mut self) {
        self.drain.abort();
        let _ = self.child.start_kill();
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spec(script: &str, pattern: &str) -> DebugServerSpec {
        DebugServerSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            started_pattern: pattern.to_string(),
        }
    }

    #[tokio::test]
    async fn test_ready_on_banner() {
        let config = TransportConfig::default();
        let mut server = DebugServer::start(
            &spec("echo 'Listening on port 2345'; sleep 5", r"Listening on port \d+"),
            &config,
        )
        .await
        .unwrap();
        assert!(server.pid().is_some());
        assert!(server.is_running());
    }

    #[tokio::test]
    async fn test_timeout_without_banner() {
        let mut config = TransportConfig::default();
        config.server_started_timeout_ms = 100;
        let err = DebugServer::start(&spec("sleep 5", "never"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectTimeout(_)));
    }

    #[tokio::test]
    async fn test_exit_before_banner() {
        let config = TransportConfig::default();
        let err = DebugServer::start(&spec("echo starting; exit 1", "ready"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_invalid_pattern() {
        let config = TransportConfig::default();
        let err = DebugServer::start(&spec("true", "(unclosed"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
