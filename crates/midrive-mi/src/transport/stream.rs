//! Line channel core shared by every transport kind
//!
//! A [`StreamTransport`] owns one writer and up to two readers (primary and
//! side channel). Each reader is a background task that owns its handle;
//! `close()` asks them to stop through a cancellation token instead of
//! pulling the handle out from under an in-flight read.
//!
//! Exit reporting is done by a single supervisor task, so it happens at most
//! once:
//!
//! - process exit: wait until both readers drain or the drain grace elapses,
//!   whichever first, then report `Exited` with the process's code
//! - primary EOF/error first: wait up to the abort probe for the process to
//!   exit; if it does not, report an abnormal exit (`exit_code: None`)
//! - intentional close: no exit event

use super::server::DebugServer;
use super::{LineTransport, TransportEvent, TransportEvents, TransportState};
use crate::error::{Error, Result};
use async_trait::async_trait;
use midrive_config::TransportConfig;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
/// Resolves when the debugger process exits, with its exit code if known
pub type ExitFuture = Pin<Box<dyn Future<Output = Option<String>> + Send>>;

/// Forward-only transport state
pub(crate) struct StateCell(Mutex<TransportState>);

impl StateCell {
    fn new(state: TransportState) -> Self {
        Self(Mutex::new(state))
    }

    pub(crate) fn get(&self) -> TransportState {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `to` if that is forward; returns whether the state changed
    pub(crate) fn advance(&self, to: TransportState) -> bool {
        let mut state = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if to > *state {
            *state = to;
            true
        } else {
            false
        }
    }
}

/// Raw pieces of a channel, assembled by each transport kind
pub struct StreamParts {
    kind: &'static str,
    writer: BoxedWriter,
    stdout: BoxedReader,
    stderr: Option<BoxedReader>,
    exit: Option<ExitFuture>,
    pid: Option<u32>,
    farewell: Option<String>,
    filter_echo: bool,
    startup: Vec<String>,
    companion: Option<DebugServer>,
}

impl std::fmt::Debug for StreamParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParts")
            .field("kind", &self.kind)
            .field("pid", &self.pid)
            .field("companion", &self.companion)
            .finish()
    }
}

impl StreamParts {
    pub fn new(
        kind: &'static str,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        stdout: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            kind,
            writer: Box::new(writer),
            stdout: Box::new(stdout),
            stderr: None,
            exit: None,
            pid: None,
            farewell: None,
            filter_echo: false,
            startup: Vec::new(),
            companion: None,
        }
    }

    /// Side channel, surfaced as `TransportEvent::StdErr`
    pub fn stderr(mut self, stderr: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(stderr));
        self
    }

    /// Process exit notification; without one only EOF ends the channel
    pub fn exit(mut self, exit: impl Future<Output = Option<String>> + Send + 'static) -> Self {
        self.exit = Some(Box::pin(exit));
        self
    }

    pub fn pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn farewell(mut self, farewell: Option<String>) -> Self {
        self.farewell = farewell;
        self
    }

    /// Drop a received line equal to the last sent one (terminal echo)
    pub fn filter_echo(mut self, enabled: bool) -> Self {
        self.filter_echo = enabled;
        self
    }

    /// Lines written right after the channel opens, before any command
    pub fn startup(mut self, lines: Vec<String>) -> Self {
        self.startup = lines;
        self
    }

    pub(crate) fn companion(mut self, companion: Option<DebugServer>) -> Self {
        self.companion = companion;
        self
    }
}

enum ReaderEnd {
    Eof,
    Failed(String),
    Stopped,
}

/// A line transport over arbitrary async byte streams
pub struct StreamTransport {
    kind: &'static str,
    writer: tokio::sync::Mutex<BoxedWriter>,
    state: Arc<StateCell>,
    closing: CancellationToken,
    pid: Option<u32>,
    farewell: Option<String>,
    last_sent: Option<Arc<Mutex<Option<String>>>>,
    send_timeout: Duration,
    startup: Mutex<Vec<String>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    companion: Mutex<Option<DebugServer>>,
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("kind", &self.kind)
            .field("state", &self.state.get())
            .field("pid", &self.pid)
            .finish()
    }
}

impl StreamTransport {
    /// Start the reader and supervisor tasks; the transport is open on return
    pub fn start(parts: StreamParts, config: &TransportConfig) -> (Self, TransportEvents) {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let state = Arc::new(StateCell::new(TransportState::Created));
        let closing = CancellationToken::new();
        let last_sent = parts.filter_echo.then(|| Arc::new(Mutex::new(None)));

        let stdout_task = tokio::spawn(read_lines(
            parts.stdout,
            tx.clone(),
            false,
            closing.clone(),
            last_sent.clone(),
        ));
        let stderr_task = parts.stderr.map(|stderr| {
            tokio::spawn(read_lines(stderr, tx.clone(), true, closing.clone(), None))
        });

        let supervisor = tokio::spawn(supervise(
            parts.kind,
            stdout_task,
            stderr_task,
            parts.exit,
            tx,
            state.clone(),
            closing.clone(),
            config.exit_drain_grace(),
            config.stdout_abort_probe(),
        ));

        state.advance(TransportState::Open);
        debug!(transport = parts.kind, pid = ?parts.pid, "Transport open");

        let transport = Self {
            kind: parts.kind,
            writer: tokio::sync::Mutex::new(parts.writer),
            state,
            closing,
            pid: parts.pid,
            farewell: parts.farewell,
            last_sent,
            send_timeout: config.connection_timeout(),
            startup: Mutex::new(parts.startup),
            supervisor: Mutex::new(Some(supervisor)),
            companion: Mutex::new(parts.companion),
        };
        (transport, rx)
    }

    /// Write the startup lines (remote debugger command line, serial startup)
    pub async fn run_startup(&self) -> Result<()> {
        let lines = std::mem::take(&mut *self.startup.lock().unwrap_or_else(|e| e.into_inner()));
        for line in lines {
            debug!(transport = self.kind, "Startup: {}", line);
            self.send(&line).await?;
        }
        Ok(())
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let write = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        match tokio::time::timeout(self.send_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Transport(format!(
                "{} write failed: {}",
                self.kind, e
            ))),
            Err(_) => Err(Error::Transport(format!(
                "{} write did not complete within {}ms",
                self.kind,
                self.send_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl LineTransport for StreamTransport {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn send(&self, line: &str) -> Result<()> {
        match self.state.get() {
            TransportState::Open => {}
            TransportState::Created => {
                return Err(Error::InvalidState("transport is not open".to_string()))
            }
            TransportState::Closing | TransportState::Closed => return Err(Error::ChannelClosed),
        }
        if let Some(last_sent) = &self.last_sent {
            *last_sent.lock().unwrap_or_else(|e| e.into_inner()) = Some(line.to_string());
        }
        trace!(transport = self.kind, "-> {}", line);
        self.write_line(line).await
    }

    async fn close(&self) -> Result<()> {
        if !self.state.advance(TransportState::Closing) {
            return Ok(());
        }
        debug!(transport = self.kind, "Closing transport");

        if let Some(farewell) = &self.farewell {
            if let Err(e) = self.write_line(farewell).await {
                debug!(transport = self.kind, error = %e, "Farewell not delivered");
            }
        }
        self.closing.cancel();
        {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }

        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = supervisor {
            let _ = handle.await;
        }
        // dropping the companion kills it
        let companion = self
            .companion
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(companion);

        self.state.advance(TransportState::Closed);
        info!(transport = self.kind, "Transport closed");
        Ok(())
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    fn debugger_pid(&self) -> Result<u32> {
        self.pid.ok_or(Error::PidUnavailable(self.kind))
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.closing.cancel();
    }
}

async fn read_lines(
    reader: BoxedReader,
    tx: mpsc::Sender<TransportEvent>,
    side_channel: bool,
    closing: CancellationToken,
    last_sent: Option<Arc<Mutex<Option<String>>>>,
) -> ReaderEnd {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            _ = closing.cancelled() => return ReaderEnd::Stopped,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => return ReaderEnd::Eof,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if let Some(last_sent) = &last_sent {
                    let mut last = last_sent.lock().unwrap_or_else(|e| e.into_inner());
                    if last.as_deref() == Some(line.as_str()) {
                        *last = None;
                        continue;
                    }
                }
                let event = if side_channel {
                    trace!("<-(stderr) {}", line);
                    TransportEvent::StdErr(line)
                } else {
                    trace!("<- {}", line);
                    TransportEvent::Line(line)
                };
                if tx.send(event).await.is_err() {
                    return ReaderEnd::Stopped;
                }
            }
            Err(e) => return ReaderEnd::Failed(e.to_string()),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn supervise(
    kind: &'static str,
    mut stdout_task: JoinHandle<ReaderEnd>,
    mut stderr_task: Option<JoinHandle<ReaderEnd>>,
    exit: Option<ExitFuture>,
    tx: mpsc::Sender<TransportEvent>,
    state: Arc<StateCell>,
    closing: CancellationToken,
    drain_grace: Duration,
    abort_probe: Duration,
) {
    let mut exit: ExitFuture = exit.unwrap_or_else(|| Box::pin(std::future::pending()));

    let exit_code = tokio::select! {
        _ = closing.cancelled() => return,
        code = &mut exit => {
            debug!(transport = kind, exit_code = ?code, "Debugger process exited, draining output");
            drain(&mut stdout_task, stderr_task.as_mut(), drain_grace, &closing).await;
            code
        }
        end = &mut stdout_task => {
            if closing.is_cancelled() {
                return;
            }
            match end {
                Ok(ReaderEnd::Failed(e)) => warn!(transport = kind, error = %e, "Primary channel read failed"),
                Ok(_) => debug!(transport = kind, "Primary channel reached end of stream"),
                Err(e) => warn!(transport = kind, error = %e, "Primary channel reader panicked"),
            }
            match tokio::time::timeout(abort_probe, &mut exit).await {
                Ok(code) => {
                    if let Some(stderr) = stderr_task.as_mut() {
                        let _ = tokio::time::timeout(drain_grace, stderr).await;
                    }
                    code
                }
                Err(_) => {
                    warn!(transport = kind, "Primary channel ended while the process is still running, treating as abnormal exit");
                    None
                }
            }
        }
    };

    if closing.is_cancelled() {
        return;
    }
    state.advance(TransportState::Closed);
    info!(transport = kind, exit_code = ?exit_code, "Debugger exited");
    let _ = tx.send(TransportEvent::Exited { exit_code }).await;
}

/// Wait for both readers to finish, bounded by `grace`
async fn drain(
    stdout_task: &mut JoinHandle<ReaderEnd>,
    stderr_task: Option<&mut JoinHandle<ReaderEnd>>,
    grace: Duration,
    closing: &CancellationToken,
) {
    let both = async {
        let _ = stdout_task.await;
        if let Some(stderr) = stderr_task {
            let _ = stderr.await;
        }
    };
    tokio::select! {
        _ = both => {}
        _ = tokio::time::sleep(grace) => {
            debug!(grace_ms = grace.as_millis() as u64, "Output drain grace elapsed");
        }
        _ = closing.cancelled() => {}
    }
}
