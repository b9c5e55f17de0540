//! MI session - correlates commands with replies over one line transport
//!
//! The session handles:
//! - FIFO request/reply matching (MI replies carry no correlation id we rely on)
//! - Async record and stream text fan-out to subscribers
//! - Readiness (first `(gdb)` prompt)
//! - Exit handling: pending commands fail with `DebuggerExited`, the context
//!   lock is closed
//! - Invalidation of the cached thread/frame selection on stop events
//! - Run state of the debuggee (`*running` / `^running` versus `*stopped`)

use crate::constants::fields;
use crate::error::{Error, Result};
use crate::lock::{ContextLock, ContextLockToken, HoldKind};
use crate::parser::{escape_c_string, parse_line};
use crate::protocol::{
    AsyncClass, AsyncRecord, Reply, ResultClass, ResultRecord, StreamChannel, StreamRecord,
};
use crate::transport::{self, Launch, LineTransport, TransportEvent, TransportEvents};
use crate::value::Lookup;
use midrive_config::{Config, SessionConfig};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Per-session launch facts consulted by dialects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Inspecting a core dump: nothing can be run
    pub core_dump: bool,
    /// Run the debuggee without debugging (clrdbg only)
    pub no_debug: bool,
}

/// What subscribers receive
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// `*`, `+` or `=` record
    Async(AsyncRecord),
    /// Console, target or log text. Lines the parser does not recognise
    /// arrive here as target output.
    Output(StreamRecord),
    /// Side-channel line from the transport
    StdErr(String),
    /// First prompt seen
    Ready,
    /// Something worth showing once (malformed line, `warn_once`)
    Warning(String),
    Exited { exit_code: Option<String> },
}

/// Per-command knobs
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Required result class; `None` accepts any reply, `^error` included
    pub expect: Option<ResultClass>,
    /// Overrides the session's request timeout
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl CommandOptions {
    pub fn expect(class: ResultClass) -> Self {
        Self {
            expect: Some(class),
            ..Self::default()
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Thread/frame the debugger is believed to have selected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub thread_id: Option<u32>,
    pub frame_level: Option<u32>,
}

/// Cached debugger-side selection.
///
/// Written only under an exclusive context hold. Stop events bump the
/// generation and clear the cache; a write based on an older generation is
/// dropped.
#[derive(Debug, Default)]
pub struct CurrentContext {
    selection: Mutex<Selection>,
    generation: AtomicU64,
}

impl CurrentContext {
    fn guard(&self) -> MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current selection and the generation it belongs to
    pub fn snapshot(&self) -> (Selection, u64) {
        let selection = self.guard();
        (*selection, self.generation.load(Ordering::Acquire))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Forget the selection; the next scoped command re-selects
    pub fn invalidate(&self) {
        let mut selection = self.guard();
        *selection = Selection::default();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Record a selection made while holding `token` exclusively.
    ///
    /// Returns `false` (and records nothing) when the cache was invalidated
    /// after `generation` was read.
    pub fn record(
        &self,
        token: &ContextLockToken,
        generation: u64,
        selection: Selection,
    ) -> Result<bool> {
        token.ensure_exclusive()?;
        let mut current = self.guard();
        if self.generation.load(Ordering::Acquire) != generation {
            return Ok(false);
        }
        *current = selection;
        Ok(true)
    }
}

/// Completion of one command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub record: ResultRecord,
    /// Console and log text that arrived while this command was at the head
    /// of the queue (only collected for console commands)
    pub console: String,
}

type CompletionSender = oneshot::Sender<Result<CommandOutput>>;

struct PendingCommand {
    command: String,
    expect: Option<ResultClass>,
    capture: Option<String>,
    tx: CompletionSender,
}

#[derive(Default)]
struct PendingQueue {
    queue: VecDeque<PendingCommand>,
    /// Set once the debugger is gone; carries its exit code
    exited: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Readiness {
    Starting,
    Ready,
    Exited(Option<String>),
}

struct Shared {
    pending: Mutex<PendingQueue>,
    subscribers: RwLock<Vec<mpsc::Sender<SessionEvent>>>,
    readiness: watch::Sender<Readiness>,
    context: CurrentContext,
    lock: ContextLock,
    running: AtomicBool,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, PendingQueue> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail everything outstanding; later commands fail immediately
    fn shut_down(&self, exit_code: Option<String>) -> bool {
        let drained: Vec<PendingCommand> = {
            let mut pending = self.pending();
            if pending.exited.is_some() {
                return false;
            }
            pending.exited = Some(exit_code.clone());
            pending.queue.drain(..).collect()
        };
        if !drained.is_empty() {
            debug!(pending = drained.len(), "Failing pending commands");
        }
        for cmd in drained {
            let _ = cmd.tx.send(Err(Error::DebuggerExited {
                exit_code: exit_code.clone(),
            }));
        }
        self.lock.close(Error::DebuggerExited {
            exit_code: exit_code.clone(),
        });
        self.context.invalidate();
        self.readiness.send_replace(Readiness::Exited(exit_code));
        true
    }

    async fn broadcast(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.write().await;
        let mut dropped_count = 0;
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                dropped_count += 1;
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if dropped_count > 0 {
            warn!(
                "Dropped session event for {} slow subscriber(s) - channel(s) full",
                dropped_count
            );
        }
    }
}

/// One debugging session over one transport
pub struct Session {
    transport: Arc<dyn LineTransport>,
    shared: Arc<Shared>,
    /// Serializes "enqueue + write" so queue order is wire order
    send_lane: tokio::sync::Mutex<()>,
    config: SessionConfig,
    options: SessionOptions,
    warned: Mutex<HashSet<String>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.transport.kind())
            .field("options", &self.options)
            .finish()
    }
}

impl Session {
    /// Wrap an open transport and start consuming its events
    pub fn start(
        transport: Box<dyn LineTransport>,
        events: TransportEvents,
        config: SessionConfig,
        options: SessionOptions,
    ) -> Self {
        let (readiness, _) = watch::channel(Readiness::Starting);
        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingQueue::default()),
            subscribers: RwLock::new(Vec::new()),
            readiness,
            context: CurrentContext::default(),
            lock: ContextLock::new(),
            running: AtomicBool::new(false),
        });
        let reader_task = tokio::spawn(read_events(events, shared.clone()));

        Self {
            transport: Arc::from(transport),
            shared,
            send_lane: tokio::sync::Mutex::new(()),
            config,
            options,
            warned: Mutex::new(HashSet::new()),
            reader_task: Mutex::new(Some(reader_task)),
        }
    }

    /// Open the channel described by `launch` and start a session on it
    pub async fn launch(launch: &Launch, config: &Config, options: SessionOptions) -> Result<Self> {
        let (transport, events) = transport::open(launch, &config.transport).await?;
        Ok(Self::start(transport, events, config.session.clone(), options))
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn context(&self) -> &CurrentContext {
        &self.shared.context
    }

    pub fn lock(&self) -> &ContextLock {
        &self.shared.lock
    }

    pub fn transport_kind(&self) -> &'static str {
        self.transport.kind()
    }

    pub fn debugger_pid(&self) -> Result<u32> {
        self.transport.debugger_pid()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending().queue.len()
    }

    pub fn has_exited(&self) -> bool {
        self.shared.pending().exited.is_some()
    }

    /// Whether the debuggee was last reported running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Fail with `InvalidState` while the debuggee runs
    pub fn ensure_stopped(&self, operation: &str) -> Result<()> {
        if self.is_running() {
            return Err(Error::InvalidState(format!(
                "{} needs a stopped target",
                operation
            )));
        }
        Ok(())
    }

    /// Subscribe to session events (bounded; slow subscribers miss events)
    pub async fn subscribe(&self) -> mpsc::Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity);
        let mut subscribers = self.shared.subscribers.write().await;
        subscribers.retain(|existing| !existing.is_closed());
        subscribers.push(tx);
        debug!(subscribers = subscribers.len(), "Session subscriber registered");
        rx
    }

    /// Run a command and wait for its reply, requiring `expect` if given
    pub async fn execute(&self, command: &str, expect: Option<ResultClass>) -> Result<ResultRecord> {
        self.execute_with(
            command,
            CommandOptions {
                expect,
                ..CommandOptions::default()
            },
        )
        .await
    }

    pub async fn execute_with(&self, command: &str, options: CommandOptions) -> Result<ResultRecord> {
        let rx = self.enqueue(command, options.expect, false).await?;
        self.wait(command, rx, &options)
            .await
            .map(|output| output.record)
    }

    /// Run a command and also collect the console and log text it produced
    pub async fn execute_captured(
        &self,
        command: &str,
        options: CommandOptions,
    ) -> Result<CommandOutput> {
        let rx = self.enqueue(command, options.expect, true).await?;
        self.wait(command, rx, &options).await
    }

    /// Send without waiting; the reply is consumed and dropped
    pub async fn post(&self, command: &str) -> Result<()> {
        let _ = self.enqueue(command, None, false).await?;
        Ok(())
    }

    /// Run a CLI command through `-interpreter-exec console` and return the
    /// console text it produced.
    ///
    /// Runs under an exclusive context hold: console commands may change the
    /// selected thread or frame behind the cache's back.
    pub async fn console(&self, text: &str) -> Result<String> {
        self.console_inner(text, false).await
    }

    /// Like [`console`](Self::console), but refused while the debuggee runs.
    /// The run state is checked again once the exclusive hold is granted.
    pub async fn console_when_stopped(&self, text: &str) -> Result<String> {
        self.console_inner(text, true).await
    }

    async fn console_inner(&self, text: &str, require_stopped: bool) -> Result<String> {
        if require_stopped {
            self.ensure_stopped("console command")?;
        }
        let mut token = self.shared.lock.acquire(HoldKind::Exclusive).await?;
        if require_stopped {
            if let Err(e) = self.ensure_stopped("console command") {
                token.release()?;
                return Err(e);
            }
        }
        let command = format!("-interpreter-exec console \"{}\"", escape_c_string(text));
        let outcome = self
            .execute_captured(&command, CommandOptions::expect(ResultClass::Done))
            .await;
        token.release()?;
        Ok(outcome?.console)
    }

    /// Resolves once the debugger printed its first prompt
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.shared.readiness.subscribe();
        let state = match tokio::time::timeout(
            timeout,
            rx.wait_for(|state| *state != Readiness::Starting),
        )
        .await
        {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => return Err(Error::ChannelClosed),
            Err(_) => return Err(Error::Timeout(timeout.as_millis() as u64)),
        };
        match state {
            Readiness::Exited(exit_code) => Err(Error::DebuggerExited { exit_code }),
            _ => Ok(()),
        }
    }

    /// Show `message` at most once per session for `key`; returns whether it
    /// was shown
    pub async fn warn_once(&self, key: &str, message: &str) -> bool {
        let first = self
            .warned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string());
        if first {
            warn!(key = %key, "{}", message);
            self.shared
                .broadcast(SessionEvent::Warning(message.to_string()))
                .await;
        }
        first
    }

    /// Close the transport and fail everything outstanding
    pub async fn close(&self) -> Result<()> {
        let closed = self.transport.close().await;
        self.shared.shut_down(None);
        let reader = self
            .reader_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = reader {
            let _ = handle.await;
        }
        info!(transport = self.transport.kind(), "Session closed");
        closed
    }

    /// Queue a command and write it. Queue order equals wire order.
    async fn enqueue(
        &self,
        command: &str,
        expect: Option<ResultClass>,
        capture: bool,
    ) -> Result<oneshot::Receiver<Result<CommandOutput>>> {
        let _lane = self.send_lane.lock().await;
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending();
            if let Some(exit_code) = &pending.exited {
                return Err(Error::DebuggerExited {
                    exit_code: exit_code.clone(),
                });
            }
            pending.queue.push_back(PendingCommand {
                command: command.to_string(),
                expect,
                capture: capture.then(String::new),
                tx,
            });
        }
        let mut unsent = Unsent {
            shared: &self.shared,
            armed: true,
        };
        let sent = self.transport.send(command).await;
        unsent.armed = false;
        match sent {
            Ok(()) => {
                debug!(command = %command, "Command sent");
                Ok(rx)
            }
            // refused before anything was written
            Err(e @ (Error::ChannelClosed | Error::InvalidState(_))) => {
                self.shared.pending().queue.pop_back();
                Err(e)
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Write failed, shutting the session down");
                self.shared.shut_down(None);
                Err(e)
            }
        }
    }

    async fn wait(
        &self,
        command: &str,
        rx: oneshot::Receiver<Result<CommandOutput>>,
        options: &CommandOptions,
    ) -> Result<CommandOutput> {
        let timeout = options.timeout.unwrap_or(self.config.request_timeout());
        let reply = async {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(Error::DebuggerExited { exit_code: None }),
                Err(_) => {
                    // the entry stays queued so its late reply is still consumed
                    warn!(command = %command, timeout_ms = timeout.as_millis() as u64, "Command timed out");
                    Err(Error::Timeout(timeout.as_millis() as u64))
                }
            }
        };
        match &options.cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                outcome = reply => outcome,
            },
            None => reply.await,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self
            .reader_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

/// A queued command whose write was abandoned midway.
///
/// Part of the line may already be on the wire, so the reply order can no
/// longer be trusted and the session is shut down.
struct Unsent<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl Drop for Unsent<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Command write abandoned, shutting the session down");
            self.shared.shut_down(None);
        }
    }
}

async fn read_events(mut events: TransportEvents, shared: Arc<Shared>) {
    debug!("Session reader started");
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Line(line) => handle_line(&line, &shared).await,
            TransportEvent::StdErr(line) => shared.broadcast(SessionEvent::StdErr(line)).await,
            TransportEvent::Exited { exit_code } => {
                info!(exit_code = ?exit_code, "Debugger exited");
                shared.shut_down(exit_code.clone());
                shared.broadcast(SessionEvent::Exited { exit_code }).await;
                break;
            }
        }
    }
    // channel gone without an exit event: closed on purpose
    shared.shut_down(None);
    debug!("Session reader stopped");
}

async fn handle_line(line: &str, shared: &Shared) {
    let reply = match parse_line(line) {
        Ok(reply) => reply,
        Err(err) => {
            if is_result_line(line) {
                // the command at the head is waiting for exactly this line
                let head = shared.pending().queue.pop_front();
                if let Some(cmd) = head {
                    warn!(command = %cmd.command, error = %err, "Malformed command result");
                    let err = err.with_command(cmd.command.clone());
                    let _ = cmd.tx.send(Err(Error::Parse(err)));
                    return;
                }
            }
            warn!(error = %err, "Ignoring malformed line");
            shared.broadcast(SessionEvent::Warning(err.to_string())).await;
            return;
        }
    };

    match reply {
        Reply::Result(record) => complete(record, shared),
        Reply::Async(record) => {
            match record.class {
                AsyncClass::Running => shared.running.store(true, Ordering::Release),
                AsyncClass::Stopped => shared.running.store(false, Ordering::Release),
                _ => {}
            }
            if matches!(record.class, AsyncClass::Stopped | AsyncClass::ThreadSelected) {
                trace!(class = %record.class, "Invalidating selected context");
                shared.context.invalidate();
            }
            shared.broadcast(SessionEvent::Async(record)).await;
        }
        Reply::Stream(record) => {
            if matches!(record.channel, StreamChannel::Console | StreamChannel::Log) {
                let mut pending = shared.pending();
                if let Some(capture) = pending.queue.front_mut().and_then(|c| c.capture.as_mut()) {
                    capture.push_str(&record.text);
                }
            }
            shared.broadcast(SessionEvent::Output(record)).await;
        }
        Reply::Prompt => {
            let became_ready = shared.readiness.send_if_modified(|state| {
                if *state == Readiness::Starting {
                    *state = Readiness::Ready;
                    true
                } else {
                    false
                }
            });
            if became_ready {
                info!("Debugger ready");
                shared.broadcast(SessionEvent::Ready).await;
            }
        }
        Reply::Noise(_) => {}
        Reply::Unrecognized(text) => {
            shared
                .broadcast(SessionEvent::Output(StreamRecord {
                    channel: StreamChannel::Target,
                    text,
                }))
                .await;
        }
    }
}

fn is_result_line(line: &str) -> bool {
    line.trim_start_matches(|c: char| c.is_ascii_digit())
        .starts_with('^')
}

/// Resolve the head of the queue with `record`
fn complete(record: ResultRecord, shared: &Shared) {
    let head = shared.pending().queue.pop_front();
    let Some(cmd) = head else {
        warn!(class = %record.class, "Result record with no pending command");
        return;
    };
    trace!(command = %cmd.command, class = %record.class, "Command completed");
    if record.class == ResultClass::Running {
        shared.running.store(true, Ordering::Release);
    }

    let outcome = match cmd.expect {
        None => Ok(record),
        Some(_) if record.class == ResultClass::Error => Err(Error::Debugger {
            command: cmd.command.clone(),
            msg: record.error_message().unwrap_or_default(),
            code: record.try_find_str(fields::CODE),
        }),
        Some(expected) if expected != record.class => Err(Error::UnexpectedResultClass {
            command: cmd.command.clone(),
            expected,
            actual: record.class,
        }),
        Some(_) => Ok(record),
    };
    let console = cmd.capture.unwrap_or_default();
    if cmd
        .tx
        .send(outcome.map(|record| CommandOutput { record, console }))
        .is_err()
    {
        debug!(command = %cmd.command, "Reply arrived after the caller gave up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::loopback;
    use midrive_config::TransportConfig;

    fn start_session() -> (Session, crate::transport::LoopbackPeer) {
        let (transport, events, peer) = loopback(&TransportConfig::default());
        let session = Session::start(
            Box::new(transport),
            events,
            SessionConfig::default(),
            SessionOptions::default(),
        );
        (session, peer)
    }

    #[tokio::test]
    async fn test_error_reply_is_structured() {
        let (session, mut peer) = start_session();
        let call = session.execute("-exec-continue", Some(ResultClass::Running));
        let debugger = async {
            assert_eq!(peer.next_command().await.as_deref(), Some("-exec-continue"));
            peer.reply(r#"^error,msg="The program is not being run.",code="undefined-command""#)
                .await
                .unwrap();
        };
        let (result, ()) = tokio::join!(call, debugger);
        assert_eq!(
            result,
            Err(Error::Debugger {
                command: "-exec-continue".to_string(),
                msg: "The program is not being run.".to_string(),
                code: Some("undefined-command".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_unexpected_result_class() {
        let (session, mut peer) = start_session();
        let call = session.execute("-exec-run", Some(ResultClass::Running));
        let debugger = async {
            peer.next_command().await;
            peer.reply("^done").await.unwrap();
        };
        let (result, ()) = tokio::join!(call, debugger);
        assert!(matches!(
            result,
            Err(Error::UnexpectedResultClass {
                expected: ResultClass::Running,
                actual: ResultClass::Done,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_any_accepts_error_reply() {
        let (session, mut peer) = start_session();
        let call = session.execute("-gdb-set output-radix 16", None);
        let debugger = async {
            peer.next_command().await;
            peer.reply(r#"^error,msg="nope""#).await.unwrap();
        };
        let (result, ()) = tokio::join!(call, debugger);
        let record = result.unwrap();
        assert_eq!(record.class, ResultClass::Error);
        assert_eq!(record.error_message().as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn test_console_captures_text() {
        let (session, mut peer) = start_session();
        let call = session.console("show architecture");
        let debugger = async {
            assert_eq!(
                peer.next_command().await.as_deref(),
                Some(r#"-interpreter-exec console "show architecture""#)
            );
            peer.reply(r#"~"The target architecture is set to \"auto\" (currently \"i386:x86-64\").\n""#)
                .await
                .unwrap();
            peer.reply("^done").await.unwrap();
        };
        let (result, ()) = tokio::join!(call, debugger);
        assert_eq!(
            result.unwrap(),
            "The target architecture is set to \"auto\" (currently \"i386:x86-64\").\n"
        );
        assert!(!session.lock().snapshot().exclusive);
    }

    #[tokio::test]
    async fn test_wait_ready_and_events() {
        let (session, mut peer) = start_session();
        let mut events = session.subscribe().await;
        peer.reply("=thread-group-added,id=\"i1\"").await.unwrap();
        peer.reply("(gdb)").await.unwrap();
        session.wait_ready(Duration::from_secs(5)).await.unwrap();

        match events.recv().await {
            Some(SessionEvent::Async(record)) => {
                assert_eq!(record.class, AsyncClass::ThreadGroupAdded)
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(events.recv().await, Some(SessionEvent::Ready));
    }

    #[tokio::test]
    async fn test_stopped_invalidates_context() {
        let (session, mut peer) = start_session();
        let generation = session.context().generation();
        let mut events = session.subscribe().await;
        peer.reply(r#"*stopped,reason="breakpoint-hit",thread-id="5""#)
            .await
            .unwrap();
        events.recv().await;
        assert!(session.context().generation() > generation);
        assert_eq!(session.context().snapshot().0, Selection::default());
    }

    #[tokio::test]
    async fn test_warn_once_is_per_session() {
        let (session, _peer) = start_session();
        assert!(session.warn_once("arm-emulator", "slow").await);
        assert!(!session.warn_once("arm-emulator", "slow").await);

        let (other, _peer) = start_session();
        assert!(other.warn_once("arm-emulator", "slow").await);
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_later_commands() {
        let (session, _peer) = start_session();
        session.post("-exec-continue").await.unwrap();
        assert_eq!(session.pending_count(), 1);

        session.close().await.unwrap();
        assert_eq!(session.pending_count(), 0);
        assert_eq!(
            session.execute("-exec-continue", None).await,
            Err(Error::DebuggerExited { exit_code: None })
        );
    }

    #[tokio::test]
    async fn test_running_state_follows_async_records() {
        let (session, mut peer) = start_session();
        let mut events = session.subscribe().await;
        assert!(!session.is_running());

        peer.reply(r#"*running,thread-id="all""#).await.unwrap();
        events.recv().await;
        assert!(session.is_running());
        assert!(matches!(
            session.console_when_stopped("info frame").await,
            Err(Error::InvalidState(_))
        ));
        assert!(!session.lock().snapshot().exclusive);

        peer.reply(r#"*stopped,reason="end-stepping-range",thread-id="1""#)
            .await
            .unwrap();
        events.recv().await;
        assert!(!session.is_running());
        assert!(session.ensure_stopped("console command").is_ok());
    }

    /// Fails every write with a fixed error
    struct FailingTransport(Error);

    #[async_trait::async_trait]
    impl LineTransport for FailingTransport {
        fn kind(&self) -> &'static str {
            "failing"
        }

        async fn send(&self, _line: &str) -> Result<()> {
            Err(self.0.clone())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn state(&self) -> transport::TransportState {
            transport::TransportState::Open
        }

        fn debugger_pid(&self) -> Result<u32> {
            Err(Error::PidUnavailable("failing"))
        }
    }

    fn failing_session(error: Error) -> (Session, mpsc::Sender<TransportEvent>) {
        let (tx, events) = mpsc::channel(8);
        let session = Session::start(
            Box::new(FailingTransport(error)),
            events,
            SessionConfig::default(),
            SessionOptions::default(),
        );
        (session, tx)
    }

    #[tokio::test]
    async fn test_failed_write_shuts_the_session_down() {
        let (session, _tx) = failing_session(Error::Transport("broken pipe".to_string()));
        assert_eq!(
            session.execute("-exec-continue", None).await,
            Err(Error::Transport("broken pipe".to_string()))
        );
        assert!(session.has_exited());
        assert_eq!(session.pending_count(), 0);
        assert_eq!(
            session.execute("-exec-next", None).await,
            Err(Error::DebuggerExited { exit_code: None })
        );
    }

    #[tokio::test]
    async fn test_refused_write_only_unqueues() {
        let (session, _tx) = failing_session(Error::ChannelClosed);
        assert_eq!(
            session.execute("-exec-continue", None).await,
            Err(Error::ChannelClosed)
        );
        assert!(!session.has_exited());
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_record_is_dropped_after_invalidation() {
        let context = CurrentContext::default();
        let lock = ContextLock::new();
        let token = lock.acquire(HoldKind::Exclusive).await.unwrap();
        let (_, generation) = context.snapshot();
        context.invalidate();
        let selection = Selection {
            thread_id: Some(2),
            frame_level: Some(0),
        };
        assert!(!context.record(&token, generation, selection).unwrap());
        assert!(context
            .record(&token, context.generation(), selection)
            .unwrap());
        assert_eq!(context.snapshot().0, selection);
    }
}
