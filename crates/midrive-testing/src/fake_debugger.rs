//! Scripted stand-in for a debugger process
//!
//! [`FakeDebugger`] owns the peer end of a loopback transport. Every line the
//! engine sends is recorded and handed to a responder, whose output lines are
//! written back in order. Tests can also inject unsolicited lines (async
//! records, stream text) and simulate a process exit.

use midrive_config::{SessionConfig, TransportConfig};
use midrive_mi::{loopback, LoopbackPeer, Session, SessionOptions};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Maps one received command to the lines written back
pub type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

enum Control {
    Emit(String),
    StdErr(String),
    Exit(Option<String>),
}

/// Ordered prefix rules; the first rule whose prefix matches answers.
/// Adding a rule for a prefix that already has one replaces it in place.
#[derive(Debug, Clone, Default)]
pub struct Script {
    rules: Vec<(String, Vec<String>)>,
    fallback: Option<Vec<String>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `lines`
    pub fn on(mut self, prefix: &str, lines: &[&str]) -> Self {
        let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        match self.rules.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, existing)) => *existing = lines,
            None => self.rules.push((prefix.to_string(), lines)),
        }
        self
    }

    /// Answer anything unmatched with `lines` (default: `^done`)
    pub fn otherwise(mut self, lines: &[&str]) -> Self {
        self.fallback = Some(lines.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn respond(&self, command: &str) -> Vec<String> {
        self.rules
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, lines)| lines.clone())
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| vec!["^done".to_string()])
    }

    pub fn into_responder(self) -> Responder {
        Box::new(move |command| self.respond(command))
    }
}

/// A fake debugger driving the peer end of a loopback channel
pub struct FakeDebugger {
    control: mpsc::Sender<Control>,
    commands: Arc<Mutex<Vec<String>>>,
    received: Arc<Notify>,
    task: JoinHandle<()>,
}

impl FakeDebugger {
    /// Serve `peer`, answering each command with `responder`
    pub fn start(peer: LoopbackPeer, responder: Responder) -> Self {
        let (control, control_rx) = mpsc::channel(64);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Notify::new());
        let task = tokio::spawn(serve(
            peer,
            responder,
            control_rx,
            commands.clone(),
            received.clone(),
        ));
        Self {
            control,
            commands,
            received,
            task,
        }
    }

    /// A fake that never answers on its own; replies come from [`emit`](Self::emit)
    pub fn silent(peer: LoopbackPeer) -> Self {
        Self::start(peer, Box::new(|_| Vec::new()))
    }

    /// Every command received so far, in arrival order
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Forget recorded commands
    pub fn clear(&self) {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Wait until at least `count` commands were received
    pub async fn wait_for_commands(&self, count: usize) -> Vec<String> {
        loop {
            let notified = self.received.notified();
            let commands = self.commands();
            if commands.len() >= count {
                return commands;
            }
            notified.await;
        }
    }

    /// Write an unsolicited line on the primary channel
    pub async fn emit(&self, line: &str) {
        let _ = self.control.send(Control::Emit(line.to_string())).await;
    }

    pub async fn stderr(&self, line: &str) {
        let _ = self.control.send(Control::StdErr(line.to_string())).await;
    }

    /// Close stdout and stderr and report a process exit
    pub async fn exit(&self, exit_code: Option<&str>) {
        let _ = self
            .control
            .send(Control::Exit(exit_code.map(str::to_string)))
            .await;
    }
}

impl Drop for FakeDebugger {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut peer: LoopbackPeer,
    mut responder: Responder,
    mut control: mpsc::Receiver<Control>,
    commands: Arc<Mutex<Vec<String>>>,
    received: Arc<Notify>,
) {
    loop {
        tokio::select! {
            command = peer.next_command() => {
                let Some(command) = command else {
                    debug!("Engine closed the fake debugger's input");
                    break;
                };
                trace!(command = %command, "Fake debugger received");
                commands
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(command.clone());
                received.notify_waiters();
                for line in responder(&command) {
                    if peer.reply(&line).await.is_err() {
                        return;
                    }
                }
            }
            message = control.recv() => match message {
                Some(Control::Emit(line)) => {
                    let _ = peer.reply(&line).await;
                }
                Some(Control::StdErr(line)) => {
                    let _ = peer.stderr(&line).await;
                }
                Some(Control::Exit(exit_code)) => {
                    peer.close_stdout();
                    peer.close_stderr();
                    peer.exit(exit_code);
                }
                None => break,
            },
        }
    }
}

/// A session over a fresh loopback channel served by a fake debugger
pub fn fake_session(responder: Responder) -> (Arc<Session>, FakeDebugger) {
    fake_session_with(responder, SessionConfig::default(), SessionOptions::default())
}

pub fn fake_session_with(
    responder: Responder,
    config: SessionConfig,
    options: SessionOptions,
) -> (Arc<Session>, FakeDebugger) {
    let (transport, events, peer) = loopback(&TransportConfig::default());
    let session = Session::start(Box::new(transport), events, config, options);
    (Arc::new(session), FakeDebugger::start(peer, responder))
}
