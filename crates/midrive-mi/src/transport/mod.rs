//! Line transports
//!
//! Moves newline-delimited text between the engine and the debugger over one
//! of several channels. Every channel kind is reduced to the same pieces
//! ([`StreamParts`]) and driven by one [`StreamTransport`], so send ordering,
//! close semantics and exit reporting are identical across kinds.
//!
//! Received lines arrive on a bounded [`TransportEvents`] receiver. The last
//! event of a channel that was not closed intentionally is always
//! [`TransportEvent::Exited`].

pub mod config;
mod loopback;
mod pipe;
mod serial;
mod server;
mod shell;
mod stream;
mod tcp;
mod terminal;

pub use config::{DebugServerSpec, Launch, LaunchDescriptor, SerialLogin, TlsOptions};
pub use loopback::{loopback, LoopbackPeer};
pub use server::DebugServer;
pub use stream::{ExitFuture, StreamParts, StreamTransport};

use crate::error::Result;
use async_trait::async_trait;
use midrive_config::TransportConfig;
use tokio::sync::mpsc;
use tracing::info;

/// Something the channel reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One line from the primary channel, without its line terminator
    Line(String),
    /// One line from the side channel (stderr or equivalent)
    StdErr(String),
    /// The debugger went away without being asked to. `None` when the exit
    /// code is unknown (stream ended, network peer dropped).
    Exited { exit_code: Option<String> },
}

pub type TransportEvents = mpsc::Receiver<TransportEvent>;

/// `Created -> Open -> Closing -> Closed`, never backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportState {
    Created,
    Open,
    Closing,
    Closed,
}

/// A bidirectional line channel to a debugger
#[async_trait]
pub trait LineTransport: Send + Sync {
    /// Channel kind, e.g. `"tcp"`
    fn kind(&self) -> &'static str;

    /// Write one line. Fails with `ChannelClosed` once closing has begun.
    async fn send(&self, line: &str) -> Result<()>;

    /// Stop the channel. Safe to call more than once and from any task; no
    /// `Exited` event is raised for an intentional close.
    async fn close(&self) -> Result<()>;

    fn state(&self) -> TransportState;

    fn is_closed(&self) -> bool {
        self.state() >= TransportState::Closing
    }

    /// Platform pid of the debugger process, or `PidUnavailable` for
    /// channels where it cannot be known
    fn debugger_pid(&self) -> Result<u32>;
}

/// Open the channel described by `launch`
///
/// A companion debug server, if any, is started and awaited first; it lives
/// as long as the returned transport.
pub async fn open(
    launch: &Launch,
    config: &TransportConfig,
) -> Result<(Box<dyn LineTransport>, TransportEvents)> {
    let server = match &launch.server {
        Some(spec) => Some(DebugServer::start(spec, config).await?),
        None => None,
    };

    let kind = launch.target.kind();
    let parts = match &launch.target {
        LaunchDescriptor::Local {
            program,
            args,
            cwd,
            env,
        } => pipe::spawn(pipe::ProcessSpec {
            kind,
            program,
            args,
            cwd: cwd.as_deref(),
            env: Some(env),
            farewell: None,
            pid_is_debugger: true,
        })?,
        LaunchDescriptor::Pipe {
            program,
            args,
            cwd,
            farewell,
        } => pipe::spawn(pipe::ProcessSpec {
            kind,
            program,
            args,
            cwd: cwd.as_deref(),
            env: None,
            farewell: farewell.clone(),
            pid_is_debugger: false,
        })?,
        LaunchDescriptor::Tcp { host, port, tls } => {
            tcp::open(host, *port, tls.as_ref(), config).await?
        }
        LaunchDescriptor::Serial {
            port,
            baud_rate,
            login,
            prompt,
            startup,
        } => {
            serial::open(
                serial::SerialSpec {
                    port,
                    baud_rate: *baud_rate,
                    login: login.as_ref(),
                    prompt: prompt.as_deref(),
                    startup,
                },
                config,
            )
            .await?
        }
        LaunchDescriptor::Shell {
            host,
            user,
            command,
            ssh,
            ssh_args,
        } => shell::open(host, user.as_deref(), command, ssh, ssh_args).await?,
        LaunchDescriptor::Terminal {
            program,
            args,
            terminal,
            terminal_args,
        } => terminal::open(program, args, terminal, terminal_args, config).await?,
    };

    let (transport, events) = StreamTransport::start(parts.companion(server), config);
    if let Err(e) = transport.run_startup().await {
        let _ = transport.close().await;
        return Err(e);
    }
    info!(transport = kind, "Debugger channel ready");
    Ok((Box::new(transport), events))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        assert!(TransportState::Created < TransportState::Open);
        assert!(TransportState::Open < TransportState::Closing);
        assert!(TransportState::Closing < TransportState::Closed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_local_reports_exit() {
        let launch = Launch::local("sh", vec!["-c".to_string(), "echo '(gdb)'".to_string()]);
        let (transport, mut events) = open(&launch, &TransportConfig::default()).await.unwrap();
        assert_eq!(transport.kind(), "local");

        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Line("(gdb)".to_string()))
        );
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Exited {
                exit_code: Some("0".to_string())
            })
        );
        assert!(transport.is_closed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipe_close_sends_farewell() {
        let launch = Launch::new(LaunchDescriptor::Pipe {
            program: "sh".to_string(),
            args: vec![],
            cwd: None,
            farewell: Some("exit 0".to_string()),
        });
        let (transport, mut events) = open(&launch, &TransportConfig::default()).await.unwrap();
        assert_eq!(
            transport.debugger_pid(),
            Err(crate::error::Error::PidUnavailable("pipe"))
        );

        transport.send("echo '^done'").await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Line("^done".to_string()))
        );

        transport.close().await.unwrap();
        assert_eq!(transport.state(), TransportState::Closed);
        assert_eq!(events.recv().await, None);
    }
}
