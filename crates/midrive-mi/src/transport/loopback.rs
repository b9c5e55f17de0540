//! In-memory channel
//!
//! The engine side is an ordinary [`StreamTransport`]; the other side is a
//! [`LoopbackPeer`] that plays the debugger. Used by tests and by embedders
//! that host a debugger in-process.

use super::stream::{StreamParts, StreamTransport};
use super::TransportEvents;
use crate::constants::transport::LOOPBACK;
use crate::error::{Error, Result};
use midrive_config::TransportConfig;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::oneshot;

const BUFFER_SIZE: usize = 64 * 1024;

/// The debugger's end of a loopback channel
pub struct LoopbackPeer {
    commands: Lines<BufReader<DuplexStream>>,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    exit: Option<oneshot::Sender<Option<String>>>,
}

/// Create a connected transport and peer
pub fn loopback(config: &TransportConfig) -> (StreamTransport, TransportEvents, LoopbackPeer) {
    let (to_peer, from_engine) = duplex(BUFFER_SIZE);
    let (peer_stdout, from_peer) = duplex(BUFFER_SIZE);
    let (peer_stderr, from_peer_err) = duplex(BUFFER_SIZE);
    let (exit_tx, exit_rx) = oneshot::channel::<Option<String>>();

    let parts = StreamParts::new(LOOPBACK, to_peer, from_peer)
        .stderr(from_peer_err)
        .exit(async move {
            match exit_rx.await {
                Ok(code) => code,
                // peer dropped without exiting: only EOF ends the channel
                Err(_) => std::future::pending().await,
            }
        });
    let (transport, events) = StreamTransport::start(parts, config);

    let peer = LoopbackPeer {
        commands: BufReader::new(from_engine).lines(),
        stdout: Some(peer_stdout),
        stderr: Some(peer_stderr),
        exit: Some(exit_tx),
    };
    (transport, events, peer)
}

impl LoopbackPeer {
    /// Next line the engine sent, `None` once the engine closed its side
    pub async fn next_command(&mut self) -> Option<String> {
        self.commands.next_line().await.ok().flatten()
    }

    /// Write one line on the primary channel
    pub async fn reply(&mut self, line: &str) -> Result<()> {
        let stdout = self.stdout.as_mut().ok_or(Error::ChannelClosed)?;
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        Ok(())
    }

    /// Write one line on the side channel
    pub async fn stderr(&mut self, line: &str) -> Result<()> {
        let stderr = self.stderr.as_mut().ok_or(Error::ChannelClosed)?;
        stderr.write_all(line.as_bytes()).await?;
        stderr.write_all(b"\n").await?;
        Ok(())
    }

    /// End the primary channel (EOF) without reporting a process exit
    pub fn close_stdout(&mut self) {
        self.stdout = None;
    }

    pub fn close_stderr(&mut self) {
        self.stderr = None;
    }

    /// Report process exit; output already written is still delivered first
    pub fn exit(&mut self, exit_code: Option<String>) {
        if let Some(tx) = self.exit.take() {
            let _ = tx.send(exit_code);
        }
    }
}
