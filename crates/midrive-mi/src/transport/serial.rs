//! Serial console channel
//!
//! 8N1, no flow control. An optional login handshake runs on the raw port
//! before the debugger is started: wake the console, answer `login:` (and
//! `Password:`), then wait for the shell prompt. The console echoes what we
//! send, so the channel filters the echo of the last sent line.

use super::config::SerialLogin;
use super::stream::StreamParts;
use crate::constants::transport::{LOGIN_PROMPT, SERIAL, SHELL_PROMPT};
use crate::error::{Error, Result};
use midrive_config::TransportConfig;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tracing::{debug, info};

pub(crate) struct SerialSpec<'a> {
    pub port: &'a str,
    pub baud_rate: Option<u32>,
    pub login: Option<&'a SerialLogin>,
    pub prompt: Option<&'a str>,
    pub startup: &'a [String],
}

pub(crate) async fn open(spec: SerialSpec<'_>, config: &TransportConfig) -> Result<StreamParts> {
    let baud = spec.baud_rate.unwrap_or(config.serial_baud_rate);
    info!(port = %spec.port, baud, "Opening serial port");

    let mut port = tokio_serial::new(spec.port, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(|e| Error::Transport(format!("failed to open {}: {}", spec.port, e)))?;

    if let Some(login) = spec.login {
        let prompt = spec.prompt.unwrap_or(SHELL_PROMPT);
        handshake(&mut port, login, prompt, config).await?;
    }

    let (reader, writer) = tokio::io::split(port);
    Ok(StreamParts::new(SERIAL, writer, reader)
        .filter_echo(true)
        .startup(spec.startup.to_vec()))
}

/// Log in on a serial console
pub(crate) async fn handshake<S>(
    port: &mut S,
    login: &SerialLogin,
    prompt: &str,
    config: &TransportConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = Instant::now() + config.connection_timeout();
    let idle = config.serial_read_idle();

    port.write_all(b"\n").await?;
    read_until_contains(port, LOGIN_PROMPT, idle, deadline).await?;
    port.write_all(format!("{}\n", login.user).as_bytes()).await?;

    if let Some(password) = &login.password {
        read_until_contains(port, "assword:", idle, deadline).await?;
        port.write_all(format!("{}\n", password).as_bytes()).await?;
    }

    read_until_contains(port, prompt, idle, deadline).await?;
    port.flush().await?;
    debug!(user = %login.user, "Serial login complete");
    Ok(())
}

/// Read until `needle` shows up in the accumulated text.
///
/// Each read waits at most `idle`; an idle window without data just re-polls
/// until `deadline`.
async fn read_until_contains<S>(
    port: &mut S,
    needle: &str,
    idle: Duration,
    deadline: Instant,
) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut seen = String::new();
    let mut chunk = [0u8; 256];
    loop {
        if seen.contains(needle) {
            return Ok(seen);
        }
        if Instant::now() >= deadline {
            return Err(Error::ConnectTimeout(format!(
                "serial console never showed '{}'",
                needle
            )));
        }
        match tokio::time::timeout(idle, port.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                return Err(Error::Transport(
                    "serial port closed during login".to_string(),
                ))
            }
            Ok(Ok(n)) => seen.push_str(&String::from_utf8_lossy(&chunk[..n])),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    fn login() -> SerialLogin {
        SerialLogin {
            user: "root".to_string(),
            password: Some("secret".to_string()),
        }
    }

    #[tokio::test]
    async fn test_login_handshake() {
        let (mut ours, theirs) = duplex(1024);
        let console = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(theirs);
            let mut lines = BufReader::new(read).lines();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "");
            write.write_all(b"board login: ").await.unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "root");
            write.write_all(b"Password: ").await.unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "secret");
            write.write_all(b"\r\nroot@board:~# ").await.unwrap();
            (lines, write)
        });

        let config = TransportConfig::default();
        handshake(&mut ours, &login(), "# ", &config).await.unwrap();
        console.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_times_out_without_prompt() {
        let (mut ours, _theirs) = duplex(1024);
        let config = TransportConfig {
            connection_timeout_ms: 2_000,
            ..TransportConfig::default()
        };
        let err = handshake(&mut ours, &login(), "# ", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectTimeout(_)));
    }
}
