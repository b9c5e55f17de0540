//! Terminal-hosted channel
//!
//! The debugger runs inside a terminal emulator so the debuggee gets a real
//! tty. Its MI stdio is redirected to FIFOs created in a private temp
//! directory; a third FIFO carries the shell's pid and then the debugger's
//! pid. The session ends when the hosting shell goes away, which is polled
//! with `kill(pid, 0)`.
//!
//! On Windows the same layout uses named pipes and no pid is reported.

use super::stream::StreamParts;
use crate::error::{Error, Result};
use midrive_config::TransportConfig;

/// Quote one word for `sh -c`
pub(crate) fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', "'\\''"))
}

/// Shell script run inside the terminal
pub(crate) fn host_script(
    program: &str,
    args: &[String],
    input: &str,
    output: &str,
    errors: &str,
    pids: &str,
) -> String {
    let mut command = shell_quote(program);
    for arg in args {
        command.push(' ');
        command.push_str(&shell_quote(arg));
    }
    format!(
        "{command} <{input} >{output} 2>{errors} & printf '%s\\n%s\\n' $$ $! >{pids}; wait $!",
        command = command,
        input = shell_quote(input),
        output = shell_quote(output),
        errors = shell_quote(errors),
        pids = shell_quote(pids),
    )
}

/// Parse the two pid lines written by the host script
pub(crate) fn parse_pids(text: &str) -> Result<(u32, u32)> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let mut next = |what: &str| -> Result<u32> {
        let line = lines
            .next()
            .ok_or_else(|| Error::Transport(format!("terminal did not report the {} pid", what)))?;
        line.parse::<u32>()
            .map_err(|_| Error::Transport(format!("invalid {} pid '{}'", what, line)))
    };
    let shell = next("shell")?;
    let debugger = next("debugger")?;
    Ok((shell, debugger))
}

#[cfg(unix)]
pub(crate) async fn open(
    program: &str,
    args: &[String],
    terminal: &str,
    terminal_args: &[String],
    config: &TransportConfig,
) -> Result<StreamParts> {
    unix::open(program, args, terminal, terminal_args, config).await
}

#[cfg(windows)]
pub(crate) async fn open(
    program: &str,
    args: &[String],
    terminal: &str,
    terminal_args: &[String],
    config: &TransportConfig,
) -> Result<StreamParts> {
    windows::open(program, args, terminal, terminal_args, config).await
}

#[cfg(not(any(unix, windows)))]
pub(crate) async fn open(
    _program: &str,
    _args: &[String],
    _terminal: &str,
    _terminal_args: &[String],
    _config: &TransportConfig,
) -> Result<StreamParts> {
    Err(Error::Transport(
        "terminal-hosted debugging is not available on this platform".to_string(),
    ))
}

#[cfg(unix)]
mod unix {
    use super::*;
    use nix::sys::signal::kill;
    use nix::sys::stat::Mode;
    use nix::unistd::{mkfifo, Pid};
    use std::path::Path;
    use std::process::Stdio;
    use tokio::io::AsyncReadExt;
    use tokio::net::unix::pipe;
    use tokio::process::Command;
    use tokio::time::Instant;
    use tracing::{debug, info};

    pub(super) async fn open(
        program: &str,
        args: &[String],
        terminal: &str,
        terminal_args: &[String],
        config: &TransportConfig,
    ) -> Result<StreamParts> {
        let dir = tempfile::Builder::new().prefix("midrive-").tempdir()?;
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        let errors = dir.path().join("err");
        let pids = dir.path().join("pids");
        for fifo in [&input, &output, &errors, &pids] {
            mkfifo(fifo.as_path(), Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| {
                Error::Transport(format!("failed to create fifo {}: {}", fifo.display(), e))
            })?;
        }

        // Readers first so the shell's redirections do not block
        let output_rx = open_receiver(&output)?;
        let errors_rx = open_receiver(&errors)?;
        let mut pids_rx = open_receiver(&pids)?;

        let script = host_script(
            program,
            args,
            &path_str(&input),
            &path_str(&output),
            &path_str(&errors),
            &path_str(&pids),
        );
        info!(terminal = %terminal, "Launching debugger in terminal: {}", script);
        let terminal_child = Command::new(terminal)
            .args(terminal_args)
            .arg("sh")
            .arg("-c")
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Transport(format!("failed to start {}: {}", terminal, e)))?;

        let deadline = Instant::now() + config.terminal_pid_timeout();
        let poll = config.terminal_poll_interval();

        let (shell_pid, debugger_pid) = read_pids(&mut pids_rx, deadline, poll).await?;
        debug!(shell_pid, debugger_pid, "Terminal reported pids");

        let input_tx = open_sender(&input, deadline, poll).await?;

        let exit = async move {
            // keep the fifo directory and the terminal alive for the session
            let _dir = dir;
            let _terminal = terminal_child;
            let shell = Pid::from_raw(shell_pid as i32);
            while kill(shell, None).is_ok() {
                tokio::time::sleep(poll).await;
            }
            debug!(shell_pid, "Terminal shell is gone");
            None
        };

        Ok(StreamParts::new("terminal", input_tx, output_rx)
            .stderr(errors_rx)
            .pid(Some(debugger_pid))
            .exit(exit))
    }

    fn open_receiver(path: &Path) -> std::io::Result<pipe::Receiver> {
        let mut options = pipe::OpenOptions::new();
        // also hold a write end so reads do not hit EOF before the debugger
        // has opened its side; exit is detected by polling the shell instead
        #[cfg(target_os = "linux")]
        options.read_write(true);
        options.open_receiver(path)
    }

    fn path_str(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// Without a writer a FIFO read end may report EOF, so keep polling
    async fn read_pids(
        rx: &mut pipe::Receiver,
        deadline: Instant,
        poll: std::time::Duration,
    ) -> Result<(u32, u32)> {
        let mut text = String::new();
        let mut chunk = [0u8; 64];
        loop {
            if text.lines().count() >= 2 && text.ends_with('\n') {
                return parse_pids(&text);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::ConnectTimeout(
                    "terminal did not report the debugger pid".to_string(),
                ));
            }
            match tokio::time::timeout(remaining, rx.read(&mut chunk)).await {
                Ok(Ok(0)) => tokio::time::sleep(poll).await,
                Ok(Ok(n)) => text.push_str(&String::from_utf8_lossy(&chunk[..n])),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => continue,
            }
        }
    }

    /// Opening a FIFO write end fails until a reader exists
    async fn open_sender(
        path: &Path,
        deadline: Instant,
        poll: std::time::Duration,
    ) -> Result<pipe::Sender> {
        loop {
            match pipe::OpenOptions::new().open_sender(path) {
                Ok(tx) => return Ok(tx),
                Err(e) if e.raw_os_error() == Some(nix::libc::ENXIO) => {
                    if Instant::now() >= deadline {
                        return Err(Error::ConnectTimeout(
                            "debugger never opened its input fifo".to_string(),
                        ));
                    }
                    tokio::time::sleep(poll).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::*;
    use std::process::Stdio;
    use tokio::net::windows::named_pipe::{NamedPipeServer, ServerOptions};
    use tokio::process::Command;
    use tracing::info;

    pub(super) async fn open(
        program: &str,
        args: &[String],
        terminal: &str,
        terminal_args: &[String],
        config: &TransportConfig,
    ) -> Result<StreamParts> {
        use rand::Rng;
        let tag: u64 = rand::rng().random();
        let input = format!(r"\\.\pipe\midrive-{:x}-in", tag);
        let output = format!(r"\\.\pipe\midrive-{:x}-out", tag);

        let input_server = ServerOptions::new()
            .first_pipe_instance(true)
            .create(&input)?;
        let output_server = ServerOptions::new()
            .first_pipe_instance(true)
            .create(&output)?;

        let mut command_line = program.to_string();
        for arg in args {
            command_line.push(' ');
            command_line.push_str(arg);
        }
        info!(terminal = %terminal, "Launching debugger in terminal: {}", command_line);
        let terminal_child = Command::new(terminal)
            .args(terminal_args)
            .arg("cmd")
            .arg("/c")
            .arg(format!("{} <{} >{}", command_line, input, output))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Transport(format!("failed to start {}: {}", terminal, e)))?;

        let timeout = config.terminal_pid_timeout();
        connect(&input_server, timeout).await?;
        connect(&output_server, timeout).await?;

        let exit = super::super::pipe::wait_for_exit(terminal_child);
        Ok(StreamParts::new("terminal", input_server, output_server).exit(exit))
    }

    async fn connect(server: &NamedPipeServer, timeout: std::time::Duration) -> Result<()> {
        match tokio::time::timeout(timeout, server.connect()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::ConnectTimeout(
                "debugger never connected to its named pipes".to_string(),
            )),
        }
    }
}
