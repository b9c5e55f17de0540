//! Launch descriptors
//!
//! Which channel to open and how. Resolved by the front end, consumed by
//! [`open`](super::open).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// How to reach the debugger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum LaunchDescriptor {
    /// Spawn the debugger locally and talk over its stdio
    Local {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Spawn a launcher (e.g. `plink`, `adb shell`) that pipes a remote debugger
    Pipe {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
        /// Line sent before closing so the remote side exits
        #[serde(default)]
        farewell: Option<String>,
    },
    /// Connect to a debugger listening on a socket
    Tcp {
        host: String,
        port: u16,
        #[serde(default)]
        tls: Option<TlsOptions>,
    },
    /// A debugger reachable through a serial console
    Serial {
        port: String,
        #[serde(default)]
        baud_rate: Option<u32>,
        #[serde(default)]
        login: Option<SerialLogin>,
        /// Shell prompt that ends the login handshake
        #[serde(default)]
        prompt: Option<String>,
        /// Lines sent after login, typically the debugger command line
        #[serde(default)]
        startup: Vec<String>,
    },
    /// Run the debugger through an SSH-style remote shell command
    Shell {
        host: String,
        #[serde(default)]
        user: Option<String>,
        /// Remote command line, e.g. `gdb --interpreter=mi`
        command: String,
        #[serde(default = "default_ssh")]
        ssh: String,
        #[serde(default)]
        ssh_args: Vec<String>,
    },
    /// Run the debugger inside a terminal emulator, talking over FIFOs
    /// (named pipes on Windows)
    Terminal {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        /// Terminal emulator, e.g. `xterm`
        terminal: String,
        /// Arguments placed before the shell command, e.g. `["-e"]`
        #[serde(default)]
        terminal_args: Vec<String>,
    },
}

fn default_ssh() -> String {
    "ssh".to_string()
}

impl LaunchDescriptor {
    /// Transport kind, as used in logs and `PidUnavailable` errors
    pub fn kind(&self) -> &'static str {
        match self {
            LaunchDescriptor::Local { .. } => "local",
            LaunchDescriptor::Pipe { .. } => "pipe",
            LaunchDescriptor::Tcp { .. } => "tcp",
            LaunchDescriptor::Serial { .. } => "serial",
            LaunchDescriptor::Shell { .. } => "shell",
            LaunchDescriptor::Terminal { .. } => "terminal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TlsOptions {
    /// Name checked against the server certificate; defaults to the host
    #[serde(default)]
    pub server_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialLogin {
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Companion debug server (gdbserver, debugserver, ...) started before the
/// main channel is opened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugServerSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Regex matched against each output line; the first match means ready
    pub started_pattern: String,
}

/// Everything needed to open a session's channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    #[serde(flatten)]
    pub target: LaunchDescriptor,
    #[serde(default)]
    pub server: Option<DebugServerSpec>,
}

impl Launch {
    pub fn new(target: LaunchDescriptor) -> Self {
        Self {
            target,
            server: None,
        }
    }

    pub fn with_server(mut self, server: DebugServerSpec) -> Self {
        self.server = Some(server);
        self
    }

    /// Shorthand for a local debugger process
    pub fn local(program: impl Into<String>, args: Vec<String>) -> Self {
        Self::new(LaunchDescriptor::Local {
            program: program.into(),
            args,
            cwd: None,
            env: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_descriptor_from_toml() {
        let launch: Launch = toml::from_str(
            r#"
mode = "tcp"
host = "10.0.0.2"
port = 4711

[tls]
server_name = "debug.example.com"

[server]
program = "gdbserver"
args = [":4711", "./a.out"]
started_pattern = "Listening on port \\d+"
"#,
        )
        .unwrap();
        match &launch.target {
            LaunchDescriptor::Tcp { host, port, tls } => {
                assert_eq!(host, "10.0.0.2");
                assert_eq!(*port, 4711);
                assert_eq!(
                    tls.as_ref().unwrap().server_name.as_deref(),
                    Some("debug.example.com")
                );
            }
            other => panic!("unexpected descriptor {:?}", other),
        }
        assert_eq!(launch.server.unwrap().program, "gdbserver");
    }

    #[test]
    fn test_shell_descriptor_defaults() {
        let launch: Launch = toml::from_str(
            r#"
mode = "shell"
host = "board"
command = "gdb --interpreter=mi"
"#,
        )
        .unwrap();
        match launch.target {
            LaunchDescriptor::Shell { ssh, user, .. } => {
                assert_eq!(ssh, "ssh");
                assert!(user.is_none());
            }
            other => panic!("unexpected descriptor {:?}", other),
        }
        assert!(launch.server.is_none());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Launch::local("gdb", vec![]).target.kind(), "local");
    }
}
