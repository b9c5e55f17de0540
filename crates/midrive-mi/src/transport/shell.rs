//! SSH-style remote shell channel
//!
//! Opens a non-interactive remote shell, starts the debugger in it, and
//! talks to the debugger over the shell's stdio. The local pid belongs to the
//! ssh client, not the debugger, so no pid is exposed.

use super::pipe::{self, ProcessSpec};
use super::stream::StreamParts;
use crate::constants::transport::{FAREWELL, SHELL};
use crate::error::Result;

/// Build the ssh client argument list: extra args, `-T`, then the destination
pub(crate) fn ssh_arguments(host: &str, user: Option<&str>, extra: &[String]) -> Vec<String> {
    let mut args = extra.to_vec();
    args.push("-T".to_string());
    match user {
        Some(user) => args.push(format!("{}@{}", user, host)),
        None => args.push(host.to_string()),
    }
    args
}

pub(crate) async fn open(
    host: &str,
    user: Option<&str>,
    command: &str,
    ssh: &str,
    ssh_args: &[String],
) -> Result<StreamParts> {
    let args = ssh_arguments(host, user, ssh_args);
    let parts = pipe::spawn(ProcessSpec {
        kind: SHELL,
        program: ssh,
        args: &args,
        cwd: None,
        env: None,
        farewell: Some(FAREWELL.to_string()),
        pid_is_debugger: false,
    })?;
    Ok(parts.startup(vec![command.to_string()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_arguments() {
        assert_eq!(
            ssh_arguments("board", Some("root"), &["-p".to_string(), "2222".to_string()]),
            vec!["-p", "2222", "-T", "root@board"]
        );
        assert_eq!(ssh_arguments("board", None, &[]), vec!["-T", "board"]);
    }
}
