//! Command factory
//!
//! [`CommandFactory`] is the backend-independent command vocabulary. Each
//! operation asks the session's [`Dialect`] for the text, routes it through
//! the context-switch lock when it is thread or frame scoped, and projects
//! the reply into a typed result.
//!
//! Scoped commands on select-style backends (gdb) take an exclusive hold,
//! emit `-thread-select` / `-stack-select-frame` only when the cached
//! selection differs, then downgrade to shared for the command itself so
//! other scoped commands for the same context can proceed. Flag-style
//! backends append `--thread`/`--frame` and only need a shared hold.
//!
//! Capability checks happen before anything is written to the debugger.
//! So does the run-state check: backends that cannot take commands while
//! the debuggee runs get `InvalidState` for scoped and console commands,
//! checked again once the context hold is granted.

mod breakpoints;
mod data;
mod exec;
mod stack;
pub mod types;

use crate::constants::fields;
use crate::dialect::{ContextStyle, Dialect, DialectCapabilities, DialectKind};
use crate::error::{Error, Result};
use crate::lock::{ContextLockToken, HoldKind};
use crate::protocol::{ResultClass, ResultRecord};
use crate::session::{CommandOptions, Selection, Session};
use crate::value::Lookup;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, trace};
use types::{DebuggerVersion, TargetArchitecture};

/// Builds, routes and executes MI commands for one session
pub struct CommandFactory {
    session: Arc<Session>,
    dialect: Box<dyn Dialect>,
    version: OnceCell<DebuggerVersion>,
    radix: std::sync::atomic::AtomicU32,
}

impl std::fmt::Debug for CommandFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandFactory")
            .field("dialect", &self.dialect.name())
            .field("version", &self.version.get())
            .finish()
    }
}

impl CommandFactory {
    pub fn new(session: Arc<Session>, dialect: Box<dyn Dialect>) -> Self {
        Self {
            session,
            dialect,
            version: OnceCell::new(),
            radix: std::sync::atomic::AtomicU32::new(10),
        }
    }

    pub fn for_kind(session: Arc<Session>, kind: DialectKind) -> Self {
        Self::new(session, kind.create())
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn name(&self) -> &'static str {
        self.dialect.name()
    }

    pub fn capabilities(&self) -> DialectCapabilities {
        self.dialect.capabilities()
    }

    /// Fail with `NotSupported` unless `enabled`
    fn require(&self, enabled: bool, operation: &'static str) -> Result<()> {
        if enabled {
            Ok(())
        } else {
            Err(self.dialect.unsupported(operation))
        }
    }

    /// Fail with `InvalidState` while the debuggee runs, unless the backend
    /// takes commands regardless
    fn ensure_accepts_commands(&self, operation: &str) -> Result<()> {
        if self.capabilities().commands_while_running {
            return Ok(());
        }
        self.session.ensure_stopped(operation)
    }

    /// Console command, refused while running where the backend needs a stop
    async fn console(&self, text: &str) -> Result<String> {
        if self.capabilities().commands_while_running {
            self.session.console(text).await
        } else {
            self.session.console_when_stopped(text).await
        }
    }

    /// Context-free command: no lock
    async fn run(&self, command: &str, expect: Option<ResultClass>) -> Result<ResultRecord> {
        self.session.execute(command, expect).await
    }

    async fn thread_command(
        &self,
        command: &str,
        expect: Option<ResultClass>,
        thread_id: u32,
    ) -> Result<ResultRecord> {
        self.scoped(command, expect, thread_id, None).await
    }

    async fn frame_command(
        &self,
        command: &str,
        expect: Option<ResultClass>,
        thread_id: u32,
        frame_level: u32,
    ) -> Result<ResultRecord> {
        self.scoped(command, expect, thread_id, Some(frame_level))
            .await
    }

    async fn scoped(
        &self,
        command: &str,
        expect: Option<ResultClass>,
        thread_id: u32,
        frame_level: Option<u32>,
    ) -> Result<ResultRecord> {
        self.ensure_accepts_commands(command)?;
        let lock = self.session.lock();
        match self.dialect.context_style() {
            ContextStyle::Select => {
                let mut token = lock.acquire(HoldKind::Exclusive).await?;
                let selected = match self.ensure_accepts_commands(command) {
                    Ok(()) => self.select_context(&token, thread_id, frame_level).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = selected {
                    let _ = token.release();
                    return Err(e);
                }
                token.downgrade()?;
                let outcome = self.run(command, expect).await;
                token.release()?;
                outcome
            }
            ContextStyle::Flags => {
                let mut token = lock.acquire(HoldKind::Shared).await?;
                if let Err(e) = self.ensure_accepts_commands(command) {
                    let _ = token.release();
                    return Err(e);
                }
                let command = match frame_level {
                    Some(level) => format!("{} --thread {} --frame {}", command, thread_id, level),
                    None => format!("{} --thread {}", command, thread_id),
                };
                let outcome = self.run(&command, expect).await;
                token.release()?;
                outcome
            }
        }
    }

    /// Make the debugger's selection match, skipping what the cache says is
    /// already selected. Requires an exclusive hold.
    async fn select_context(
        &self,
        token: &ContextLockToken,
        thread_id: u32,
        frame_level: Option<u32>,
    ) -> Result<()> {
        token.ensure_exclusive()?;
        let context = self.session.context();
        let (mut selection, generation) = context.snapshot();

        if selection.thread_id != Some(thread_id) {
            let reply = self
                .run(&format!("-thread-select {}", thread_id), Some(ResultClass::Done))
                .await?;
            // the debugger reports which frame it landed on
            let level = reply
                .try_find(fields::FRAME)
                .and_then(|frame| frame.try_find_u32("level"))
                .unwrap_or(0);
            selection = Selection {
                thread_id: Some(thread_id),
                frame_level: Some(level),
            };
            context.record(token, generation, selection)?;
        }

        if let Some(level) = frame_level {
            if selection.frame_level != Some(level) {
                self.run(&format!("-stack-select-frame {}", level), Some(ResultClass::Done))
                    .await?;
                selection.frame_level = Some(level);
                context.record(token, generation, selection)?;
            }
        }
        trace!(thread_id, ?frame_level, "Context selected");
        Ok(())
    }

    /// Debugger version, probed once. Concurrent callers share one probe; a
    /// failed probe is retried by the next caller.
    pub async fn version(&self) -> Result<DebuggerVersion> {
        let command = self
            .dialect
            .version_command()
            .ok_or_else(|| self.dialect.unsupported("version"))?;
        let version = self
            .version
            .get_or_try_init(|| async {
                let output = self
                    .session
                    .execute_captured(command, CommandOptions::expect(ResultClass::Done))
                    .await?;
                let version = self.dialect.parse_version(&output.console).ok_or_else(|| {
                    Error::InvalidState(format!("no version in '{}'", output.console.trim()))
                })?;
                debug!(dialect = self.dialect.name(), version = %version, "Debugger version");
                Ok::<_, Error>(version)
            })
            .await?;
        Ok(version.clone())
    }

    /// Put the debugger in async execution mode where the backend needs it
    pub async fn enable_target_async(&self) -> Result<()> {
        let version = if self.dialect.async_mode_needs_version() {
            match self.version().await {
                Ok(version) => Some(version),
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    debug!(error = %e, "Version unknown, using legacy async switch");
                    None
                }
            }
        } else {
            None
        };
        if let Some(command) = self.dialect.async_mode_command(version.as_ref()) {
            self.run(&command, Some(ResultClass::Done)).await?;
        }
        Ok(())
    }

    pub async fn target_architecture(&self) -> Result<TargetArchitecture> {
        let console = match self.dialect.target_architecture_command() {
            Some(command) => self.console(command).await?,
            None => String::new(),
        };
        Ok(self.dialect.parse_target_architecture(&console))
    }

    /// Keep the debugger attached to both sides of a fork and stop on
    /// `fork`/`vfork` so child processes can be picked up
    pub async fn enable_child_process_debugging(&self) -> Result<()> {
        self.require(
            self.capabilities().child_process_debugging,
            "child process debugging",
        )?;
        self.set_option("detach-on-fork", "off").await?;
        self.catch("fork", false).await?;
        self.catch("vfork", false).await
    }

    /// Stop (or not) when a shared library is loaded or unloaded
    pub async fn set_stop_on_dynamic_lib_load(&self, enabled: bool) -> Result<()> {
        self.require(
            self.capabilities().stop_on_dynamic_lib_load,
            "stopping on library load",
        )?;
        self.set_option("stop-on-solib-events", if enabled { "1" } else { "0" })
            .await
    }

    /// `-gdb-set <variable> <value>`
    pub async fn set_option(&self, variable: &str, value: &str) -> Result<()> {
        self.run(
            &format!("-gdb-set {} {}", variable, value),
            Some(ResultClass::Done),
        )
        .await?;
        Ok(())
    }

    /// Set an environment variable for the debuggee
    pub async fn set_env(&self, name: &str, value: &str) -> Result<()> {
        let command = self.dialect.set_env_command(name, value)?;
        self.console(&command).await?;
        Ok(())
    }

    pub async fn list_target_features(&self) -> Result<Vec<String>> {
        let command = self.dialect.list_target_features()?;
        let reply = self.run(command, Some(ResultClass::Done)).await?;
        let features = match reply.try_find("features").and_then(|v| v.as_list()) {
            Some(list) => list.as_strings()?.into_iter().map(str::to_string).collect(),
            None => Vec::new(),
        };
        Ok(features)
    }

    /// Addresses the code of `file:line` starts at, `None` when the backend
    /// cannot say
    pub async fn start_addresses_for_line(&self, file: &str, line: u32) -> Result<Option<Vec<u64>>> {
        let Some(command) = self.dialect.start_addresses_command(file, line) else {
            return Ok(None);
        };
        let console = self.console(&command).await?;
        Ok(Some(parse_start_addresses(&console)))
    }
}

/// Every address following "starts at address " in `info line` output
fn parse_start_addresses(console: &str) -> Vec<u64> {
    const MARKER: &str = "starts at address ";
    let mut addresses = Vec::new();
    let mut rest = console;
    while let Some(at) = rest.find(MARKER) {
        rest = &rest[at + MARKER.len()..];
        if let Some((addr, tail)) = crate::value::span_next_addr(rest) {
            addresses.push(addr);
            rest = tail;
        }
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_addresses() {
        let text = "Line 12 of \"a.c\" starts at address 0x401126 <main+4> and ends at 0x40112d <main+11>.\n\
                    Line 12 of \"a.c\" starts at address 0x401200 <main+222> and ends at 0x401208.\n";
        assert_eq!(parse_start_addresses(text), vec![0x401126, 0x401200]);
        assert!(parse_start_addresses("Line 3 of \"a.c\" is at address 0x1 but contains no code.\n").is_empty());
    }
}
