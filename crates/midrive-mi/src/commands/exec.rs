use super::CommandFactory;
use crate::error::{Error, Result};
use crate::protocol::{AsyncClass, AsyncRecord, ResultClass, StopEvent};
use crate::value::Tuple;

impl CommandFactory {
    pub async fn exec_step(&self, thread_id: u32) -> Result<()> {
        self.step("-exec-step", thread_id).await
    }

    pub async fn exec_next(&self, thread_id: u32) -> Result<()> {
        self.step("-exec-next", thread_id).await
    }

    pub async fn exec_finish(&self, thread_id: u32) -> Result<()> {
        self.step("-exec-finish", thread_id).await
    }

    pub async fn exec_step_instruction(&self, thread_id: u32) -> Result<()> {
        self.step("-exec-step-instruction", thread_id).await
    }

    pub async fn exec_next_instruction(&self, thread_id: u32) -> Result<()> {
        self.step("-exec-next-instruction", thread_id).await
    }

    async fn step(&self, command: &str, thread_id: u32) -> Result<()> {
        self.thread_command(command, Some(ResultClass::Running), thread_id)
            .await?;
        Ok(())
    }

    pub async fn exec_run(&self) -> Result<()> {
        let command = self.dialect.exec_run(self.session.options())?;
        self.run(&command, Some(ResultClass::Running)).await?;
        Ok(())
    }

    pub async fn exec_continue(&self) -> Result<()> {
        let command = self.dialect.exec_continue(self.session.options())?;
        self.run(&command, Some(ResultClass::Running)).await?;
        Ok(())
    }

    /// Ask a running target to stop; the stop itself arrives as `*stopped`
    pub async fn exec_interrupt(&self) -> Result<()> {
        self.run("-exec-interrupt", Some(ResultClass::Done)).await?;
        Ok(())
    }

    /// Kill the debuggee
    pub async fn terminate(&self) -> Result<()> {
        let (command, expect) = self.dialect.terminate();
        self.run(command, expect).await?;
        Ok(())
    }

    pub async fn target_detach(&self) -> Result<()> {
        if !self.dialect.can_detach() {
            return Err(self.dialect.unsupported("detach"));
        }
        self.run("-target-detach", Some(ResultClass::Done)).await?;
        Ok(())
    }

    /// Deliver `signal` (e.g. `SIGUSR1`) to the debuggee and resume it
    pub async fn signal(&self, signal: &str) -> Result<()> {
        if signal.is_empty() || signal.chars().any(char::is_whitespace) {
            return Err(Error::InvalidArgument(format!(
                "invalid signal name '{}'",
                signal
            )));
        }
        let command = self.dialect.signal(signal)?;
        // console commands may switch the selected thread
        self.session.context().invalidate();
        self.run(&command, Some(ResultClass::Running)).await?;
        Ok(())
    }

    /// Whether `stop` is the stop produced by an async break request
    pub fn is_async_break_signal(&self, stop: &StopEvent) -> bool {
        self.dialect.is_async_break_signal(stop)
    }

    /// Results of a `=library-loaded` notification
    pub fn library_loaded<'a>(&self, record: &'a AsyncRecord) -> Option<&'a Tuple> {
        (record.class == AsyncClass::LibraryLoaded).then_some(&record.results)
    }
}
