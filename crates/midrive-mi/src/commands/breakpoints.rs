use super::types::{BreakLocation, BreakOptions, ExceptionBreakState, ExceptionCategory};
use super::CommandFactory;
use crate::constants::fields;
use crate::error::{Error, Result};
use crate::protocol::{ResultClass, ResultRecord};
use crate::value::{List, Lookup, Tuple, Value};
use tracing::debug;

impl CommandFactory {
    /// Insert a breakpoint and return its `bkpt` tuple. For a breakpoint
    /// with several locations this is the parent entry.
    pub async fn break_insert(
        &self,
        location: &BreakLocation,
        options: &BreakOptions,
    ) -> Result<Tuple> {
        let command = self.dialect.break_insert(location, options)?;
        let reply = self.run(&command, Some(ResultClass::Done)).await?;
        let parent = match reply.find(fields::BKPT)? {
            Value::List(List::Results(locations)) if !locations.is_empty() => &locations[0].1,
            other => other,
        };
        Ok(parent.require_tuple(fields::BKPT)?.clone())
    }

    /// Hardware watchpoint over `size` bytes at `address`; returns the `wpt`
    /// tuple
    pub async fn break_watch(&self, address: u64, size: u32) -> Result<Tuple> {
        self.require(self.capabilities().data_breakpoints, "data breakpoints")?;
        let command = self
            .dialect
            .break_watch(&format!("0x{:x}", address), size)?;
        let reply = self.run(&command, Some(ResultClass::Done)).await?;
        Ok(reply.find_tuple("wpt")?.clone())
    }

    /// Current state of breakpoint `number`, `None` if the debugger does not
    /// know it
    pub async fn break_info(&self, number: &str) -> Result<Option<Tuple>> {
        let reply = self.run(&format!("-break-info {}", number), None).await?;
        if reply.class != ResultClass::Done {
            return Ok(None);
        }
        let body = reply.find_tuple("BreakpointTable")?.find_list("body")?;
        Ok(body
            .find_all(fields::BKPT)
            .into_iter()
            .find_map(Value::as_tuple)
            .cloned())
    }

    pub async fn break_enable(&self, enabled: bool, number: &str) -> Result<()> {
        let verb = if enabled { "-break-enable" } else { "-break-disable" };
        self.run(&format!("{} {}", verb, number), Some(ResultClass::Done))
            .await?;
        Ok(())
    }

    pub async fn break_delete(&self, number: &str) -> Result<()> {
        self.run(&format!("-break-delete {}", number), Some(ResultClass::Done))
            .await?;
        Ok(())
    }

    /// Replace the condition; an empty `condition` makes it unconditional
    pub async fn break_condition(&self, number: &str, condition: &str) -> Result<()> {
        self.run(
            &format!("-break-condition {} {}", number, condition),
            Some(ResultClass::Done),
        )
        .await?;
        Ok(())
    }

    /// `catch <event>` (or `tcatch` when `once`)
    pub async fn catch(&self, event: &str, once: bool) -> Result<()> {
        let command = self.dialect.catch(event, once)?;
        self.console(&command).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Exception breakpoints
    // ------------------------------------------------------------------

    pub fn exception_categories(&self) -> &'static [ExceptionCategory] {
        self.dialect.exception_categories()
    }

    /// Break on exceptions of `category`; `names == None` means all of them.
    /// Returns the ids the debugger assigned.
    pub async fn set_exception_breakpoints(
        &self,
        category: ExceptionCategory,
        names: Option<&[String]>,
        state: ExceptionBreakState,
    ) -> Result<Vec<u64>> {
        self.require(
            self.capabilities().exception_breakpoints,
            "exception breakpoints",
        )?;
        if !self.exception_categories().contains(&category) {
            return Err(Error::InvalidArgument(format!(
                "{:?} exceptions are not known to {}",
                category,
                self.name()
            )));
        }
        let command = self.dialect.exception_insert(category, names, state)?;
        let reply = self.run(&command, Some(ResultClass::Done)).await?;
        let ids = exception_ids(&reply)?;
        debug!(?category, count = ids.len(), "Exception breakpoints set");
        Ok(ids)
    }

    pub async fn remove_exception_breakpoints(&self, ids: &[u64]) -> Result<()> {
        self.require(
            self.capabilities().exception_breakpoints,
            "exception breakpoints",
        )?;
        let command = self.dialect.exception_delete(ids)?;
        self.run(&command, Some(ResultClass::Done)).await?;
        Ok(())
    }

    /// Category and stage of an `exception-received` stop
    pub fn decode_exception_received(
        &self,
        results: &Tuple,
    ) -> Result<(ExceptionCategory, ExceptionBreakState)> {
        self.dialect.decode_exception_received(results)
    }
}

/// `bkpt` is either one tuple or a list of them
fn exception_ids(reply: &ResultRecord) -> Result<Vec<u64>> {
    let number = |value: &Value| -> Result<u64> {
        let tuple = value.as_tuple().ok_or_else(|| {
            Error::InvalidArgument(format!("unexpected bkpt entry {}", value))
        })?;
        Ok(tuple.find_addr(fields::NUMBER)?)
    };
    match reply.find(fields::BKPT)? {
        Value::List(list) => list.values().into_iter().map(number).collect(),
        single => Ok(vec![number(single)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use crate::protocol::Reply;

    fn record(line: &str) -> ResultRecord {
        match parse_line(line).unwrap() {
            Reply::Result(record) => record,
            other => panic!("expected result record, got {:?}", other),
        }
    }

    #[test]
    fn test_exception_ids_single_and_list() {
        assert_eq!(
            exception_ids(&record(r#"^done,bkpt={number="7"}"#)).unwrap(),
            vec![7]
        );
        assert_eq!(
            exception_ids(&record(r#"^done,bkpt=[{number="1"},{number="2"}]"#)).unwrap(),
            vec![1, 2]
        );
    }
}
