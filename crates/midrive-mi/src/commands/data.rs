use super::types::{VarFormat, VarObject};
use super::CommandFactory;
use crate::constants::fields;
use crate::dialect::quote;
use crate::error::{Error, Result};
use crate::protocol::ResultClass;
use crate::value::{Lookup, Tuple, ValueError};
use std::sync::atomic::Ordering;

impl CommandFactory {
    // ------------------------------------------------------------------
    // Registers and expressions
    // ------------------------------------------------------------------

    pub async fn data_list_register_names(&self) -> Result<Vec<String>> {
        let reply = self
            .run("-data-list-register-names", Some(ResultClass::Done))
            .await?;
        let names = reply.find_list("register-names")?.as_strings()?;
        Ok(names.into_iter().map(str::to_string).collect())
    }

    /// `(number, value)` for every register of `thread_id`, values in hex
    pub async fn data_list_register_values(&self, thread_id: u32) -> Result<Vec<(u32, String)>> {
        let reply = self
            .thread_command("-data-list-register-values x", Some(ResultClass::Done), thread_id)
            .await?;
        reply
            .find_list("register-values")?
            .values()
            .into_iter()
            .map(|v| -> Result<(u32, String)> {
                let t = v.require_tuple("register-values")?;
                Ok((t.find_u32("number")?, t.find_str(fields::VALUE)?))
            })
            .collect()
    }

    /// Evaluate `expression` in a frame. Errors come back as `Debugger` so
    /// the caller can show the debugger's message.
    pub async fn data_evaluate_expression(
        &self,
        expression: &str,
        thread_id: u32,
        frame_level: u32,
    ) -> Result<String> {
        let reply = self
            .frame_command(
                &format!("-data-evaluate-expression {}", quote(expression)),
                Some(ResultClass::Done),
                thread_id,
                frame_level,
            )
            .await?;
        Ok(reply.find_str(fields::VALUE)?)
    }

    /// Only 10 and 16 are accepted; returns whether the radix changed
    pub async fn set_radix(&self, radix: u32) -> Result<bool> {
        if radix != 10 && radix != 16 {
            return Err(Error::InvalidArgument(format!(
                "unsupported radix {}",
                radix
            )));
        }
        if self.radix.load(Ordering::Acquire) == radix {
            return Ok(false);
        }
        self.set_option("output-radix", &radix.to_string()).await?;
        self.radix.store(radix, Ordering::Release);
        Ok(true)
    }

    pub fn radix(&self) -> u32 {
        self.radix.load(Ordering::Acquire)
    }

    /// Step only through user code; a no-op where the backend has no such
    /// switch
    pub async fn set_just_my_code(&self, enabled: bool) -> Result<()> {
        if let Some(command) = self.dialect.just_my_code(enabled) {
            self.run(&command, Some(ResultClass::Done)).await?;
        }
        Ok(())
    }

    pub async fn set_step_filtering(&self, enabled: bool) -> Result<()> {
        if let Some(command) = self.dialect.step_filtering(enabled) {
            self.run(&command, Some(ResultClass::Done)).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Variable objects
    // ------------------------------------------------------------------

    pub async fn var_create(
        &self,
        expression: &str,
        thread_id: u32,
        frame_level: u32,
        eval_flags: u32,
    ) -> Result<VarObject> {
        let command = self.dialect.var_create(expression, eval_flags);
        let reply = self
            .frame_command(&command, Some(ResultClass::Done), thread_id, frame_level)
            .await?;
        VarObject::from_record(&reply)
    }

    pub async fn var_set_format(&self, name: &str, format: VarFormat) -> Result<String> {
        let reply = self
            .run(
                &format!("-var-set-format {} {}", name, format.as_mi()),
                Some(ResultClass::Done),
            )
            .await?;
        Ok(reply.find_str(fields::VALUE)?)
    }

    /// Children of a var-object, one tuple per `child`
    pub async fn var_list_children(&self, name: &str, property_flags: u32) -> Result<Vec<Tuple>> {
        let command = self.dialect.var_list_children(name, property_flags);
        let reply = self.run(&command, Some(ResultClass::Done)).await?;
        let Some(children) = reply.try_find("children") else {
            return Ok(Vec::new());
        };
        let list = children.as_list().ok_or(ValueError::WrongShape {
            name: "children".to_string(),
            expected: "list",
            found: children.shape(),
        })?;
        list.find_all("child")
            .into_iter()
            .map(|v| -> Result<Tuple> { Ok(v.require_tuple("child")?.clone()) })
            .collect()
    }

    pub async fn var_evaluate_expression(&self, name: &str) -> Result<String> {
        let reply = self
            .run(
                &format!("-var-evaluate-expression {}", name),
                Some(ResultClass::Done),
            )
            .await?;
        Ok(reply.find_str(fields::VALUE)?)
    }

    /// Assign and return the new value as the debugger prints it
    pub async fn var_assign(&self, name: &str, expression: &str) -> Result<String> {
        let reply = self
            .run(
                &format!("-var-assign {} {}", name, quote(expression)),
                Some(ResultClass::Done),
            )
            .await?;
        Ok(reply.find_str(fields::VALUE)?)
    }

    /// `editable` / `noneditable`
    pub async fn var_show_attributes(&self, name: &str) -> Result<String> {
        let reply = self
            .run(
                &format!("-var-show-attributes {}", name),
                Some(ResultClass::Done),
            )
            .await?;
        match reply.try_find_str("attr") {
            Some(attr) => Ok(attr),
            None => Ok(reply.find_str("status")?),
        }
    }

    /// Delete a var-object. Deleting one the debugger already forgot is not
    /// an error.
    pub async fn var_delete(&self, name: &str) -> Result<()> {
        self.run(&format!("-var-delete {}", name), None).await?;
        Ok(())
    }

    pub async fn var_info_path_expression(&self, name: &str) -> Result<String> {
        let reply = self
            .run(
                &format!("-var-info-path-expression {}", name),
                Some(ResultClass::Done),
            )
            .await?;
        Ok(reply.find_str("path_expr")?)
    }
}
