use super::types::{Frame, PrintValues, ThreadsInfo};
use super::CommandFactory;
use crate::constants::fields;
use crate::dialect::ContextStyle;
use crate::error::Result;
use crate::lock::HoldKind;
use crate::protocol::ResultClass;
use crate::session::Selection;
use crate::value::{List, Lookup, Tuple};

fn frames_of(list: &List) -> Result<Vec<Frame>> {
    list.find_all(fields::FRAME)
        .into_iter()
        .map(|v| Frame::from_value(v).map_err(Into::into))
        .collect()
}

impl CommandFactory {
    /// `-thread-info`. On select-style backends this also teaches the
    /// context cache which thread the debugger has selected.
    pub async fn thread_info(&self) -> Result<ThreadsInfo> {
        if self.dialect.context_style() != ContextStyle::Select {
            let reply = self.run("-thread-info", None).await?;
            return Ok(ThreadsInfo::from_record(&reply)?);
        }

        let mut token = self.session.lock().acquire(HoldKind::Exclusive).await?;
        let generation = self.session.context().generation();
        let outcome = self.run("-thread-info", None).await;
        if let Ok(reply) = &outcome {
            if let Some(thread_id) = reply.try_find_u32("current-thread-id") {
                let selection = Selection {
                    thread_id: Some(thread_id),
                    // frame unknown: the next frame-scoped command re-selects
                    frame_level: None,
                };
                self.session.context().record(&token, generation, selection)?;
            }
        }
        token.release()?;
        Ok(ThreadsInfo::from_record(&outcome?)?)
    }

    pub async fn stack_info_depth(&self, thread_id: u32, max_depth: u32) -> Result<u32> {
        let reply = self
            .thread_command(
                &format!("-stack-info-depth {}", max_depth),
                Some(ResultClass::Done),
                thread_id,
            )
            .await?;
        Ok(reply.find_u32(fields::DEPTH)?)
    }

    /// Frames `low..=high` of `thread_id`
    pub async fn stack_list_frames(&self, thread_id: u32, low: u32, high: u32) -> Result<Vec<Frame>> {
        let reply = self
            .thread_command(
                &format!("-stack-list-frames {} {}", low, high),
                Some(ResultClass::Done),
                thread_id,
            )
            .await?;
        frames_of(reply.find_list(fields::STACK)?)
    }

    pub async fn stack_info_frame(&self, thread_id: u32, frame_level: u32) -> Result<Frame> {
        let reply = self
            .frame_command("-stack-info-frame", Some(ResultClass::Done), thread_id, frame_level)
            .await?;
        Ok(Frame::from_tuple(reply.find_tuple(fields::FRAME)?)?)
    }

    pub async fn stack_list_locals(
        &self,
        print: PrintValues,
        thread_id: u32,
        frame_level: u32,
    ) -> Result<List> {
        let reply = self
            .frame_command(
                &format!("-stack-list-locals {}", print.as_mi()),
                Some(ResultClass::Done),
                thread_id,
                frame_level,
            )
            .await?;
        Ok(reply.find_list("locals")?.clone())
    }

    /// Arguments of frames `low..=high`, one `frame={level,args}` tuple per
    /// frame
    pub async fn stack_list_arguments(
        &self,
        print: PrintValues,
        thread_id: u32,
        low: u32,
        high: u32,
    ) -> Result<Vec<Tuple>> {
        let command = self.dialect.stack_list_arguments(print, low, high)?;
        let reply = self
            .thread_command(&command, Some(ResultClass::Done), thread_id)
            .await?;
        let list = reply.find_list("stack-args")?;
        list.find_all(fields::FRAME)
            .into_iter()
            .map(|v| -> Result<Tuple> { Ok(v.require_tuple(fields::FRAME)?.clone()) })
            .collect()
    }

    /// Arguments of a single frame
    pub async fn stack_list_frame_arguments(
        &self,
        print: PrintValues,
        thread_id: u32,
        frame_level: u32,
    ) -> Result<List> {
        let frames = self
            .stack_list_arguments(print, thread_id, frame_level, frame_level)
            .await?;
        match frames.first() {
            Some(frame) => Ok(frame.find_list("args")?.clone()),
            None => Ok(List::Values(Vec::new())),
        }
    }

    pub async fn stack_list_variables(
        &self,
        print: PrintValues,
        thread_id: u32,
        frame_level: u32,
    ) -> Result<List> {
        let reply = self
            .frame_command(
                &format!("-stack-list-variables {}", print.as_mi()),
                Some(ResultClass::Done),
                thread_id,
                frame_level,
            )
            .await?;
        Ok(reply.find_list("variables")?.clone())
    }
}
