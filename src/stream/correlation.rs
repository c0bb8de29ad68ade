//! Cross-frame correlation of tool invocations with their results.
//!
//! State is maintained incrementally as each frame streams past, so an
//! invocation is matched with its result however many frames separate them,
//! independent of any bounded frame history kept for diagnostics.

use std::collections::HashMap;

use crate::models::execution::ToolInvocation;
use crate::stream::frame::{ContentBlock, Frame, MessageFrame};

/// Accumulates invocations, explicit results and sub-task fallbacks for one
/// execution.
#[derive(Debug)]
pub struct ToolCorrelator {
    subtask_tool: String,
    /// Every tool-use block, in stream order.
    invocations: Vec<ToolInvocation>,
    /// tool-use id → name.
    names: HashMap<String, String>,
    /// tool-use id → explicit result content.
    results: HashMap<String, String>,
    /// tool-use id → approximate result from the following assistant text.
    fallbacks: HashMap<String, String>,
    /// Tool-use ids invoked by the immediately preceding frame.
    last_invoked: Vec<String>,
}

impl ToolCorrelator {
    /// Create a correlator treating `subtask_tool` as the delegated sub-task.
    #[must_use]
    pub fn new(subtask_tool: impl Into<String>) -> Self {
        Self {
            subtask_tool: subtask_tool.into(),
            invocations: Vec::new(),
            names: HashMap::new(),
            results: HashMap::new(),
            fallbacks: HashMap::new(),
            last_invoked: Vec::new(),
        }
    }

    /// Fold one frame into the correlation state.
    pub fn observe(&mut self, frame: &Frame) {
        let previous = std::mem::take(&mut self.last_invoked);
        match frame {
            Frame::Assistant(msg) => {
                self.record_fallback(msg, &previous);
                self.record_invocations(msg);
            }
            Frame::User(msg) => self.record_nested_results(msg),
            Frame::ToolResult(res) => {
                if let Some(id) = &res.tool_use_id {
                    self.results.insert(id.clone(), res.text());
                }
            }
            Frame::System(_)
            | Frame::Error(_)
            | Frame::Progress(_)
            | Frame::Result(_)
            | Frame::Unrecognized(_) => {}
        }
    }

    /// Name recorded for a tool-use id.
    #[must_use]
    pub fn tool_name(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Number of tool-use blocks seen so far.
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.invocations.len()
    }

    /// Number of explicit results seen so far.
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Emit every invocation in stream order, enriched with its explicit
    /// result, else its sub-task fallback, else no result.
    #[must_use]
    pub fn finish(self) -> Vec<ToolInvocation> {
        let Self {
            invocations,
            results,
            fallbacks,
            ..
        } = self;
        invocations
            .into_iter()
            .map(|mut invocation| {
                invocation.result = invocation
                    .id
                    .as_deref()
                    .and_then(|id| results.get(id).or_else(|| fallbacks.get(id)))
                    .cloned();
                invocation
            })
            .collect()
    }

    fn record_invocations(&mut self, msg: &MessageFrame) {
        for block in msg.message.content.blocks() {
            let ContentBlock::ToolUse { id, name, input } = block else {
                continue;
            };
            if let Some(id) = id {
                if let Some(name) = name {
                    self.names.insert(id.clone(), name.clone());
                }
                self.last_invoked.push(id.clone());
            }
            self.invocations.push(ToolInvocation {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
                timestamp: msg.timestamp.clone(),
                result: None,
            });
        }
    }

    fn record_fallback(&mut self, msg: &MessageFrame, previous: &[String]) {
        let subtasks: Vec<&String> = previous
            .iter()
            .filter(|id| self.tool_name(id) == Some(self.subtask_tool.as_str()))
            .collect();
        if subtasks.is_empty() {
            return;
        }
        let Some(text) = msg.message.content.text_segments().next() else {
            return;
        };
        for id in subtasks {
            self.fallbacks
                .entry(id.clone())
                .or_insert_with(|| text.to_owned());
        }
    }

    fn record_nested_results(&mut self, msg: &MessageFrame) {
        for block in msg.message.content.blocks() {
            if let ContentBlock::ToolResult {
                tool_use_id: Some(id),
                content,
                ..
            } = block
            {
                self.results.insert(id.clone(), content.to_text());
            }
        }
    }
}
