//! Frame classification into [`SemanticUpdate`]s.
//!
//! Every kind except `result` maps to exactly one update. `result` frames and
//! unrecognized discriminators produce no update: the former is captured by
//! the aggregator, the latter is logged and dropped.

use tracing::debug;

use crate::models::update::{
    ErrorInfo, ProgressInfo, SemanticUpdate, SystemInfo, ToolCall, ToolOutcome, UpdateKind,
};
use crate::stream::frame::{
    parse_frame, ContentBlock, ContentItem, ErrorFrame, Frame, MessageContent, MessageFrame,
    ProgressFrame, SystemFrame, ToolResultFrame,
};
use crate::Result;

/// Parse and classify one raw line.
///
/// # Errors
///
/// Returns `AppError::Frame` when the line is not a structurally valid frame.
pub fn classify_line(line: &str) -> Result<Option<SemanticUpdate>> {
    Ok(parse_frame(line)?.and_then(|frame| classify(&frame)))
}

/// Map a parsed frame to its live update.
#[must_use]
pub fn classify(frame: &Frame) -> Option<SemanticUpdate> {
    match frame {
        Frame::Assistant(msg) => Some(assistant_update(msg)),
        Frame::User(msg) => Some(user_update(msg)),
        Frame::System(sys) => Some(system_update(sys)),
        Frame::ToolResult(res) => Some(tool_result_update(res)),
        Frame::Error(err) => Some(error_update(err)),
        Frame::Progress(progress) => Some(progress_update(progress)),
        Frame::Result(_) => None,
        Frame::Unrecognized(kind) => {
            debug!(frame_type = %kind, "dropping unrecognized frame");
            None
        }
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn assistant_update(msg: &MessageFrame) -> SemanticUpdate {
    let mut update = SemanticUpdate::new(UpdateKind::Assistant);
    let mut texts: Vec<&str> = Vec::new();

    match &msg.message.content {
        MessageContent::Text(text) => texts.push(text),
        MessageContent::Items(_) => {
            for block in msg.message.content.blocks() {
                match block {
                    ContentBlock::Text { text } => texts.push(text),
                    ContentBlock::ToolUse { id, name, input } => update.tool_calls.push(ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    }),
                    ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
                }
            }
        }
    }

    update.content = non_empty(texts.join("\n"));
    update.timestamp.clone_from(&msg.timestamp);
    update.session_id.clone_from(&msg.session_id);
    update.execution_id = msg.message_id().map(str::to_owned);
    update
}

fn user_update(msg: &MessageFrame) -> SemanticUpdate {
    let mut update = SemanticUpdate::new(UpdateKind::User);
    update.content = match &msg.message.content {
        MessageContent::Text(text) => non_empty(text.clone()),
        MessageContent::Items(items) => {
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| match item {
                    ContentItem::Bare(text) | ContentItem::Block(ContentBlock::Text { text }) => {
                        Some(text.as_str())
                    }
                    ContentItem::Block(_) => None,
                })
                .collect();
            non_empty(texts.join("\n"))
        }
    };
    update.timestamp.clone_from(&msg.timestamp);
    update.session_id.clone_from(&msg.session_id);
    update
}

fn system_update(sys: &SystemFrame) -> SemanticUpdate {
    let mut update = SemanticUpdate::new(UpdateKind::System);
    if sys.subtype.as_deref() == Some("init") {
        update.system = Some(SystemInfo {
            subtype: sys.subtype.clone(),
            tools: sys.tools.clone(),
            mcp_servers: sys.mcp_servers.clone(),
            model: sys.model.clone(),
            cwd: sys.cwd.clone(),
            permission_mode: sys.permission_mode.clone(),
        });
    } else {
        update.content.clone_from(&sys.message);
        update.system = Some(SystemInfo {
            subtype: sys.subtype.clone(),
            ..SystemInfo::default()
        });
    }
    update.timestamp.clone_from(&sys.timestamp);
    update.session_id.clone_from(&sys.session_id);
    update
}

fn tool_result_update(res: &ToolResultFrame) -> SemanticUpdate {
    let mut update = SemanticUpdate::new(UpdateKind::ToolResult);
    let failed = res.failed();
    update.content = non_empty(res.text());
    update.tool_outcome = Some(ToolOutcome {
        tool_use_id: res.tool_use_id.clone(),
        is_error: failed,
        execution_time_ms: res.result.as_ref().and_then(|r| r.execution_time_ms),
    });
    if failed {
        update.error = Some(ErrorInfo {
            message: update.content.clone().unwrap_or_default(),
            code: None,
            subtype: None,
        });
    }
    update.timestamp.clone_from(&res.timestamp);
    update.session_id.clone_from(&res.session_id);
    update
}

fn error_update(err: &ErrorFrame) -> SemanticUpdate {
    let mut update = SemanticUpdate::new(UpdateKind::Error);
    let message = err.text();
    update.content = Some(message.clone());
    update.error = Some(ErrorInfo {
        message,
        code: err.code.clone(),
        subtype: err.subtype.clone(),
    });
    update.timestamp.clone_from(&err.timestamp);
    update.session_id.clone_from(&err.session_id);
    update
}

fn progress_update(progress: &ProgressFrame) -> SemanticUpdate {
    let mut update = SemanticUpdate::new(UpdateKind::Progress);
    update.content = progress.message.clone().or_else(|| progress.status.clone());
    update.progress = Some(ProgressInfo {
        percentage: progress.percentage,
        step: progress.step.clone(),
        total_steps: progress.total_steps,
        operation: progress.operation.clone(),
    });
    update.timestamp.clone_from(&progress.timestamp);
    update.session_id.clone_from(&progress.session_id);
    update
}
