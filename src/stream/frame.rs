//! Frame schema for the agent's `stream-json` output.
//!
//! Each line is an object with a top-level `type` discriminator. Parsing is
//! two-step, as for any enveloped protocol: the envelope is read first, then
//! the body is deserialized into the schema for that discriminator.
//!
//! | `type`        | Maps to                    |
//! |---------------|----------------------------|
//! | `assistant`   | [`Frame::Assistant`]       |
//! | `user`        | [`Frame::User`]            |
//! | `system`      | [`Frame::System`]          |
//! | `tool_result` | [`Frame::ToolResult`]      |
//! | `error`       | [`Frame::Error`]           |
//! | `progress`    | [`Frame::Progress`]        |
//! | `result`      | [`Frame::Result`]          |
//! | *(any other)* | [`Frame::Unrecognized`]    |
//!
//! Optional fields default to `None`, empty strings/lists, `false` or `0`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{AppError, Result};

/// Discriminator of a parsed frame, used for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `assistant`
    Assistant,
    /// `user`
    User,
    /// `system`
    System,
    /// `tool_result`
    ToolResult,
    /// `error`
    Error,
    /// `progress`
    Progress,
    /// `result`
    Result,
    /// Any other discriminator value.
    Unrecognized(String),
}

impl FrameKind {
    /// Wire name of the discriminator.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Assistant => "assistant",
            Self::User => "user",
            Self::System => "system",
            Self::ToolResult => "tool_result",
            Self::Error => "error",
            Self::Progress => "progress",
            Self::Result => "result",
            Self::Unrecognized(other) => other,
        }
    }
}

/// One parsed line of agent output.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Assistant message with text and tool-use segments.
    Assistant(MessageFrame),
    /// User-role message; carries tool results in practice.
    User(MessageFrame),
    /// System notice or `init` metadata.
    System(SystemFrame),
    /// Standalone tool result.
    ToolResult(ToolResultFrame),
    /// Error report.
    Error(ErrorFrame),
    /// Progress report.
    Progress(ProgressFrame),
    /// Terminal result of the turn.
    Result(ResultFrame),
    /// Unknown discriminator; dropped by the classifier.
    Unrecognized(String),
}

impl Frame {
    /// Discriminator of this frame.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Assistant(_) => FrameKind::Assistant,
            Self::User(_) => FrameKind::User,
            Self::System(_) => FrameKind::System,
            Self::ToolResult(_) => FrameKind::ToolResult,
            Self::Error(_) => FrameKind::Error,
            Self::Progress(_) => FrameKind::Progress,
            Self::Result(_) => FrameKind::Result,
            Self::Unrecognized(other) => FrameKind::Unrecognized(other.clone()),
        }
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FrameEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    body: Map<String, Value>,
}

// ── Content segments ──────────────────────────────────────────────────────────

/// Typed segment of a message `content` list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// Segment text.
        #[serde(default)]
        text: String,
    },
    /// Tool invocation requested by the assistant.
    ToolUse {
        /// Tool-use identifier.
        #[serde(default)]
        id: Option<String>,
        /// Tool name.
        #[serde(default)]
        name: Option<String>,
        /// Tool input; `{}` when absent.
        #[serde(default = "empty_object")]
        input: Value,
    },
    /// Tool outcome, nested inside a user frame.
    ToolResult {
        /// Identifier of the invocation this result answers.
        #[serde(default)]
        tool_use_id: Option<String>,
        /// Result payload.
        #[serde(default)]
        content: ResultContent,
        /// Whether the tool failed.
        #[serde(default)]
        is_error: bool,
    },
    /// Any other segment type (thinking, images, ...).
    #[serde(other)]
    Other,
}

/// Item of a content list: a typed segment or a bare string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ContentItem {
    /// Bare string item.
    Bare(String),
    /// Typed segment.
    Block(ContentBlock),
}

/// Message `content`: a plain string or a list of segments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain string content.
    Text(String),
    /// Segment list.
    Items(Vec<ContentItem>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Items(Vec::new())
    }
}

impl MessageContent {
    /// Typed segments in order; empty for plain string content.
    pub fn blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        let items: &[ContentItem] = match self {
            Self::Text(_) => &[],
            Self::Items(items) => items,
        };
        items.iter().filter_map(|item| match item {
            ContentItem::Block(block) => Some(block),
            ContentItem::Bare(_) => None,
        })
    }

    /// Text of all typed text segments, in order.
    pub fn text_segments(&self) -> impl Iterator<Item = &str> {
        self.blocks().filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Payload of a tool result: a string, a list of segments, or anything else.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResultContent {
    /// Plain string result.
    Text(String),
    /// Segment list; text segments are joined.
    Segments(Vec<Value>),
    /// Any other JSON value, rendered verbatim.
    Other(Value),
}

impl Default for ResultContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl ResultContent {
    /// Render the payload as text.
    ///
    /// Segment lists yield their `text` segments joined by newlines; a list
    /// without any text segment is rendered as JSON.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Segments(items) => {
                let parts: Vec<&str> = items
                    .iter()
                    .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|item| item.get("text").and_then(Value::as_str))
                    .collect();
                if parts.is_empty() {
                    Value::Array(items.clone()).to_string()
                } else {
                    parts.join("\n")
                }
            }
            Self::Other(Value::Null) => String::new(),
            Self::Other(value) => value.to_string(),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

// ── Per-kind schemas ──────────────────────────────────────────────────────────

/// Inner `message` object of assistant and user frames.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageBody {
    /// Provider message id.
    #[serde(default)]
    pub id: Option<String>,
    /// Message content.
    #[serde(default)]
    pub content: MessageContent,
}

/// Schema of `assistant` and `user` frames.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageFrame {
    /// Frame id.
    #[serde(default)]
    pub id: Option<String>,
    /// Message payload.
    #[serde(default)]
    pub message: MessageBody,
    /// Continuity id reference.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Frame timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl MessageFrame {
    /// Frame id, falling back to the inner message id.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.message.id.as_deref())
    }
}

/// Schema of `system` frames.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SystemFrame {
    /// Subtype (`init`, ...).
    #[serde(default)]
    pub subtype: Option<String>,
    /// Free-text message for non-`init` subtypes.
    #[serde(default)]
    pub message: Option<String>,
    /// Tools available to the agent.
    #[serde(default)]
    pub tools: Vec<String>,
    /// MCP servers, verbatim.
    #[serde(default)]
    pub mcp_servers: Vec<Value>,
    /// Model identifier.
    #[serde(default)]
    pub model: Option<String>,
    /// Agent working directory.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Permission mode.
    #[serde(default, rename = "permissionMode")]
    pub permission_mode: Option<String>,
    /// Continuity id reference.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Frame timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Structured `result` object of a standalone tool result frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolResultBody {
    /// Result payload.
    #[serde(default)]
    pub content: ResultContent,
    /// Whether the tool failed.
    #[serde(default)]
    pub is_error: bool,
    /// Execution time in milliseconds.
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
}

/// Schema of standalone `tool_result` frames.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolResultFrame {
    /// Identifier of the answered invocation.
    #[serde(default)]
    pub tool_use_id: Option<String>,
    /// Nested result object, when the agent uses that shape.
    #[serde(default)]
    pub result: Option<ToolResultBody>,
    /// Flat payload, when the agent uses that shape.
    #[serde(default)]
    pub content: Option<ResultContent>,
    /// Flat error flag.
    #[serde(default)]
    pub is_error: Option<bool>,
    /// Continuity id reference.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Frame timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ToolResultFrame {
    /// Result text, preferring the nested `result` object.
    #[must_use]
    pub fn text(&self) -> String {
        match (&self.result, &self.content) {
            (Some(body), _) => body.content.to_text(),
            (None, Some(content)) => content.to_text(),
            (None, None) => String::new(),
        }
    }

    /// Error flag, preferring the nested `result` object.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.result
            .as_ref()
            .map_or(self.is_error.unwrap_or(false), |body| body.is_error)
    }
}

/// Schema of `error` frames.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorFrame {
    /// Error message.
    #[serde(default)]
    pub message: Option<String>,
    /// Alternative error field used by some agent versions.
    #[serde(default)]
    pub error: Option<Value>,
    /// Error code.
    #[serde(default)]
    pub code: Option<Value>,
    /// Error subtype.
    #[serde(default)]
    pub subtype: Option<String>,
    /// Continuity id reference.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Frame timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ErrorFrame {
    /// Best available error message.
    #[must_use]
    pub fn text(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        match &self.error {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => "unknown agent error".to_owned(),
        }
    }
}

/// Schema of `progress` frames.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgressFrame {
    /// Progress message.
    #[serde(default)]
    pub message: Option<String>,
    /// Status label, used when `message` is absent.
    #[serde(default)]
    pub status: Option<String>,
    /// Completion percentage.
    #[serde(default)]
    pub percentage: Option<f64>,
    /// Current step.
    #[serde(default)]
    pub step: Option<Value>,
    /// Total steps.
    #[serde(default)]
    pub total_steps: Option<u64>,
    /// Operation label.
    #[serde(default)]
    pub operation: Option<String>,
    /// Continuity id reference.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Frame timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Schema of the terminal `result` frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResultFrame {
    /// Subtype (`success`, `error_max_turns`, ...).
    #[serde(default)]
    pub subtype: Option<String>,
    /// Final answer text.
    #[serde(default)]
    pub result: Option<String>,
    /// Agent-assigned continuity id.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Cost in USD.
    #[serde(default)]
    pub cost_usd: Option<f64>,
    /// Cost in USD, as reported by newer agent versions.
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    /// Wall time in milliseconds.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Number of turns.
    #[serde(default)]
    pub num_turns: Option<u32>,
    /// Whether the turn failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ResultFrame {
    /// Reported cost, preferring `cost_usd`; `0.0` when absent.
    #[must_use]
    pub fn cost(&self) -> f64 {
        self.cost_usd.or(self.total_cost_usd).unwrap_or(0.0)
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse a single NDJSON line into a [`Frame`].
///
/// # Return value
///
/// - `Ok(Some(frame))`: a structurally valid frame (possibly
///   [`Frame::Unrecognized`]).
/// - `Ok(None)`: the line is empty or whitespace.
///
/// # Errors
///
/// - [`AppError::Frame`]`("malformed json: …")`: not a JSON object.
/// - [`AppError::Frame`]`("invalid frame: …")`: the `type` field is missing
///   or not a string, or a known kind does not match its schema.
pub fn parse_frame(line: &str) -> Result<Option<Frame>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(line)?;
    if !value.is_object() {
        return Err(AppError::Frame("invalid frame: not a json object".into()));
    }
    let envelope: FrameEnvelope = serde_json::from_value(value)
        .map_err(|e| AppError::Frame(format!("invalid frame: missing discriminator: {e}")))?;

    let frame = match envelope.kind.as_str() {
        "assistant" => Frame::Assistant(body(&envelope.kind, envelope.body)?),
        "user" => Frame::User(body(&envelope.kind, envelope.body)?),
        "system" => Frame::System(body(&envelope.kind, envelope.body)?),
        "tool_result" => Frame::ToolResult(body(&envelope.kind, envelope.body)?),
        "error" => Frame::Error(body(&envelope.kind, envelope.body)?),
        "progress" => Frame::Progress(body(&envelope.kind, envelope.body)?),
        "result" => Frame::Result(body(&envelope.kind, envelope.body)?),
        _ => Frame::Unrecognized(envelope.kind),
    };
    Ok(Some(frame))
}

fn body<T: DeserializeOwned>(kind: &str, fields: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| AppError::Frame(format!("invalid frame: {kind} body: {e}")))
}
