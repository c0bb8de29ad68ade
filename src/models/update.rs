//! Semantic updates delivered live while an execution streams.

use serde::Serialize;
use serde_json::Value;

/// Kind of a live update; mirrors the frame discriminator it was built from.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Assistant text and/or tool calls.
    Assistant,
    /// User-role frame (prompt echo or tool results).
    User,
    /// System notice or `init` metadata.
    System,
    /// Standalone tool result frame.
    ToolResult,
    /// Error reported by the agent.
    Error,
    /// Progress report.
    Progress,
}

/// A tool invocation requested by the assistant, as seen live.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolCall {
    /// Tool-use identifier used to correlate the result.
    pub id: Option<String>,
    /// Tool name.
    pub name: Option<String>,
    /// Raw tool input.
    pub input: Value,
}

/// Environment metadata from a `system`/`init` frame.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SystemInfo {
    /// System frame subtype (`init`, `compact_boundary`, ...).
    pub subtype: Option<String>,
    /// Tools available to the agent.
    pub tools: Vec<String>,
    /// Configured MCP servers, verbatim.
    pub mcp_servers: Vec<Value>,
    /// Model identifier.
    pub model: Option<String>,
    /// Agent working directory.
    pub cwd: Option<String>,
    /// Permission mode reported by the agent.
    pub permission_mode: Option<String>,
}

/// Outcome metadata of a standalone `tool_result` frame.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ToolOutcome {
    /// Tool-use identifier the result belongs to.
    pub tool_use_id: Option<String>,
    /// Whether the tool reported failure.
    pub is_error: bool,
    /// Execution time reported by the agent.
    pub execution_time_ms: Option<u64>,
}

/// Error details from an `error` frame or a failed tool result.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ErrorInfo {
    /// Human-readable error message.
    pub message: String,
    /// Error code, verbatim.
    pub code: Option<Value>,
    /// Error subtype.
    pub subtype: Option<String>,
}

/// Progress fields, carried verbatim.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ProgressInfo {
    /// Completion percentage.
    pub percentage: Option<f64>,
    /// Current step (number or label).
    pub step: Option<Value>,
    /// Total number of steps.
    pub total_steps: Option<u64>,
    /// Operation label.
    pub operation: Option<String>,
}

/// Uniform live update produced from one classified frame.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SemanticUpdate {
    /// Update kind.
    pub kind: UpdateKind,
    /// Text content, when the frame carried any.
    pub content: Option<String>,
    /// Tool calls requested in this frame.
    pub tool_calls: Vec<ToolCall>,
    /// System metadata for `system` frames.
    pub system: Option<SystemInfo>,
    /// Tool outcome metadata for `tool_result` frames.
    pub tool_outcome: Option<ToolOutcome>,
    /// Error details.
    pub error: Option<ErrorInfo>,
    /// Progress details.
    pub progress: Option<ProgressInfo>,
    /// Timestamp reported by the agent.
    pub timestamp: Option<String>,
    /// Continuity id referenced by the frame.
    pub session_id: Option<String>,
    /// Assistant message id, used as an execution-tracking token.
    pub execution_id: Option<String>,
}

impl SemanticUpdate {
    /// Empty update of the given kind.
    #[must_use]
    pub fn new(kind: UpdateKind) -> Self {
        Self {
            kind,
            content: None,
            tool_calls: Vec::new(),
            system: None,
            tool_outcome: None,
            error: None,
            progress: None,
            timestamp: None,
            session_id: None,
            execution_id: None,
        }
    }

    /// `true` for error frames and for failed tool results.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == UpdateKind::Error || self.tool_outcome.as_ref().is_some_and(|o| o.is_error)
    }

    /// Names of the tools requested in this update.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tool_calls
            .iter()
            .filter_map(|call| call.name.as_deref())
            .collect()
    }

    /// Progress percentage, if this is a progress update that carries one.
    #[must_use]
    pub fn progress_percentage(&self) -> Option<f64> {
        self.progress.as_ref().and_then(|p| p.percentage)
    }

    /// Error message, falling back to the content of an error update.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        if let Some(info) = &self.error {
            return Some(info.message.as_str());
        }
        if self.is_error() {
            return self.content.as_deref();
        }
        None
    }
}
