//! Execution bookkeeping and the final per-turn result.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// How an execution relates to earlier conversation state.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContinuityMode {
    /// Fresh conversation.
    New,
    /// Resume a specific continuity id with a new prompt.
    Resume,
    /// Continue the most recent conversation without a new prompt.
    Continue,
}

/// One live agent process, as tracked by the supervisor registry.
#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    /// Generated execution identifier.
    pub id: String,
    /// Working directory the process runs in.
    pub working_dir: PathBuf,
    /// Continuity mode of the invocation.
    pub mode: ContinuityMode,
    /// Spawn time.
    pub started_at: DateTime<Utc>,
    /// Timeout budget.
    pub timeout: Duration,
    /// OS process id, if still known.
    pub pid: Option<u32>,
}

/// A tool invocation with its correlated result, if any arrived.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolInvocation {
    /// Tool-use identifier.
    pub id: Option<String>,
    /// Tool name.
    pub name: Option<String>,
    /// Raw tool input.
    pub input: Value,
    /// Timestamp of the frame that carried the invocation.
    pub timestamp: Option<String>,
    /// Result content, explicit or approximated from the following frame.
    pub result: Option<String>,
}

/// Final structured outcome of one execution.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionResult {
    /// Final answer text.
    pub content: String,
    /// Continuity id reported by the agent.
    pub session_id: String,
    /// Monetary cost in USD.
    pub cost_usd: f64,
    /// Wall time reported by the agent.
    pub duration_ms: u64,
    /// Number of agent turns.
    pub num_turns: u32,
    /// Whether the agent flagged the turn as failed.
    pub is_error: bool,
    /// Result subtype when `is_error` is set.
    pub error_kind: Option<String>,
    /// Every tool invocation of the execution, in stream order.
    pub tools_used: Vec<ToolInvocation>,
    /// Side-channel call log for the working directory.
    pub call_log: Vec<Value>,
}

impl ExecutionResult {
    /// Same result stamped with a different continuity id.
    #[must_use]
    pub fn with_session_id(self, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..self
        }
    }

    /// Distinct tool names used, in first-use order.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.tools_used.iter().filter_map(|t| t.name.as_deref()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}
