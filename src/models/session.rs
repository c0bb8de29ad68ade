//! Session model and lifecycle helpers.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::execution::ExecutionResult;

/// Prefix of locally minted placeholder identifiers.
pub const PLACEHOLDER_PREFIX: &str = "temp_";

/// Lifecycle status for a conversation session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Placeholder id; the agent has not assigned its own id yet.
    New,
    /// Confirmed agent-assigned id; resumable.
    Active,
    /// Idle beyond the configured timeout.
    Expired,
}

/// Conversation session bound to one user and working directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Continuity id (placeholder while `is_placeholder` is set).
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Working directory the session is bound to.
    pub working_dir: PathBuf,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last use timestamp.
    pub last_used: DateTime<Utc>,
    /// Accumulated cost in USD.
    pub total_cost: f64,
    /// Accumulated agent turns.
    pub total_turns: u64,
    /// Number of completed executions.
    pub message_count: u64,
    /// Distinct tool names ever used.
    pub tools_used: BTreeSet<String>,
    /// Whether `id` is still a locally minted placeholder.
    pub is_placeholder: bool,
}

impl Session {
    /// Construct a new placeholder session.
    #[must_use]
    pub fn new(user_id: String, working_dir: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{PLACEHOLDER_PREFIX}{}", Uuid::new_v4()),
            user_id,
            working_dir,
            created_at: now,
            last_used: now,
            total_cost: 0.0,
            total_turns: 0,
            message_count: 0,
            tools_used: BTreeSet::new(),
            is_placeholder: true,
        }
    }

    /// Whether the session has been idle longer than `timeout` at `now`.
    #[must_use]
    pub fn is_expired_at(&self, timeout: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.last_used > timeout
    }

    /// Whether the session has been idle longer than `timeout`.
    #[must_use]
    pub fn is_expired(&self, timeout: chrono::Duration) -> bool {
        self.is_expired_at(timeout, Utc::now())
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self, timeout: chrono::Duration) -> SessionStatus {
        if self.is_expired(timeout) {
            SessionStatus::Expired
        } else if self.is_placeholder {
            SessionStatus::New
        } else {
            SessionStatus::Active
        }
    }

    /// Continuity id to hand to the agent; `None` for placeholders.
    #[must_use]
    pub fn resumable_id(&self) -> Option<&str> {
        (!self.is_placeholder).then_some(self.id.as_str())
    }

    /// Fold one execution's usage into the session.
    pub fn record_usage(&mut self, result: &ExecutionResult) {
        self.last_used = Utc::now();
        self.total_cost += result.cost_usd;
        self.total_turns += u64::from(result.num_turns);
        self.message_count += 1;
        for name in result.tool_names() {
            self.tools_used.insert(name.to_owned());
        }
    }
}

/// Read-only view of one session.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionInfo {
    /// Continuity id.
    pub session_id: String,
    /// Bound working directory.
    pub working_dir: PathBuf,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last use timestamp.
    pub last_used: DateTime<Utc>,
    /// Accumulated cost in USD.
    pub total_cost: f64,
    /// Accumulated agent turns.
    pub total_turns: u64,
    /// Completed executions.
    pub message_count: u64,
    /// Distinct tool names used.
    pub tools_used: BTreeSet<String>,
    /// Lifecycle status at the time of the query.
    pub status: SessionStatus,
}

impl SessionInfo {
    /// Snapshot `session` under the given idle `timeout`.
    #[must_use]
    pub fn from_session(session: &Session, timeout: chrono::Duration) -> Self {
        Self {
            session_id: session.id.clone(),
            working_dir: session.working_dir.clone(),
            created_at: session.created_at,
            last_used: session.last_used,
            total_cost: session.total_cost,
            total_turns: session.total_turns,
            message_count: session.message_count,
            tools_used: session.tools_used.clone(),
            status: session.status(timeout),
        }
    }
}

/// Aggregate view of one user's stored sessions.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserSummary {
    /// User the summary belongs to.
    pub user_id: String,
    /// Stored sessions, expired included.
    pub total_sessions: usize,
    /// Sessions not yet expired.
    pub active_sessions: usize,
    /// Cost across all sessions in USD.
    pub total_cost: f64,
    /// Executions across all sessions.
    pub total_messages: u64,
    /// Distinct working directories.
    pub projects: BTreeSet<PathBuf>,
}
