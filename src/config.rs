//! Global configuration parsing, validation, and environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Default tool allow-list handed to the agent CLI.
pub const DEFAULT_ALLOWED_TOOLS: &[&str] = &[
    "Read",
    "Write",
    "Edit",
    "Bash",
    "Glob",
    "Grep",
    "Task",
    "WebFetch",
    "WebSearch",
    "TodoWrite",
    "MultiEdit",
    "NotebookRead",
    "NotebookEdit",
    "LS",
];

/// Settings for invoking the external agent process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent CLI binary (e.g. `claude`).
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Arguments placed before the generated arguments (e.g. a wrapper script).
    #[serde(default)]
    pub binary_args: Vec<String>,
    /// Hard deadline for one execution, covering both streaming and exit.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Cap on internal agent turns (`--max-turns`).
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Tool names passed through `--allowedTools`.
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    /// Append `--dangerously-skip-permissions` to every invocation.
    #[serde(default = "default_true")]
    pub skip_permissions: bool,
    /// Tool whose results may arrive as plain assistant text.
    #[serde(default = "default_subtask_tool")]
    pub subtask_tool: String,
    /// Size of each read from the agent's stdout.
    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,
    /// Longest single frame accepted before the line is discarded.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// Number of recent frame kinds retained for diagnostics.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Idle time after which a session expires.
    #[serde(default = "default_session_timeout_hours")]
    pub timeout_hours: u32,
    /// Maximum stored sessions per user before LRU eviction.
    #[serde(default = "default_max_per_user")]
    pub max_per_user: u32,
    /// Interval between background expiry sweeps.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

fn default_binary() -> String {
    "claude".into()
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_max_turns() -> u32 {
    50
}

fn default_allowed_tools() -> Vec<String> {
    DEFAULT_ALLOWED_TOOLS.iter().map(|&t| t.to_owned()).collect()
}

fn default_true() -> bool {
    true
}

fn default_subtask_tool() -> String {
    "Task".into()
}

fn default_read_chunk_bytes() -> usize {
    64 * 1024
}

fn default_max_line_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_history_limit() -> usize {
    1000
}

fn default_session_timeout_hours() -> u32 {
    24
}

fn default_max_per_user() -> u32 {
    5
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            binary_args: Vec::new(),
            timeout_seconds: default_timeout_seconds(),
            max_turns: default_max_turns(),
            allowed_tools: default_allowed_tools(),
            skip_permissions: true,
            subtask_tool: default_subtask_tool(),
            read_chunk_bytes: default_read_chunk_bytes(),
            max_line_bytes: default_max_line_bytes(),
            history_limit: default_history_limit(),
        }
    }
}

impl AgentConfig {
    /// Execution deadline as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_hours: default_session_timeout_hours(),
            max_per_user: default_max_per_user(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

impl SessionConfig {
    /// Idle timeout as a `chrono` duration.
    #[must_use]
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.timeout_hours))
    }

    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` file for durable sessions; in-memory storage when absent.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Agent process settings.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Session lifecycle settings.
    #[serde(default)]
    pub sessions: SessionConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an override has an invalid value.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup, then re-validate.
    ///
    /// Recognised keys: `CLAUDE_BINARY_PATH`, `CLAUDE_TIMEOUT_SECONDS`,
    /// `CLAUDE_MAX_TURNS`, `CLAUDE_ALLOWED_TOOLS` (comma separated),
    /// `CLAUDE_SKIP_PERMISSIONS`, `CLAUDE_SESSION_TIMEOUT_HOURS` and
    /// `CLAUDE_MAX_SESSIONS_PER_USER`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a numeric or boolean value fails to parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(binary) = lookup("CLAUDE_BINARY_PATH") {
            self.agent.binary = binary;
        }
        if let Some(raw) = lookup("CLAUDE_TIMEOUT_SECONDS") {
            self.agent.timeout_seconds = parse_override("CLAUDE_TIMEOUT_SECONDS", &raw)?;
        }
        if let Some(raw) = lookup("CLAUDE_MAX_TURNS") {
            self.agent.max_turns = parse_override("CLAUDE_MAX_TURNS", &raw)?;
        }
        if let Some(raw) = lookup("CLAUDE_ALLOWED_TOOLS") {
            self.agent.allowed_tools = raw
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(raw) = lookup("CLAUDE_SKIP_PERMISSIONS") {
            self.agent.skip_permissions = raw.trim().eq_ignore_ascii_case("true");
        }
        if let Some(raw) = lookup("CLAUDE_SESSION_TIMEOUT_HOURS") {
            self.sessions.timeout_hours = parse_override("CLAUDE_SESSION_TIMEOUT_HOURS", &raw)?;
        }
        if let Some(raw) = lookup("CLAUDE_MAX_SESSIONS_PER_USER") {
            self.sessions.max_per_user = parse_override("CLAUDE_MAX_SESSIONS_PER_USER", &raw)?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.agent.binary.trim().is_empty() {
            return Err(AppError::Config("agent.binary must not be empty".into()));
        }
        if self.agent.timeout_seconds == 0 {
            return Err(AppError::Config(
                "agent.timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.agent.max_turns == 0 {
            return Err(AppError::Config(
                "agent.max_turns must be greater than zero".into(),
            ));
        }
        if self.agent.read_chunk_bytes == 0 || self.agent.max_line_bytes == 0 {
            return Err(AppError::Config(
                "agent read sizes must be greater than zero".into(),
            ));
        }
        if self.sessions.max_per_user == 0 {
            return Err(AppError::Config(
                "sessions.max_per_user must be greater than zero".into(),
            ));
        }
        if self.sessions.cleanup_interval_seconds == 0 {
            return Err(AppError::Config(
                "sessions.cleanup_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.agent.allowed_tools.is_empty() {
            warn!("agent.allowed_tools is empty; --allowedTools will be omitted");
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("invalid value for {key}: {raw}")))
}
