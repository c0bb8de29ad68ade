//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Sub-classification of a non-zero agent process exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessFailureKind {
    /// The agent CLI has no usable credentials.
    Authentication,
    /// The account hit its usage limit; carries the parsed reset time, if any.
    UsageLimit {
        /// Reset time as printed by the agent (e.g. `3pm`).
        reset_at: Option<String>,
        /// Timezone label found next to the reset time.
        timezone: Option<String>,
    },
    /// Any other failure.
    Generic,
}

/// Details of a failed agent process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFailure {
    /// Classified failure family.
    pub kind: ProcessFailureKind,
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard error (possibly truncated).
    pub stderr: String,
}

impl ProcessFailure {
    /// Actionable, user-facing description of the failure.
    #[must_use]
    pub fn remediation(&self) -> String {
        match &self.kind {
            ProcessFailureKind::Authentication => "The agent CLI is not authenticated. \
                 Run `claude setup-token`, complete the login flow, then retry. \
                 On servers, set ANTHROPIC_API_KEY for the service account instead."
                .to_owned(),
            ProcessFailureKind::UsageLimit { reset_at, timezone } => {
                let when = reset_at.as_deref().unwrap_or("later");
                let zone = timezone
                    .as_deref()
                    .map(|tz| format!(" ({tz})"))
                    .unwrap_or_default();
                format!(
                    "The agent usage limit has been reached. It resets at {when}{zone}; \
                     retry after that time or send a smaller request."
                )
            }
            ProcessFailureKind::Generic => {
                let code = self
                    .exit_code
                    .map_or_else(|| "a signal".to_owned(), |c| format!("code {c}"));
                format!("The agent process exited with {code}: {}", self.stderr.trim())
            }
        }
    }
}

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Line-level framing or frame-schema failure; never fatal for an execution.
    Frame(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Execution exceeded its time budget and the process was killed.
    Timeout(String),
    /// Agent process exited with a non-zero status.
    Process(ProcessFailure),
    /// Agent rejected the continuity id it was asked to resume.
    Session(String),
    /// The agent stream ended without a terminal `result` frame.
    Parsing(String),
    /// Execution was terminated by a supervisor-wide shutdown.
    Cancelled(String),
}

impl AppError {
    /// User-facing message suitable for relaying back to whoever sent the prompt.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Process(failure) => failure.remediation(),
            Self::Session(_) => "The requested conversation is no longer available. \
                 A new session will be created automatically for your next request."
                .to_owned(),
            Self::Timeout(msg) => format!("The agent did not finish in time: {msg}"),
            other => other.to_string(),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Frame(msg) => write!(f, "frame: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Process(failure) => match failure.exit_code {
                Some(code) => write!(f, "process: exited with code {code}: {}", failure.stderr.trim()),
                None => write!(f, "process: terminated by signal: {}", failure.stderr.trim()),
            },
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Parsing(msg) => write!(f, "parsing: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Frame(format!("malformed json: {err}"))
    }
}
