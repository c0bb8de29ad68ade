//! Agent command construction.
//!
//! Translates a continuity request into the agent CLI's argument vector:
//!
//! | Request                              | Arguments                          |
//! |--------------------------------------|------------------------------------|
//! | continue, empty prompt               | `--continue [--resume <id>]`       |
//! | continue, id and prompt              | `--resume <id> -p <prompt>`        |
//! | anything else                        | `-p <prompt>`                      |
//!
//! followed by the output mode, turn cap, tool allow-list and permission flag.

use std::path::Path;

use crate::config::AgentConfig;
use crate::models::execution::ContinuityMode;

/// Environment variable pinning the agent's project directory.
pub const PROJECT_DIR_ENV: &str = "CLAUDE_PROJECT_DIR";

/// Environment variable keeping bash tool calls inside the project directory.
pub const MAINTAIN_WORKDIR_ENV: &str = "CLAUDE_BASH_MAINTAIN_PROJECT_WORKING_DIR";

/// What to ask the agent for in one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Prompt text; may be empty for a bare continuation.
    pub prompt: String,
    /// Agent-assigned continuity id to resume, if any.
    pub continuity_id: Option<String>,
    /// Whether earlier conversation state should be continued.
    pub continue_session: bool,
}

impl CommandSpec {
    /// Fresh turn with `prompt`.
    #[must_use]
    pub fn fresh(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            continuity_id: None,
            continue_session: false,
        }
    }

    /// Resume `continuity_id` with a new `prompt`.
    #[must_use]
    pub fn resume(continuity_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            continuity_id: Some(continuity_id.into()),
            continue_session: true,
        }
    }

    /// Continue the most recent conversation, optionally pinned to an id.
    #[must_use]
    pub fn continue_recent(continuity_id: Option<String>) -> Self {
        Self {
            prompt: String::new(),
            continuity_id,
            continue_session: true,
        }
    }

    /// Continuity mode implied by this request.
    #[must_use]
    pub fn mode(&self) -> ContinuityMode {
        if !self.continue_session {
            ContinuityMode::New
        } else if self.prompt.is_empty() {
            ContinuityMode::Continue
        } else if self.continuity_id.is_some() {
            ContinuityMode::Resume
        } else {
            ContinuityMode::New
        }
    }

    /// Full argument vector for the agent binary, excluding
    /// [`AgentConfig::binary_args`].
    #[must_use]
    pub fn args(&self, config: &AgentConfig) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        match (self.continue_session, self.prompt.is_empty(), &self.continuity_id) {
            (true, true, id) => {
                args.push("--continue".into());
                if let Some(id) = id {
                    args.push("--resume".into());
                    args.push(id.clone());
                }
            }
            (true, false, Some(id)) => {
                args.push("--resume".into());
                args.push(id.clone());
                args.push("-p".into());
                args.push(self.prompt.clone());
            }
            _ => {
                args.push("-p".into());
                args.push(self.prompt.clone());
            }
        }

        args.extend([
            "--output-format".into(),
            "stream-json".into(),
            "--verbose".into(),
            "--max-turns".into(),
            config.max_turns.to_string(),
        ]);

        if !config.allowed_tools.is_empty() {
            args.push("--allowedTools".into());
            args.push(config.allowed_tools.join(","));
        }
        if config.skip_permissions {
            args.push("--dangerously-skip-permissions".into());
        }
        args
    }
}

/// Extra environment for an agent running in `working_dir`.
#[must_use]
pub fn agent_env(working_dir: &Path) -> [(&'static str, String); 2] {
    [
        (PROJECT_DIR_ENV, working_dir.display().to_string()),
        (MAINTAIN_WORKDIR_ENV, "true".to_owned()),
    ]
}
