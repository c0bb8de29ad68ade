//! Shared fixtures for integration tests.
//!
//! A fake agent is a shell script run through `sh`; the generated agent
//! arguments follow the script path, so the script sees them as `"$@"`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use agent_relay::config::{AgentConfig, SessionConfig};
use agent_relay::models::update::SemanticUpdate;
use agent_relay::orchestrator::session_manager::SessionManager;
use agent_relay::persistence::memory::InMemorySessionStore;
use agent_relay::persistence::SessionStore;

/// Temporary project directory holding one fake agent script.
pub struct FakeAgent {
    dir: TempDir,
    script: PathBuf,
}

impl FakeAgent {
    /// Write `body` as the agent script.
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("fake-agent.sh");
        std::fs::write(&script, body).expect("write fake agent");
        Self { dir, script }
    }

    /// Agent printing `stream` on stdout and exiting 0.
    pub fn emitting(stream: &str) -> Self {
        Self::new(&emit(stream))
    }

    /// Working directory for executions.
    pub fn workdir(&self) -> &Path {
        self.dir.path()
    }

    /// File the script may write its arguments to.
    pub fn args_file(&self) -> PathBuf {
        self.dir.path().join("args.log")
    }

    /// Recorded argument lines, one per invocation.
    pub fn recorded_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.args_file())
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Agent config running this script through `sh`.
    pub fn config(&self) -> AgentConfig {
        AgentConfig {
            binary: "sh".into(),
            binary_args: vec![self.script.display().to_string()],
            timeout_seconds: 10,
            ..AgentConfig::default()
        }
    }
}

/// Shell snippet printing `stream` verbatim.
pub fn emit(stream: &str) -> String {
    format!("cat <<'EOF'\n{stream}\nEOF\n")
}

/// Minimal successful turn for continuity id `session_id`.
pub fn success_stream(session_id: &str, answer: &str) -> String {
    [
        format!(r#"{{"type":"system","subtype":"init","session_id":"{session_id}","tools":["Read"]}}"#),
        format!(
            r#"{{"type":"assistant","session_id":"{session_id}","message":{{"id":"msg_1","content":[{{"type":"text","text":"{answer}"}}]}}}}"#
        ),
        format!(
            r#"{{"type":"result","subtype":"success","result":"{answer}","session_id":"{session_id}","cost_usd":0.02,"duration_ms":120,"num_turns":1,"is_error":false}}"#
        ),
    ]
    .join("\n")
}

/// Session manager over a fresh in-memory store, with access to the store.
pub fn session_manager(config: SessionConfig) -> (Arc<SessionManager>, Arc<dyn SessionStore>) {
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let manager = Arc::new(SessionManager::new(config, Arc::clone(&store)));
    (manager, store)
}

/// Session settings with a one-hour idle timeout.
pub fn session_config(max_per_user: u32) -> SessionConfig {
    SessionConfig {
        timeout_hours: 1,
        max_per_user,
        cleanup_interval_seconds: 1,
    }
}

/// Drain every update already sent on a closed channel.
pub async fn collect(mut rx: tokio::sync::mpsc::Receiver<SemanticUpdate>) -> Vec<SemanticUpdate> {
    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    updates
}
