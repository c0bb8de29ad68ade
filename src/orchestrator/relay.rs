//! Relay facade: one prompt in, one session-aware execution result out.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};

use crate::models::execution::ExecutionResult;
use crate::models::session::Session;
use crate::orchestrator::command::CommandSpec;
use crate::orchestrator::session_manager::SessionManager;
use crate::orchestrator::sink::UpdateSink;
use crate::orchestrator::supervisor::ProcessSupervisor;
use crate::{AppError, Result};

/// A prompt to run on behalf of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    /// Requesting user.
    pub user_id: String,
    /// Directory the agent runs in.
    pub working_dir: PathBuf,
    /// Prompt text.
    pub prompt: String,
    /// Explicit session to continue; otherwise the session bound to
    /// (`user_id`, `working_dir`) is used, or a new one is created.
    pub session_id: Option<String>,
}

/// Ties the process supervisor to the session lifecycle.
pub struct AgentRelay {
    supervisor: Arc<ProcessSupervisor>,
    sessions: Arc<SessionManager>,
}

impl AgentRelay {
    /// Create a relay over an existing supervisor and session manager.
    #[must_use]
    pub fn new(supervisor: Arc<ProcessSupervisor>, sessions: Arc<SessionManager>) -> Self {
        Self {
            supervisor,
            sessions,
        }
    }

    /// Process supervisor used for executions.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    /// Session manager used for continuity.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Run `request`, streaming live updates to `sink`.
    ///
    /// Placeholder ids are never handed to the agent. If the agent rejects a
    /// resumed continuity id, the stale session is removed and the prompt is
    /// retried once as a fresh turn in a new session. The returned result
    /// carries the session's final continuity id.
    ///
    /// # Errors
    ///
    /// Propagates execution failures (`Timeout`, `Process`, `Parsing`,
    /// `Cancelled`, a second `Session`) and store failures.
    pub async fn run(&self, request: &RelayRequest, sink: &dyn UpdateSink) -> Result<ExecutionResult> {
        let span = info_span!(
            "relay_run",
            user_id = %request.user_id,
            working_dir = %request.working_dir.display(),
            prompt_len = request.prompt.len()
        );
        async move {
            let mut session = self.resolve_session(request).await?;
            let spec = match session.resumable_id() {
                Some(id) => CommandSpec::resume(id, request.prompt.as_str()),
                None => CommandSpec::fresh(request.prompt.as_str()),
            };

            let result = match self
                .supervisor
                .execute(&spec, &request.working_dir, sink)
                .await
            {
                Err(AppError::Session(reason)) => {
                    warn!(session_id = %session.id, %reason, "continuity id rejected, retrying fresh");
                    self.sessions.remove(&session.id).await?;
                    session = self
                        .sessions
                        .get_or_create(&request.user_id, &request.working_dir, None)
                        .await?;
                    self.supervisor
                        .execute(
                            &CommandSpec::fresh(request.prompt.as_str()),
                            &request.working_dir,
                            sink,
                        )
                        .await?
                }
                other => other?,
            };

            let updated = self.sessions.record_result(&session.id, &result).await?;
            info!(
                session_id = %updated.id,
                cost_usd = result.cost_usd,
                duration_ms = result.duration_ms,
                num_turns = result.num_turns,
                is_error = result.is_error,
                "relay run completed"
            );
            Ok(result.with_session_id(updated.id))
        }
        .instrument(span)
        .await
    }

    /// Kill every running execution and flush the session cache.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persisting the cache fails.
    pub async fn shutdown(&self) -> Result<()> {
        let killed = self.supervisor.kill_all();
        let persisted = self.sessions.persist_active().await?;
        info!(killed, persisted, "relay shut down");
        Ok(())
    }

    async fn resolve_session(&self, request: &RelayRequest) -> Result<Session> {
        if let Some(id) = request.session_id.as_deref() {
            return self
                .sessions
                .get_or_create(&request.user_id, &request.working_dir, Some(id))
                .await;
        }
        match self
            .sessions
            .find_by_context(&request.user_id, &request.working_dir)
            .await?
        {
            Some(session) => Ok(session),
            None => {
                self.sessions
                    .get_or_create(&request.user_id, &request.working_dir, None)
                    .await
            }
        }
    }
}
