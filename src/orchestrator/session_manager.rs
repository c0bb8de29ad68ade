//! Session lifecycle management.
//!
//! Maps (user, working directory) pairs to continuity ids. Sessions start as
//! `temp_` placeholders and are renamed to the agent-assigned id once the
//! first execution completes. The active cache is guarded by one async mutex;
//! a rename runs entirely under that lock and uses the store's transactional
//! [`SessionStore::rename`], so no caller ever sees a session under both ids.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::SessionConfig;
use crate::models::execution::ExecutionResult;
use crate::models::session::{Session, SessionInfo, UserSummary};
use crate::persistence::SessionStore;
use crate::{AppError, Result};

/// Owns the active-session cache and the durable store.
pub struct SessionManager {
    config: SessionConfig,
    store: Arc<dyn SessionStore>,
    active: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
    /// Create a manager over `store` with an empty cache.
    #[must_use]
    pub fn new(config: SessionConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            config,
            store,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Session lifecycle settings.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Return the live session `session_id`, or create a new placeholder.
    ///
    /// The active cache is consulted first, then the store. Expired sessions
    /// are never returned. Before creating, the user's least recently used
    /// session is evicted if the user is at `max_per_user`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store fails.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        working_dir: &Path,
        session_id: Option<&str>,
    ) -> Result<Session> {
        let span = info_span!("get_or_create_session", user_id, session_id);
        async move {
            let timeout = self.config.idle_timeout();
            let mut active = self.active.lock().await;

            if let Some(id) = session_id {
                let cached = match active.get(id) {
                    Some(session) => Some(session.clone()),
                    None => self.store.load(id).await?,
                };
                match cached {
                    Some(session) if session.user_id != user_id => {
                        warn!(
                            session_id = id,
                            owner = %session.user_id,
                            "session belongs to another user, starting a new one"
                        );
                    }
                    Some(session) if !session.is_expired(timeout) => {
                        debug!(session_id = id, "resuming session");
                        active.insert(session.id.clone(), session.clone());
                        return Ok(session);
                    }
                    _ => {}
                }
            }

            let owned = self.store.list_by_user(user_id).await?;
            let cap = usize::try_from(self.config.max_per_user).unwrap_or(usize::MAX);
            if owned.len() >= cap {
                if let Some(oldest) = owned.iter().min_by_key(|s| s.last_used) {
                    active.remove(&oldest.id);
                    self.store.delete(&oldest.id).await?;
                    info!(
                        evicted_session_id = %oldest.id,
                        owned = owned.len(),
                        "evicted least recently used session"
                    );
                }
            }

            let session = Session::new(user_id.to_owned(), working_dir.to_path_buf());
            self.store.save(&session).await?;
            active.insert(session.id.clone(), session.clone());
            info!(
                session_id = %session.id,
                working_dir = %working_dir.display(),
                "created placeholder session"
            );
            Ok(session)
        }
        .instrument(span)
        .await
    }

    /// First live session of `user_id` bound to `working_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store fails.
    pub async fn find_by_context(
        &self,
        user_id: &str,
        working_dir: &Path,
    ) -> Result<Option<Session>> {
        let timeout = self.config.idle_timeout();
        let mut active = self.active.lock().await;

        if let Some(session) = active
            .values()
            .find(|s| s.user_id == user_id && s.working_dir == working_dir && !s.is_expired(timeout))
        {
            debug!(session_id = %session.id, user_id, "found cached session by context");
            return Ok(Some(session.clone()));
        }

        let stored = self.store.list_by_user(user_id).await?;
        let found = stored
            .into_iter()
            .find(|s| s.working_dir == working_dir && !s.is_expired(timeout));
        if let Some(session) = &found {
            debug!(session_id = %session.id, user_id, "found stored session by context");
            active.insert(session.id.clone(), session.clone());
        }
        Ok(found)
    }

    /// Fold an execution result into session `session_id`.
    ///
    /// A placeholder session whose result carries an agent-assigned id is
    /// first renamed (cache and store) and marked active; usage accounting is
    /// applied afterwards. A placeholder without an agent id stays a
    /// placeholder. Returns the updated session.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` if the session is neither cached nor stored.
    /// - `AppError::Db` if the store fails.
    pub async fn record_result(&self, session_id: &str, result: &ExecutionResult) -> Result<Session> {
        let span = info_span!("record_result", session_id);
        async move {
            let mut active = self.active.lock().await;

            let mut session = match active.get(session_id) {
                Some(session) => session.clone(),
                None => self
                    .store
                    .load(session_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?,
            };

            let agent_id = result.session_id.as_str();
            if session.is_placeholder && !agent_id.is_empty() && agent_id != session.id {
                let old_id = std::mem::replace(&mut session.id, agent_id.to_owned());
                session.is_placeholder = false;
                self.store.rename(&old_id, &session).await?;
                active.remove(&old_id);
                active.insert(session.id.clone(), session.clone());
                info!(
                    old_session_id = %old_id,
                    new_session_id = %session.id,
                    "placeholder renamed to agent session id"
                );
            }

            session.record_usage(result);
            self.store.save(&session).await?;
            active.insert(session.id.clone(), session.clone());

            debug!(
                session_id = %session.id,
                total_cost = session.total_cost,
                message_count = session.message_count,
                "session usage recorded"
            );
            Ok(session)
        }
        .instrument(span)
        .await
    }

    /// Delete a session from the cache and the store. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store fails.
    pub async fn remove(&self, session_id: &str) -> Result<()> {
        let mut active = self.active.lock().await;
        active.remove(session_id);
        self.store.delete(session_id).await?;
        info!(session_id, "session removed");
        Ok(())
    }

    /// Remove every stored session idle beyond the timeout.
    ///
    /// Returns the number of sessions removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store fails.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let timeout = self.config.idle_timeout();
        let mut active = self.active.lock().await;

        active.retain(|_, s| !s.is_expired(timeout));

        let mut removed = 0;
        for session in self.store.list_all().await? {
            if session.is_expired(timeout) {
                active.remove(&session.id);
                self.store.delete(&session.id).await?;
                removed += 1;
            }
        }
        info!(removed, "expired session sweep completed");
        Ok(removed)
    }

    /// Snapshot of one session, cached or stored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store fails.
    pub async fn session_info(&self, session_id: &str) -> Result<Option<SessionInfo>> {
        let cached = self.active.lock().await.get(session_id).cloned();
        let session = match cached {
            Some(session) => Some(session),
            None => self.store.load(session_id).await?,
        };
        Ok(session.map(|s| SessionInfo::from_session(&s, self.config.idle_timeout())))
    }

    /// Snapshots of every stored session of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store fails.
    pub async fn user_sessions(&self, user_id: &str) -> Result<Vec<SessionInfo>> {
        let timeout = self.config.idle_timeout();
        Ok(self
            .store
            .list_by_user(user_id)
            .await?
            .iter()
            .map(|s| SessionInfo::from_session(s, timeout))
            .collect())
    }

    /// Aggregate usage across the stored sessions of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store fails.
    pub async fn user_summary(&self, user_id: &str) -> Result<UserSummary> {
        let timeout = self.config.idle_timeout();
        let sessions = self.store.list_by_user(user_id).await?;
        Ok(UserSummary {
            user_id: user_id.to_owned(),
            total_sessions: sessions.len(),
            active_sessions: sessions.iter().filter(|s| !s.is_expired(timeout)).count(),
            total_cost: sessions.iter().map(|s| s.total_cost).sum(),
            total_messages: sessions.iter().map(|s| s.message_count).sum(),
            projects: sessions
                .iter()
                .map(|s| s.working_dir.clone())
                .collect::<BTreeSet<_>>(),
        })
    }

    /// Write every cached session back to the store.
    ///
    /// Returns the number of sessions written.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store fails.
    pub async fn persist_active(&self) -> Result<usize> {
        let active = self.active.lock().await;
        for session in active.values() {
            self.store.save(session).await?;
        }
        debug!(count = active.len(), "active sessions persisted");
        Ok(active.len())
    }

    /// Number of cached sessions.
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }
}
