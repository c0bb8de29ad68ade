//! In-process session store for tests and database-less runs.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::models::session::Session;

use super::{SessionStore, StoreFuture};

/// [`SessionStore`] backed by a lock-guarded map.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn most_recent_first(mut sessions: Vec<Session>) -> Vec<Session> {
    sessions.sort_by(|a, b| b.last_used.cmp(&a.last_used));
    sessions
}

impl SessionStore for InMemorySessionStore {
    fn save<'a>(&'a self, session: &'a Session) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.sessions
                .write()
                .await
                .insert(session.id.clone(), session.clone());
            Ok(())
        })
    }

    fn load<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Session>> {
        Box::pin(async move { Ok(self.sessions.read().await.get(id).cloned()) })
    }

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.sessions.write().await.remove(id);
            Ok(())
        })
    }

    fn list_by_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<Session>> {
        Box::pin(async move {
            let sessions = self
                .sessions
                .read()
                .await
                .values()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect();
            Ok(most_recent_first(sessions))
        })
    }

    fn list_all(&self) -> StoreFuture<'_, Vec<Session>> {
        Box::pin(async move {
            let sessions = self.sessions.read().await.values().cloned().collect();
            Ok(most_recent_first(sessions))
        })
    }

    fn rename<'a>(&'a self, old_id: &'a str, session: &'a Session) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut guard = self.sessions.write().await;
            guard.remove(old_id);
            guard.insert(session.id.clone(), session.clone());
            Ok(())
        })
    }
}
