//! Session repository for `SQLite` persistence.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteExecutor;

use crate::models::session::Session;
use crate::{AppError, Result};

use super::db::Database;
use super::{SessionStore, StoreFuture};

/// Repository wrapper around `SQLite` for session records.
#[derive(Clone)]
pub struct SessionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    working_dir: String,
    created_at: String,
    last_used: String,
    total_cost: f64,
    total_turns: i64,
    message_count: i64,
    tools_used: String,
    is_placeholder: bool,
}

impl SessionRow {
    /// Convert a database row into the domain model.
    fn into_session(self) -> Result<Session> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        let last_used = DateTime::parse_from_rfc3339(&self.last_used)
            .map_err(|e| AppError::Db(format!("invalid last_used: {e}")))?
            .with_timezone(&Utc);
        let tools_used = serde_json::from_str(&self.tools_used)
            .map_err(|e| AppError::Db(format!("invalid tools_used: {e}")))?;

        Ok(Session {
            id: self.id,
            user_id: self.user_id,
            working_dir: PathBuf::from(self.working_dir),
            created_at,
            last_used,
            total_cost: self.total_cost,
            total_turns: u64::try_from(self.total_turns).unwrap_or_default(),
            message_count: u64::try_from(self.message_count).unwrap_or_default(),
            tools_used,
            is_placeholder: self.is_placeholder,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, user_id, working_dir, created_at, last_used, total_cost,
     total_turns, message_count, tools_used, is_placeholder FROM agent_session";

/// Fixed-width UTC timestamp; text order matches chronological order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn into_sessions(rows: Vec<SessionRow>) -> Result<Vec<Session>> {
    rows.into_iter().map(SessionRow::into_session).collect()
}

/// Insert or replace one session row through any executor.
async fn upsert<'e, E>(executor: E, session: &Session) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    let tools_used = serde_json::to_string(&session.tools_used)
        .map_err(|e| AppError::Db(format!("serialize tools_used: {e}")))?;

    sqlx::query(
        "INSERT INTO agent_session (id, user_id, working_dir, created_at, last_used,
         total_cost, total_turns, message_count, tools_used, is_placeholder)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            working_dir = excluded.working_dir,
            created_at = excluded.created_at,
            last_used = excluded.last_used,
            total_cost = excluded.total_cost,
            total_turns = excluded.total_turns,
            message_count = excluded.message_count,
            tools_used = excluded.tools_used,
            is_placeholder = excluded.is_placeholder",
    )
    .bind(session.id.clone())
    .bind(session.user_id.clone())
    .bind(session.working_dir.to_string_lossy().into_owned())
    .bind(timestamp(session.created_at))
    .bind(timestamp(session.last_used))
    .bind(session.total_cost)
    .bind(i64::try_from(session.total_turns).unwrap_or(i64::MAX))
    .bind(i64::try_from(session.message_count).unwrap_or(i64::MAX))
    .bind(tools_used)
    .bind(session.is_placeholder)
    .execute(executor)
    .await?;
    Ok(())
}

impl SessionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a session record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn upsert(&self, session: &Session) -> Result<()> {
        upsert(self.db.as_ref(), session).await
    }

    /// Retrieve a session by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or row conversion fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;
        row.map(SessionRow::into_session).transpose()
    }

    /// Delete a session record; no-op when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM agent_session WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// List sessions owned by a user, most recently used first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY last_used DESC"
        ))
        .bind(user_id)
        .fetch_all(self.db.as_ref())
        .await?;
        into_sessions(rows)
    }

    /// List every session, most recently used first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Session>> {
        let rows: Vec<SessionRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY last_used DESC"))
                .fetch_all(self.db.as_ref())
                .await?;
        into_sessions(rows)
    }

    /// Replace `old_id` with `session` in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any statement or the commit fails; the
    /// transaction is rolled back on drop.
    pub async fn rename(&self, old_id: &str, session: &Session) -> Result<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM agent_session WHERE id = ?1")
            .bind(old_id)
            .execute(&mut *tx)
            .await?;
        upsert(&mut *tx, session).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Count stored sessions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agent_session")
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

impl SessionStore for SessionRepo {
    fn save<'a>(&'a self, session: &'a Session) -> StoreFuture<'a, ()> {
        Box::pin(self.upsert(session))
    }

    fn load<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Session>> {
        Box::pin(self.get_by_id(id))
    }

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(SessionRepo::delete(self, id))
    }

    fn list_by_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<Session>> {
        Box::pin(SessionRepo::list_by_user(self, user_id))
    }

    fn list_all(&self) -> StoreFuture<'_, Vec<Session>> {
        Box::pin(SessionRepo::list_all(self))
    }

    fn rename<'a>(&'a self, old_id: &'a str, session: &'a Session) -> StoreFuture<'a, ()> {
        Box::pin(SessionRepo::rename(self, old_id, session))
    }
}
