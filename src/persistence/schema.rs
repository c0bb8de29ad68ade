//! `SQLite` schema bootstrap logic.
//!
//! All definitions use `IF NOT EXISTS`, so bootstrap is safe to re-run on
//! every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply the session table and its `user_id` index.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS agent_session (
    id              TEXT PRIMARY KEY NOT NULL,
    user_id         TEXT NOT NULL,
    working_dir     TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    last_used       TEXT NOT NULL,
    total_cost      REAL NOT NULL DEFAULT 0,
    total_turns     INTEGER NOT NULL DEFAULT 0,
    message_count   INTEGER NOT NULL DEFAULT 0,
    tools_used      TEXT NOT NULL DEFAULT '[]',
    is_placeholder  INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_agent_session_user ON agent_session(user_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
