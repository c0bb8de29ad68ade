//! Persistence layer: the session storage contract and its backends.

pub mod db;
pub mod memory;
pub mod retention;
pub mod schema;
pub mod session_repo;

use std::future::Future;
use std::pin::Pin;

use crate::models::session::Session;
use crate::Result;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Boxed future returned by [`SessionStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Durable session storage.
///
/// Every operation is idempotent and succeeds when no matching record
/// exists. Listings are ordered by `last_used`, most recent first.
pub trait SessionStore: Send + Sync {
    /// Insert or replace `session`.
    fn save<'a>(&'a self, session: &'a Session) -> StoreFuture<'a, ()>;

    /// Load a session by id.
    fn load<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Session>>;

    /// Delete a session by id.
    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()>;

    /// All sessions owned by `user_id`.
    fn list_by_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<Session>>;

    /// Every stored session.
    fn list_all(&self) -> StoreFuture<'_, Vec<Session>>;

    /// Delete `old_id` and save `session` as one unit.
    fn rename<'a>(&'a self, old_id: &'a str, session: &'a Session) -> StoreFuture<'a, ()>;
}
