//! Session history storage.
//!
//! [`SessionRepository`] is the seam between the core and whatever backs the
//! history (in-memory for tests, SQLite for the CLI).

mod memory;

pub use memory::*;

use crate::error::Result;
use crate::types::{NewSessionRecord, SessionRecord};
use async_trait::async_trait;

/// Storage for completed sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a finished session and return its assigned id.
    async fn save(&self, record: NewSessionRecord) -> Result<String>;

    /// All sessions for a user, newest first.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<SessionRecord>>;

    /// Delete one session owned by `user_id`.
    ///
    /// Fails with `SessionNotFound` for unknown ids and `PermissionDenied`
    /// when the session belongs to someone else.
    async fn delete_one(&self, user_id: &str, id: &str) -> Result<()>;

    /// Delete every session owned by `user_id`, returning how many went.
    async fn delete_all_for_user(&self, user_id: &str) -> Result<usize>;
}
