//! In-memory session repository.

use super::SessionRepository;
use crate::error::{Error, Result};
use crate::types::{NewSessionRecord, SessionRecord};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Volatile repository, mostly for tests and demos.
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    records: RwLock<Vec<SessionRecord>>,
    fail_writes: AtomicBool,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `save` and the delete operations fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored sessions across all users.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_writable(&self, operation: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::persistence(operation, "store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn save(&self, record: NewSessionRecord) -> Result<String> {
        self.check_writable("save session")?;
        record.validate()?;

        let id = uuid::Uuid::new_v4().to_string();
        self.records.write().await.push(record.into_record(id.clone()));
        Ok(id)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        let mut sessions: Vec<SessionRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(sessions)
    }

    async fn delete_one(&self, user_id: &str, id: &str) -> Result<()> {
        self.check_writable("delete session")?;

        let mut records = self.records.write().await;
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        if records[index].user_id != user_id {
            return Err(Error::PermissionDenied);
        }
        records.remove(index);
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<usize> {
        self.check_writable("delete all sessions")?;

        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.user_id != user_id);
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionTimestamp;
    use tokio_test::assert_ok;

    fn new_record(user_id: &str, seconds: i64) -> NewSessionRecord {
        NewSessionRecord {
            user_id: user_id.to_string(),
            timestamp: SessionTimestamp::new(seconds, 0),
            duration: 300,
            vibration_intensity: 50,
            average_temperature: Some(36.9),
            average_heart_rate: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_list_newest_first() {
        let repo = InMemorySessionRepository::new();
        let first = repo.save(new_record("alice", 100)).await.unwrap();
        let second = repo.save(new_record("alice", 200)).await.unwrap();
        repo.save(new_record("bob", 300)).await.unwrap();

        assert_ne!(first, second);
        let sessions = repo.list_by_user("alice").await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, second);
        assert_eq!(sessions[1].id, first);
    }

    #[tokio::test]
    async fn test_delete_is_owner_only() {
        let repo = InMemorySessionRepository::new();
        let id = repo.save(new_record("alice", 100)).await.unwrap();

        let err = repo.delete_one("bob", &id).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));

        let err = repo.delete_one("alice", "missing").await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));

        assert_ok!(repo.delete_one("alice", &id).await);
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_all_for_user() {
        let repo = InMemorySessionRepository::new();
        repo.save(new_record("alice", 1)).await.unwrap();
        repo.save(new_record("alice", 2)).await.unwrap();
        repo.save(new_record("bob", 3)).await.unwrap();

        assert_eq!(repo.delete_all_for_user("alice").await.unwrap(), 2);
        assert_eq!(repo.len().await, 1);
        assert_eq!(repo.delete_all_for_user("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let repo = InMemorySessionRepository::new();
        repo.set_fail_writes(true);
        let err = repo.save(new_record("alice", 1)).await.unwrap_err();
        assert!(err.is_persistence());
        assert!(repo.is_empty().await);
    }
}
