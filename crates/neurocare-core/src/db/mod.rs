//! Direct SQLite storage for session history.
//!
//! The schema is embedded and applied on open, so a fresh file is usable
//! immediately.

use crate::error::{Error, Result};
use crate::repository::SessionRepository;
use crate::types::{NewSessionRecord, SessionRecord, SessionTimestamp};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Session table migration (001)
pub const THERAPY_SESSIONS_SQL: &str = include_str!("migrations/001_therapy_sessions.sql");

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at a specific path
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(Error::Database)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(THERAPY_SESSIONS_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a finished session, returning the new id
    pub fn insert_session(&self, record: &NewSessionRecord) -> Result<String> {
        record.validate()?;
        let duration = i64::try_from(record.duration)
            .map_err(|_| Error::validation("duration", "is too large to store"))?;

        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO therapy_session
             (id, user_id, timestamp_seconds, timestamp_nanos, duration_seconds,
              vibration_intensity, average_temperature, average_heart_rate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                record.user_id,
                record.timestamp.seconds,
                record.timestamp.nanoseconds,
                duration,
                record.vibration_intensity,
                record.average_temperature,
                record.average_heart_rate,
            ],
        )?;

        debug!(session_id = %id, user_id = %record.user_id, "session inserted");
        Ok(id)
    }

    /// List all sessions for a user, newest first
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, timestamp_seconds, timestamp_nanos, duration_seconds,
                    vibration_intensity, average_temperature, average_heart_rate
             FROM therapy_session
             WHERE user_id = ?1
             ORDER BY timestamp_seconds DESC, timestamp_nanos DESC",
        )?;
        let sessions = stmt
            .query_map(params![user_id], Self::map_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Get session by ID
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, timestamp_seconds, timestamp_nanos, duration_seconds,
                    vibration_intensity, average_temperature, average_heart_rate
             FROM therapy_session WHERE id = ?1",
        )?;

        Ok(stmt
            .query_row(params![session_id], Self::map_session)
            .optional()?)
    }

    /// Delete one session, checking ownership first
    pub fn delete_session(&self, user_id: &str, session_id: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let owner: Option<String> = conn
            .query_row(
                "SELECT user_id FROM therapy_session WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;

        match owner {
            None => Err(Error::SessionNotFound(session_id.to_string())),
            Some(owner) if owner != user_id => Err(Error::PermissionDenied),
            Some(_) => {
                conn.execute(
                    "DELETE FROM therapy_session WHERE id = ?1 AND user_id = ?2",
                    params![session_id, user_id],
                )?;
                Ok(())
            }
        }
    }

    /// Delete every session belonging to a user
    pub fn delete_sessions_for_user(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let deleted = conn.execute(
            "DELETE FROM therapy_session WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(deleted)
    }

    fn map_session(row: &rusqlite::Row) -> rusqlite::Result<SessionRecord> {
        let nanos: i64 = row.get(3)?;
        let duration: i64 = row.get(4)?;
        let intensity: i64 = row.get(5)?;

        Ok(SessionRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            timestamp: SessionTimestamp::new(
                row.get(2)?,
                u32::try_from(nanos)
                    .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(3, nanos))?,
            ),
            duration: u64::try_from(duration)
                .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(4, duration))?,
            vibration_intensity: u8::try_from(intensity)
                .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(5, intensity))?,
            average_temperature: row.get(6)?,
            average_heart_rate: row.get(7)?,
        })
    }
}

/// Report storage failures as `Persistence`. Caller mistakes (bad input,
/// unknown or foreign ids) keep their own variant.
fn storage_error(operation: &'static str) -> impl FnOnce(Error) -> Error {
    move |e| match e {
        Error::Validation { .. }
        | Error::SessionNotFound(_)
        | Error::PermissionDenied
        | Error::Persistence { .. } => e,
        other => Error::persistence(operation, other),
    }
}

#[async_trait]
impl SessionRepository for Database {
    async fn save(&self, record: NewSessionRecord) -> Result<String> {
        self.insert_session(&record).map_err(storage_error("save session"))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        self.list_sessions(user_id).map_err(storage_error("list sessions"))
    }

    async fn delete_one(&self, user_id: &str, id: &str) -> Result<()> {
        self.delete_session(user_id, id).map_err(storage_error("delete session"))
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<usize> {
        self.delete_sessions_for_user(user_id).map_err(storage_error("delete sessions"))
    }
}
