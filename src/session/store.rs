//! SQLite-backed durable session store.
//!
//! The store exclusively owns session records; everything else works on
//! snapshots. It also owns the per-session audit locks enforcing strict
//! serialization of iterations within one session.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::schema::{initialize_schema, is_initialized};
use super::types::{CompletionState, Session, StagnationState, Thought};
use crate::error::{Error, Result};
use crate::judge::Review;

/// Guard for a session's audit lock; the lock frees when this drops.
#[derive(Debug)]
pub struct SessionGuard {
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

/// Durable, process-wide session store.
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionStore {
    /// Open or create the store under the given state directory.
    pub fn open(state_directory: impl AsRef<Path>) -> Result<Self> {
        let dir = state_directory.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::SessionStorage(format!("cannot create {}: {e}", dir.display())))?;

        let conn = Connection::open(dir.join("sessions.db"))
            .map_err(|e| Error::SessionStorage(e.to_string()))?;
        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::SessionStorage(e.to_string()))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::SessionStorage(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::SessionStorage(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(|e| Error::SessionStorage(e.to_string()))
    }

    // ==================== Lifecycle ====================

    /// Create and persist a new session.
    pub fn create(&self, branch_id: Option<&str>) -> Result<Session> {
        let mut session = Session::new();
        if let Some(branch) = branch_id {
            session = session.with_branch(branch);
        }
        self.persist(&session)?;
        info!("Created session {}", session.id);
        Ok(session)
    }

    /// Fetch a session snapshot by id.
    pub fn get(&self, id: &str) -> Result<Option<Session>> {
        let record: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT record FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
        })?;

        match record {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Fetch the most recently updated session on a branch.
    pub fn get_branch_head(&self, branch_id: &str) -> Result<Option<Session>> {
        let record: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT record FROM sessions WHERE branch_id = ?1
                 ORDER BY updated_at DESC LIMIT 1",
                params![branch_id],
                |row| row.get(0),
            )
            .optional()
        })?;

        match record {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Fetch by id, or create when the id is unknown or absent.
    pub fn get_or_create(&self, id: Option<&str>, branch_id: Option<&str>) -> Result<Session> {
        if let Some(id) = id {
            if let Some(session) = self.get(id)? {
                return Ok(session);
            }
            // Unknown id: adopt it so the caller's handle stays stable.
            let mut session = Session::with_id(id);
            if let Some(branch) = branch_id {
                session = session.with_branch(branch);
            }
            self.persist(&session)?;
            return Ok(session);
        }
        self.create(branch_id)
    }

    /// Append one iteration to a session's history.
    ///
    /// Rejects appends to sessions that no longer accept audits.
    pub fn append(&self, id: &str, thought: Thought, review: Review) -> Result<Session> {
        let mut session = self
            .get(id)?
            .ok_or_else(|| Error::SessionStorage(format!("unknown session {id}")))?;

        if !session.accepts_audits() {
            return Err(Error::SessionStorage(format!(
                "session {id} is {} and accepts no further audits",
                session.completion.status
            )));
        }

        session.append(thought, review);
        self.persist(&session)?;
        debug!("Session {} now at loop {}", id, session.current_loop);
        Ok(session)
    }

    /// Update a session's completion state.
    pub fn update_completion(&self, id: &str, completion: CompletionState) -> Result<Session> {
        let mut session = self
            .get(id)?
            .ok_or_else(|| Error::SessionStorage(format!("unknown session {id}")))?;
        session.completion = completion;
        session.updated_at = Utc::now();
        self.persist(&session)?;
        Ok(session)
    }

    /// Update a session's stagnation state.
    pub fn update_stagnation(&self, id: &str, stagnation: StagnationState) -> Result<Session> {
        let mut session = self
            .get(id)?
            .ok_or_else(|| Error::SessionStorage(format!("unknown session {id}")))?;
        session.stagnation = stagnation;
        session.updated_at = Utc::now();
        self.persist(&session)?;
        Ok(session)
    }

    /// Remove a session.
    pub fn destroy(&self, id: &str) -> Result<bool> {
        self.locks
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock session locks: {e}")))?
            .remove(id);
        self.with_conn(|conn| {
            let rows = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(rows > 0)
        })
    }

    /// Evict sessions not updated within `max_age_ms`. Returns the count.
    pub fn cleanup(&self, max_age_ms: u64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::milliseconds(max_age_ms as i64);
        let removed = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM sessions WHERE updated_at < ?1",
                params![cutoff.to_rfc3339()],
            )
        })?;
        if removed > 0 {
            info!("Swept {removed} cold sessions");
        }
        Ok(removed)
    }

    fn persist(&self, session: &Session) -> Result<()> {
        let record = serde_json::to_string(session)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, branch_id, record, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     branch_id = excluded.branch_id,
                     record = excluded.record,
                     updated_at = excluded.updated_at",
                params![
                    session.id,
                    session.branch_id,
                    record,
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    // ==================== Per-session audit lock ====================

    fn lock_for(&self, id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock session locks: {e}")))?;
        Ok(Arc::clone(
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        ))
    }

    /// Acquire the session's audit lock.
    ///
    /// With `wait` the caller queues behind the in-flight audit; without
    /// it a busy session returns `SessionBusy` immediately.
    pub async fn acquire(&self, id: &str, wait: bool) -> Result<SessionGuard> {
        let lock = self.lock_for(id)?;
        let guard = if wait {
            lock.lock_owned().await
        } else {
            lock.try_lock_owned()
                .map_err(|_| Error::SessionBusy(id.to_string()))?
        };
        Ok(SessionGuard { _guard: guard })
    }
}
