//! Single-use session tokens gating the embedded chat iframe.
//!
//! In-memory TTL store: a token is created, may be consumed exactly once,
//! and expires after the configured lifetime. Expired entries are swept
//! opportunistically on every operation.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session id inválido ou expirado")]
    NotFound,
    #[error("session id já foi utilizado")]
    AlreadyUsed,
    #[error("session id expirado")]
    Expired,
    #[error("limite de sessions simultâneas atingido")]
    CapacityExceeded,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    used: bool,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub used_sessions: usize,
    pub max_sessions: usize,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(expiry_minutes: u64, max_sessions: usize) -> Self {
        Self::with_ttl(Duration::minutes(expiry_minutes as i64), max_sessions)
    }

    pub fn with_ttl(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            max_sessions,
        }
    }

    pub fn expiry_minutes(&self) -> i64 {
        self.ttl.num_minutes()
    }

    /// Creates a fresh single-use session id.
    pub fn create(&self) -> Result<String, SessionError> {
        let mut sessions = self.sessions.lock().unwrap();
        Self::sweep(&mut sessions);

        if sessions.len() >= self.max_sessions {
            return Err(SessionError::CapacityExceeded);
        }

        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sessions.insert(
            session_id.clone(),
            SessionEntry {
                created_at: now,
                expires_at: now + self.ttl,
                used: false,
                used_at: None,
            },
        );

        tracing::info!("Created session {}", session_id);
        Ok(session_id)
    }

    /// Validates a session id and burns it. Each id grants access once.
    pub fn validate_and_consume(&self, session_id: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().unwrap();
        Self::sweep(&mut sessions);

        let entry = sessions.get_mut(session_id).ok_or(SessionError::NotFound)?;

        if entry.used {
            return Err(SessionError::AlreadyUsed);
        }

        if Utc::now() > entry.expires_at {
            sessions.remove(session_id);
            return Err(SessionError::Expired);
        }

        entry.used = true;
        entry.used_at = Some(Utc::now());
        tracing::info!("Session {} validated and consumed", session_id);
        Ok(())
    }

    pub fn stats(&self) -> SessionStats {
        let mut sessions = self.sessions.lock().unwrap();
        Self::sweep(&mut sessions);

        let total = sessions.len();
        let used = sessions.values().filter(|s| s.used).count();
        SessionStats {
            total_sessions: total,
            active_sessions: total - used,
            used_sessions: used,
            max_sessions: self.max_sessions,
        }
    }

    /// Removes expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        Self::sweep(&mut sessions)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(sessions: &mut HashMap<String, SessionEntry>) -> usize {
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, entry| now <= entry.expires_at);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!("Removed {} expired sessions", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_sessions_validate_once() {
        let store = SessionStore::new(30, 10);
        let id = store.create().unwrap();

        assert!(store.validate_and_consume(&id).is_ok());
        assert_eq!(
            store.validate_and_consume(&id),
            Err(SessionError::AlreadyUsed)
        );
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let store = SessionStore::new(30, 10);
        assert_eq!(
            store.validate_and_consume("not-a-session"),
            Err(SessionError::NotFound)
        );
    }

    #[test]
    fn expired_sessions_are_swept() {
        let store = SessionStore::with_ttl(Duration::milliseconds(-1), 10);
        let id = store.create().unwrap();

        // Already past its expiry; the sweep drops it before lookup.
        assert_eq!(
            store.validate_and_consume(&id),
            Err(SessionError::NotFound)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn capacity_is_enforced() {
        let store = SessionStore::new(30, 2);
        store.create().unwrap();
        store.create().unwrap();
        assert_eq!(store.create(), Err(SessionError::CapacityExceeded));
    }

    #[test]
    fn stats_track_consumption() {
        let store = SessionStore::new(30, 10);
        let id = store.create().unwrap();
        store.create().unwrap();
        store.validate_and_consume(&id).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.used_sessions, 1);
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.max_sessions, 10);
    }

    #[test]
    fn cleanup_reports_removed_count() {
        let store = SessionStore::with_ttl(Duration::milliseconds(-1), 10);
        store.create().unwrap();
        assert_eq!(store.cleanup_expired(), 1);
        assert!(store.is_empty());
    }
}
