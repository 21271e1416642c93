//! Session store
//!
//! Holds the last successful fast-path result per session id so follow-up
//! requests can say "it". Sessions expire after a TTL of inactivity; expired
//! entries read as absent and are removed by [`SessionStore::sweep`].

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default session TTL (30 minutes)
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Per-session state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    /// Session id
    pub session_id: String,
    /// Result of the last successful request
    pub last_result: Option<serde_json::Value>,
    /// When `last_result` was written
    pub last_updated: DateTime<Utc>,
    /// Successful requests recorded
    pub turns: u64,
}

struct Entry {
    session: Session,
    touched: Instant,
}

/// Concurrent session map with inactivity expiry
pub struct SessionStore {
    sessions: DashMap<String, Entry>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl SessionStore {
    /// Create a store
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Configured TTL
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_live(&self, entry: &Entry) -> bool {
        entry.touched.elapsed() < self.ttl
    }

    /// Session state, or `None` if unknown or expired
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .get(session_id)
            .filter(|entry| self.is_live(entry))
            .map(|entry| entry.session.clone())
    }

    /// The session's last result
    #[must_use]
    pub fn last_result(&self, session_id: &str) -> Option<serde_json::Value> {
        self.get(session_id).and_then(|s| s.last_result)
    }

    /// Replace the session's last result with `result`
    ///
    /// The whole value is swapped under the entry lock, so concurrent readers
    /// see either the old or the new result.
    pub fn record(&self, session_id: &str, result: serde_json::Value) {
        let now = Instant::now();
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Entry {
                session: Session {
                    session_id: session_id.to_string(),
                    last_result: None,
                    last_updated: Utc::now(),
                    turns: 0,
                },
                touched: now,
            });

        // an expired session starts over
        if now.duration_since(entry.touched) >= self.ttl {
            entry.session.turns = 0;
        }
        entry.session.last_result = Some(result);
        entry.session.last_updated = Utc::now();
        entry.session.turns += 1;
        entry.touched = now;
    }

    /// Drop a session
    pub fn remove(&self, session_id: &str) -> Option<Session> {
        self.sessions.remove(session_id).map(|(_, e)| e.session)
    }

    /// Remove expired sessions, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| self.is_live(entry));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, "Swept expired sessions");
        }
        removed
    }

    /// Stored sessions, including expired ones not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
