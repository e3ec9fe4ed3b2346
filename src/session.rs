//! Replicated client-session records.
//!
//! Sessions are opaque to the core: the executor replicates create/remove
//! so every replica can validate a session id locally. Fine-grained state
//! (who owns the session, expiry policy) belongs to the authentication
//! layer, which is outside this crate.

use dashmap::DashMap;

use crate::error::{Result, ServerError};

/// One recorded session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// The session id.
    pub id: String,
    /// Creation time, milliseconds since the epoch.
    pub created_at: i64,
}

/// Concurrent session table.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session. Re-creating an existing id refreshes it — session
    /// creation replays idempotently.
    pub fn create(&self, id: &str, created_at: i64) {
        self.sessions.insert(
            id.to_owned(),
            Session {
                id: id.to_owned(),
                created_at,
            },
        );
    }

    /// Drop a session. Removing an unknown id is a no-op so that log
    /// replay stays idempotent.
    pub fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }

    /// Look up a session.
    ///
    /// # Errors
    /// [`ServerError::SessionNotFound`] for an unknown id.
    pub fn get(&self, id: &str) -> Result<Session> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServerError::SessionNotFound { id: id.to_owned() })
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// `true` when no sessions are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_get_remove() {
        let store = SessionStore::new();
        store.create("s-1", 42);
        assert_eq!(store.get("s-1").unwrap().created_at, 42);

        store.remove("s-1");
        assert!(matches!(
            store.get("s-1"),
            Err(ServerError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = SessionStore::new();
        store.remove("never-existed");
        assert!(store.is_empty());
    }
}
