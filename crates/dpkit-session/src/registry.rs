//! Caller-owned collection of named sessions.

use std::collections::HashMap;

use crate::Session;

/// Maps a name (usually a server id) to its [`Session`].
///
/// There is no global instance; whoever manages several servers owns one.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session, returning the one it replaced, if any.
    ///
    /// A replaced session keeps running; stop it if it is no longer needed.
    pub fn insert(&mut self, name: impl Into<String>, session: Session) -> Option<Session> {
        let name = name.into();
        tracing::debug!(%name, "session registered");
        self.sessions.insert(name, session)
    }

    pub fn get(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    /// Removes a session without stopping it.
    pub fn remove(&mut self, name: &str) -> Option<Session> {
        self.sessions.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Stops and removes every session.
    pub async fn stop_all(&mut self) {
        for (name, session) in self.sessions.drain() {
            if let Err(e) = session.stop().await {
                tracing::warn!(%name, error = %e, "session did not stop cleanly");
            }
        }
        tracing::info!("all sessions stopped");
    }
}
