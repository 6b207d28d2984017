//! The owned session map.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Instant;

use spyline_protocol::{ConnectionId, SessionId};

use crate::{Session, SessionConfig};

/// Every live session, keyed by id.
///
/// Pure data: no timers, no I/O, no interior locking. The gateway owns the
/// one instance and is the only caller, which serialises all access.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates a lobby with `host` as its only player.
    pub fn create(&mut self, host: ConnectionId, host_name: String) -> (SessionId, &Session) {
        self.create_at(host, host_name, Instant::now())
    }

    /// Like [`create`](Self::create), with an explicit creation time.
    pub fn create_at(
        &mut self,
        host: ConnectionId,
        host_name: String,
        now: Instant,
    ) -> (SessionId, &Session) {
        // v4 collisions are astronomically unlikely; redraw anyway.
        let mut id = SessionId::new_v4();
        while self.sessions.contains_key(&id) {
            id = SessionId::new_v4();
        }
        let session = match self.sessions.entry(id) {
            Entry::Vacant(slot) => slot.insert(Session::new(id, host, host_name, now)),
            Entry::Occupied(slot) => slot.into_mut(),
        };
        tracing::info!(session_id = %id, host = %host, "session created");
        (id, session)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Removes a session, returning it if it existed.
    pub fn delete(&mut self, id: SessionId) -> Option<Session> {
        let removed = self.sessions.remove(&id);
        if removed.is_some() {
            tracing::info!(session_id = %id, "session deleted");
        }
        removed
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of every session `conn` is a player in.
    pub fn sessions_with(&self, conn: ConnectionId) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.contains(conn))
            .map(Session::id)
            .collect()
    }

    /// Deletes sessions that never left the lobby and are older than
    /// `idle_retention` at `now`. Returns what was removed.
    pub fn reclaim_stale_at(&mut self, now: Instant) -> Vec<Session> {
        let retention = self.config.idle_retention;
        let stale: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| !s.has_started() && now.saturating_duration_since(s.created_at()) > retention)
            .map(Session::id)
            .collect();

        let reclaimed: Vec<Session> = stale
            .into_iter()
            .filter_map(|id| self.sessions.remove(&id))
            .collect();
        if !reclaimed.is_empty() {
            tracing::info!(count = reclaimed.len(), "reclaimed idle sessions");
        }
        reclaimed
    }

    /// Like [`reclaim_stale_at`](Self::reclaim_stale_at), measured now.
    pub fn reclaim_stale(&mut self) -> Vec<Session> {
        self.reclaim_stale_at(Instant::now())
    }
}
