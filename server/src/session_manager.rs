//! Registry of active driver sessions
//!
//! This module owns every live [`Session`] and handles:
//! - Session creation on connect, at most one per player GUID
//! - Finalization and removal on disconnect
//! - Read and write sweeps over all sessions for the sampling tick
//! - Live metric lookups for display purposes
//!
//! The registry itself is not synchronized. The tracker wraps it in a lock so
//! that lifecycle changes and sweeps never interleave.

use crate::session::{FinalizedSession, Session};
use log::{debug, info};
use shared::{PlayerGuid, NO_NAME};
use std::collections::HashMap;

/// Outcome of removing a session from the registry
#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    /// No session was registered for the GUID
    NotFound,
    /// The session was removed without ever becoming ready; nothing to persist
    Incomplete,
    /// The session was removed and its metrics need persisting
    Finalized(FinalizedSession),
}

/// Keyed store of active sessions
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<PlayerGuid, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Creates a session for a newly connected player
    ///
    /// Returns None if the GUID already has an active session. The existing
    /// session is left untouched in that case.
    pub fn add_session(
        &mut self,
        guid: PlayerGuid,
        name: Option<String>,
        model: String,
        now_ms: u64,
    ) -> Option<&Session> {
        if self.sessions.contains_key(&guid) {
            debug!("Session for {} already active, ignoring connect", guid);
            return None;
        }

        let session = Session::new(guid, name, model, now_ms);
        info!(
            "Session created: {} ({}) in {}",
            session.sanitized_name(),
            guid,
            session.model
        );

        let session = self.sessions.entry(guid).or_insert(session);
        Some(&*session)
    }

    /// Finalizes and removes a session
    ///
    /// The session is always removed once found, whatever later happens to
    /// the returned metrics.
    pub fn remove_session(&mut self, guid: &PlayerGuid, now_ms: u64) -> Removal {
        let Some(session) = self.sessions.get(guid) else {
            return Removal::NotFound;
        };

        let removal = match session.finalize(now_ms) {
            Some(summary) => Removal::Finalized(summary),
            None => {
                debug!("Session for {} never became ready, skipping stats", guid);
                Removal::Incomplete
            }
        };

        if let Some(session) = self.sessions.remove(guid) {
            info!("Closing session for: {}", session.sanitized_name());
        }

        removal
    }

    /// Marks a session as fully connected so it gets sampled and persisted
    pub fn mark_ready(&mut self, guid: &PlayerGuid) -> bool {
        match self.sessions.get_mut(guid) {
            Some(session) => {
                session.ready = true;
                true
            }
            None => false,
        }
    }

    pub fn get_session(&self, guid: &PlayerGuid) -> Option<&Session> {
        self.sessions.get(guid)
    }

    pub fn get_session_mut(&mut self, guid: &PlayerGuid) -> Option<&mut Session> {
        self.sessions.get_mut(guid)
    }

    /// Visits every active session without modifying it
    pub fn for_each_session<F>(&self, mut visit: F)
    where
        F: FnMut(&Session),
    {
        for session in self.sessions.values() {
            visit(session);
        }
    }

    /// Visits every active session mutably, used to push speed samples
    pub fn for_each_session_mut<F>(&mut self, mut visit: F)
    where
        F: FnMut(&mut Session),
    {
        for session in self.sessions.values_mut() {
            visit(session);
        }
    }

    /// Sanitized display name of an active player, or the placeholder name
    pub fn sanitized_name(&self, guid: &PlayerGuid) -> String {
        self.sessions
            .get(guid)
            .map(Session::sanitized_name)
            .unwrap_or_else(|| NO_NAME.to_string())
    }

    pub fn top_speed(&self, guid: &PlayerGuid) -> i32 {
        self.sessions.get(guid).map_or(0, Session::top_speed)
    }

    pub fn average_speed(&self, guid: &PlayerGuid) -> i32 {
        self.sessions.get(guid).map_or(0, Session::average_speed)
    }

    pub fn guids(&self) -> Vec<PlayerGuid> {
        self.sessions.keys().copied().collect()
    }

    /// Returns the number of active sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are active
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
