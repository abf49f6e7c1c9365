//! Visitor and session identity
//!
//! The visitor id lives in durable storage and is generated exactly once per
//! storage origin. The session record lives in session-scoped storage and is
//! touched on every tracked event; after `session_timeout` of inactivity it is
//! replaced by a fresh record.
//!
//! Storage failures never reach the caller. When a store cannot be read or
//! written the identity falls back to an in-memory value that lasts as long as
//! this `IdentityStore`.

use std::sync::Arc;

use crate::clock::Clock;
use crate::storage::Storage;
use crate::types::{SessionRecord, SESSION_KEY, VISITOR_ID_KEY};

/// Generate a random, version-tagged id (UUID v4 layout).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct IdentityStore {
    durable: Box<dyn Storage>,
    session: Box<dyn Storage>,
    clock: Arc<dyn Clock>,
    session_timeout: chrono::Duration,
    ephemeral_visitor: Option<String>,
    ephemeral_session: Option<SessionRecord>,
}

impl IdentityStore {
    pub fn new(
        durable: Box<dyn Storage>,
        session: Box<dyn Storage>,
        clock: Arc<dyn Clock>,
        session_timeout: chrono::Duration,
    ) -> Self {
        Self {
            durable,
            session,
            clock,
            session_timeout,
            ephemeral_visitor: None,
            ephemeral_session: None,
        }
    }

    /// Return the visitor id, creating and persisting it on first use.
    pub fn get_or_create_visitor_id(&mut self) -> String {
        if let Some(id) = &self.ephemeral_visitor {
            return id.clone();
        }

        match self.durable.get_item(VISITOR_ID_KEY) {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => {
                let id = generate_id();
                if let Err(e) = self.durable.set_item(VISITOR_ID_KEY, &id) {
                    tracing::debug!(error = %e, "Visitor id not persisted, keeping it in memory");
                    self.ephemeral_visitor = Some(id.clone());
                }
                id
            }
            Err(e) => {
                tracing::debug!(error = %e, "Durable storage unavailable, using in-memory visitor id");
                let id = generate_id();
                self.ephemeral_visitor = Some(id.clone());
                id
            }
        }
    }

    /// Return the current session id, starting a new session if there is none
    /// or the previous one expired, and touching it otherwise.
    pub fn get_or_create_session_id(&mut self) -> String {
        let now = self.clock.now();

        let current = match &self.ephemeral_session {
            Some(record) => Some(record.clone()),
            None => self.read_session(),
        };

        let record = match current {
            Some(mut record) if record.is_active(now, self.session_timeout) => {
                record.touch(now);
                record
            }
            Some(expired) => {
                tracing::debug!(session_id = %expired.id, "Session expired, starting a new one");
                SessionRecord::new(generate_id(), now)
            }
            None => SessionRecord::new(generate_id(), now),
        };

        self.write_session(&record);
        record.id
    }

    /// The stored session record without touching it.
    pub fn session(&self) -> Option<SessionRecord> {
        self.ephemeral_session.clone().or_else(|| self.read_session())
    }

    /// Forget the current session; the next event starts a new one.
    pub fn reset_session(&mut self) {
        self.ephemeral_session = None;
        if let Err(e) = self.session.remove_item(SESSION_KEY) {
            tracing::debug!(error = %e, "Failed to remove session record");
        }
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        self.session_timeout
    }

    /// Read the session record; malformed or unreadable records count as absent.
    fn read_session(&self) -> Option<SessionRecord> {
        let raw = match self.session.get_item(SESSION_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::debug!(error = %e, "Session storage unavailable");
                return None;
            }
        };

        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) if !record.id.is_empty() => Some(record),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Discarding malformed session record");
                None
            }
        }
    }

    fn write_session(&mut self, record: &SessionRecord) {
        let persisted = serde_json::to_string(record)
            .map_err(crate::Error::from)
            .and_then(|json| self.session.set_item(SESSION_KEY, &json));

        match persisted {
            Ok(()) => self.ephemeral_session = None,
            Err(e) => {
                tracing::debug!(error = %e, "Session not persisted, keeping it in memory");
                self.ephemeral_session = Some(record.clone());
            }
        }
    }
}
