//! Session Management
//!
//! Tracks the conversation sessions a command line has opened with the
//! copilot service. Sessions form a stack: opening a new one closes the
//! previous top, and a server-assigned id can re-key the open top in place.
//!
//! # Design Philosophy
//!
//! The stack is owned by [`SessionManager`] and only changes through its four
//! operations (or the matching bus events). Replying against a closed or
//! missing session is never an error: `replace_session` falls back to opening
//! a new session, so a stale id heals itself on the next answer.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bus::{EventBus, Subscription};
use crate::events::{CopilotEvent, EventKind};
use crate::messages::SessionId;

/// Session status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Conversation is open and accepting turns
    Processing,
    /// Conversation was superseded or ended
    Closed,
}

/// One conversation with the copilot service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopilotSession {
    /// Service-side identifier
    pub id: SessionId,
    /// Open or closed
    pub status: SessionStatus,
}

impl CopilotSession {
    fn open(id: SessionId) -> Self {
        Self {
            id,
            status: SessionStatus::Processing,
        }
    }

    /// Whether the session accepts turns
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Processing
    }
}

/// Unbounded stack of sessions; only the top is ever open
#[derive(Debug, Default)]
pub struct SessionStack {
    sessions: Vec<CopilotSession>,
}

impl SessionStack {
    /// Create an empty stack
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the current top (if any) and push a new open session
    pub fn new_session(&mut self, id: SessionId) {
        if let Some(top) = self.sessions.last_mut() {
            top.status = SessionStatus::Closed;
        }
        tracing::debug!(session_id = %id, depth = self.sessions.len() + 1, "Opening session");
        self.sessions.push(CopilotSession::open(id));
    }

    /// Re-key the open top, or open a new session if there is none
    pub fn replace_session(&mut self, id: SessionId) {
        match self.sessions.last_mut() {
            Some(top) if top.is_open() => {
                if top.id != id {
                    tracing::debug!(from = %top.id, to = %id, "Replacing session id");
                    top.id = id;
                }
            }
            _ => self.new_session(id),
        }
    }

    /// The id of the top session, only while it is open
    #[must_use]
    pub fn current_session(&self) -> Option<SessionId> {
        self.sessions
            .last()
            .filter(|top| top.is_open())
            .map(|top| top.id.clone())
    }

    /// Close the top session without opening another
    pub fn close_current(&mut self) {
        if let Some(top) = self.sessions.last_mut() {
            if top.is_open() {
                tracing::debug!(session_id = %top.id, "Closing session");
            }
            top.status = SessionStatus::Closed;
        }
    }

    /// All sessions, oldest first
    #[must_use]
    pub fn sessions(&self) -> &[CopilotSession] {
        &self.sessions
    }

    /// Number of sessions ever opened
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session was ever opened
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Shared owner of the session stack
#[derive(Clone, Debug, Default)]
pub struct SessionManager {
    stack: Arc<Mutex<SessionStack>>,
}

impl SessionManager {
    /// Create a manager with an empty stack
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// See [`SessionStack::new_session`]
    pub fn new_session(&self, id: SessionId) {
        self.stack.lock().new_session(id);
    }

    /// See [`SessionStack::replace_session`]
    pub fn replace_session(&self, id: SessionId) {
        self.stack.lock().replace_session(id);
    }

    /// See [`SessionStack::current_session`]
    #[must_use]
    pub fn current_session(&self) -> Option<SessionId> {
        self.stack.lock().current_session()
    }

    /// See [`SessionStack::close_current`]
    pub fn close_current(&self) {
        self.stack.lock().close_current();
    }

    /// Copy of every session, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<CopilotSession> {
        self.stack.lock().sessions().to_vec()
    }

    /// Handle the session events published on `bus`
    pub fn attach(&self, bus: &EventBus) -> Vec<Subscription> {
        let kinds = [
            EventKind::NewSession,
            EventKind::ReplaceSession,
            EventKind::CloseSession,
            EventKind::CurrentSession,
        ];
        kinds
            .into_iter()
            .map(|kind| {
                let manager = self.clone();
                bus.subscribe(kind, move |event| manager.handle_event(event))
            })
            .collect()
    }

    fn handle_event(&self, event: &CopilotEvent) {
        match event {
            CopilotEvent::NewSession(id) => self.new_session(id.clone()),
            CopilotEvent::ReplaceSession(id) => self.replace_session(id.clone()),
            CopilotEvent::CloseSession => self.close_current(),
            CopilotEvent::CurrentSession(callback) => {
                // Release the lock before calling out
                let current = self.current_session();
                callback(current);
            }
            _ => {}
        }
    }
}
