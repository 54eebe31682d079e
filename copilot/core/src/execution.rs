//! Execution History
//!
//! Bounded, order-preserving history of executed command sequences. Each
//! entry is one rendered turn: the matched commands, when they ran, whether
//! the user pinned the entry, and the latest result.
//!
//! # Eviction
//!
//! The history holds at most `capacity` entries (30 by default). When an
//! append overflows it, the first *unlocked* entry from the front is dropped,
//! so pinned entries survive. The appended entry is always kept: when every
//! existing entry is pinned nothing is dropped and the history grows past
//! its capacity.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use crate::bus::{EventBus, Subscription};
use crate::events::EventKind;
use crate::matcher::{echo_line, CommandMatch};
use crate::messages::{ExecutionId, TurnOutput};

/// Default number of entries kept
pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

/// Errors from history operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// No entry with that id (never created, evicted or cleared)
    #[error("execution {0} is not in the history")]
    NotFound(ExecutionId),

    /// No entry at that position
    #[error("no execution at position {0}")]
    NoSuchPosition(usize),
}

/// The in-progress or final result of a turn
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Rendered blocks, oldest first
    pub content: Vec<TurnOutput>,
    /// More updates are coming; show a "thinking" placeholder
    pub to_be_continue: bool,
}

impl ExecutionResult {
    /// A result waiting for its first update
    #[must_use]
    pub fn pending() -> Self {
        Self {
            content: Vec::new(),
            to_be_continue: true,
        }
    }

    /// The last rendered block
    #[must_use]
    pub fn last(&self) -> Option<&TurnOutput> {
        self.content.last()
    }
}

/// One turn in the history
#[derive(Clone, Debug)]
pub struct ExecutionContent {
    /// Unique id
    pub id: ExecutionId,
    /// Commands that were executed
    pub commands: Vec<CommandMatch>,
    /// Extra argument from programmatic dispatch
    pub argument: Option<String>,
    /// When execution started
    pub time: DateTime<Utc>,
    /// Pinned by the user; never evicted or cleared
    pub locked: bool,
    /// Latest result
    pub result: ExecutionResult,
}

impl ExecutionContent {
    /// Start a new, unlocked, pending execution
    #[must_use]
    pub fn new(commands: Vec<CommandMatch>, argument: Option<String>) -> Self {
        Self {
            id: ExecutionId::new(),
            commands,
            argument,
            time: Utc::now(),
            locked: false,
            result: ExecutionResult::pending(),
        }
    }

    /// The command line to echo above the result
    #[must_use]
    pub fn echo(&self) -> String {
        echo_line(&self.commands)
    }
}

/// The history itself
#[derive(Debug)]
pub struct ExecutionStore {
    entries: Vec<ExecutionContent>,
    capacity: usize,
}

impl Default for ExecutionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ExecutionStore {
    /// Create an empty history with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Configured capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, evicting the oldest unlocked one on overflow
    ///
    /// The newcomer is always kept; when every existing entry is locked the
    /// history grows past its capacity. Returns the evicted entry, if any.
    pub fn push(&mut self, content: ExecutionContent) -> Option<ExecutionContent> {
        let victim = if self.entries.len() >= self.capacity {
            self.entries.iter().position(|entry| !entry.locked)
        } else {
            None
        };
        let evicted = victim.map(|idx| self.entries.remove(idx));
        self.entries.push(content);

        if let Some(ref evicted) = evicted {
            tracing::debug!(
                execution_id = %evicted.id,
                remaining = self.entries.len(),
                "Evicted execution from history"
            );
        }
        evicted
    }

    /// Remove every unlocked entry, keeping the order of the rest
    ///
    /// Returns the number of entries removed.
    pub fn clear_screen(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.locked);
        let removed = before - self.entries.len();
        tracing::debug!(removed, kept = self.entries.len(), "Cleared screen");
        removed
    }

    /// Look up an entry
    #[must_use]
    pub fn get(&self, id: ExecutionId) -> Option<&ExecutionContent> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Replace an entry's result
    pub fn update_result(
        &mut self,
        id: ExecutionId,
        result: ExecutionResult,
    ) -> Result<(), ExecutionError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(ExecutionError::NotFound(id))?;
        entry.result = result;
        Ok(())
    }

    /// Pin or unpin an entry
    pub fn set_locked(&mut self, id: ExecutionId, locked: bool) -> Result<(), ExecutionError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(ExecutionError::NotFound(id))?;
        entry.locked = locked;
        Ok(())
    }

    /// Flip an entry's pin; returns the new state
    pub fn toggle_locked(&mut self, id: ExecutionId) -> Result<bool, ExecutionError> {
        let locked = !self.get(id).ok_or(ExecutionError::NotFound(id))?.locked;
        self.set_locked(id, locked)?;
        Ok(locked)
    }

    /// Id of the entry at a 1-based position
    pub fn id_at(&self, position: usize) -> Result<ExecutionId, ExecutionError> {
        position
            .checked_sub(1)
            .and_then(|idx| self.entries.get(idx))
            .map(|entry| entry.id)
            .ok_or(ExecutionError::NoSuchPosition(position))
    }

    /// Entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionContent> {
        self.entries.iter()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared owner of the execution history
#[derive(Clone, Debug, Default)]
pub struct ExecutionHistory {
    store: Arc<Mutex<ExecutionStore>>,
}

impl ExecutionHistory {
    /// Create a history with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            store: Arc::new(Mutex::new(ExecutionStore::new(capacity))),
        }
    }

    /// See [`ExecutionStore::push`]
    pub fn push(&self, content: ExecutionContent) -> Option<ExecutionContent> {
        self.store.lock().push(content)
    }

    /// See [`ExecutionStore::clear_screen`]
    pub fn clear_screen(&self) -> usize {
        self.store.lock().clear_screen()
    }

    /// See [`ExecutionStore::update_result`]
    pub fn update_result(
        &self,
        id: ExecutionId,
        result: ExecutionResult,
    ) -> Result<(), ExecutionError> {
        self.store.lock().update_result(id, result)
    }

    /// See [`ExecutionStore::set_locked`]
    pub fn set_locked(&self, id: ExecutionId, locked: bool) -> Result<(), ExecutionError> {
        self.store.lock().set_locked(id, locked)
    }

    /// See [`ExecutionStore::toggle_locked`]
    pub fn toggle_locked(&self, id: ExecutionId) -> Result<bool, ExecutionError> {
        self.store.lock().toggle_locked(id)
    }

    /// See [`ExecutionStore::id_at`]
    pub fn id_at(&self, position: usize) -> Result<ExecutionId, ExecutionError> {
        self.store.lock().id_at(position)
    }

    /// Copy of one entry
    #[must_use]
    pub fn get(&self, id: ExecutionId) -> Option<ExecutionContent> {
        self.store.lock().get(id).cloned()
    }

    /// Copy of every entry, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<ExecutionContent> {
        self.store.lock().iter().cloned().collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    /// Whether the history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Clear the screen when [`CopilotEvent::ClearScreen`](crate::events::CopilotEvent::ClearScreen) is published
    pub fn attach(&self, bus: &EventBus) -> Subscription {
        let history = self.clone();
        bus.subscribe(EventKind::ClearScreen, move |_| {
            history.clear_screen();
        })
    }
}
