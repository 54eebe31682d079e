//! Copilot Events
//!
//! Everything that travels over the [`EventBus`](crate::bus::EventBus):
//! requests from the surface (execute, clear screen), lifecycle signals from
//! the orchestrator, session stack operations, and alerts from the remote
//! request layer.
//!
//! # Design Philosophy
//!
//! Surfaces report what the user did; the managers that own state decide what
//! it means. No listener mutates another component's state directly, it only
//! publishes an event the owner handles.

use std::fmt;
use std::sync::Arc;

use crate::command::Command;
use crate::matcher::{echo_line, CommandMatch};
use crate::messages::{Alert, ExecutionId, SessionId};

/// Callback receiving the current open session, if any
pub type SessionCallback = Arc<dyn Fn(Option<SessionId>) + Send + Sync>;

/// Events carried by the bus
#[derive(Clone)]
pub enum CopilotEvent {
    // ============================================
    // Execution Events
    // ============================================
    /// Begin executing a matched command sequence
    ExecuteCommand {
        /// Matched commands, in order
        commands: Vec<CommandMatch>,
        /// Optional extra argument from programmatic dispatch
        argument: Option<String>,
    },

    /// An execution started, or resumed after settling (a retry "yes")
    Executing {
        /// The new execution
        execution_id: ExecutionId,
    },

    /// The execution's continuation finished; input is unblocked
    CommandExecuted {
        /// The finished execution
        execution_id: ExecutionId,
    },

    /// Evict all unlocked execution contents
    ClearScreen,

    /// Make the next plain input continue from this command's trails
    OfferCommand(Arc<Command>),

    // ============================================
    // Session Events
    // ============================================
    /// Close the current session and open a new one
    NewSession(SessionId),

    /// Re-key the open session, or open a new one
    ReplaceSession(SessionId),

    /// Close the current session without opening another
    CloseSession,

    /// Ask for the current open session
    CurrentSession(SessionCallback),

    // ============================================
    // Remote Request Events
    // ============================================
    /// Blocking alert raised by a failed remote request
    Alert(Alert),

    /// Number of remote requests currently awaiting a response
    RequestsInFlight(usize),
}

impl CopilotEvent {
    /// The kind used for subscription filtering
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ExecuteCommand { .. } => EventKind::ExecuteCommand,
            Self::Executing { .. } => EventKind::Executing,
            Self::CommandExecuted { .. } => EventKind::CommandExecuted,
            Self::ClearScreen => EventKind::ClearScreen,
            Self::OfferCommand(_) => EventKind::OfferCommand,
            Self::NewSession(_) => EventKind::NewSession,
            Self::ReplaceSession(_) => EventKind::ReplaceSession,
            Self::CloseSession => EventKind::CloseSession,
            Self::CurrentSession(_) => EventKind::CurrentSession,
            Self::Alert(_) => EventKind::Alert,
            Self::RequestsInFlight(_) => EventKind::RequestsInFlight,
        }
    }
}

impl fmt::Debug for CopilotEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecuteCommand { commands, argument } => f
                .debug_struct("ExecuteCommand")
                .field("commands", &echo_line(commands))
                .field("argument", argument)
                .finish(),
            Self::Executing { execution_id } => f
                .debug_struct("Executing")
                .field("execution_id", execution_id)
                .finish(),
            Self::CommandExecuted { execution_id } => f
                .debug_struct("CommandExecuted")
                .field("execution_id", execution_id)
                .finish(),
            Self::ClearScreen => f.write_str("ClearScreen"),
            Self::OfferCommand(command) => {
                f.debug_tuple("OfferCommand").field(command.id()).finish()
            }
            Self::NewSession(id) => f.debug_tuple("NewSession").field(id).finish(),
            Self::ReplaceSession(id) => f.debug_tuple("ReplaceSession").field(id).finish(),
            Self::CloseSession => f.write_str("CloseSession"),
            Self::CurrentSession(_) => f.write_str("CurrentSession(..)"),
            Self::Alert(alert) => f.debug_tuple("Alert").field(alert).finish(),
            Self::RequestsInFlight(n) => f.debug_tuple("RequestsInFlight").field(n).finish(),
        }
    }
}

/// Discriminant of [`CopilotEvent`] used to subscribe to one event type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`CopilotEvent::ExecuteCommand`]
    ExecuteCommand,
    /// [`CopilotEvent::Executing`]
    Executing,
    /// [`CopilotEvent::CommandExecuted`]
    CommandExecuted,
    /// [`CopilotEvent::ClearScreen`]
    ClearScreen,
    /// [`CopilotEvent::OfferCommand`]
    OfferCommand,
    /// [`CopilotEvent::NewSession`]
    NewSession,
    /// [`CopilotEvent::ReplaceSession`]
    ReplaceSession,
    /// [`CopilotEvent::CloseSession`]
    CloseSession,
    /// [`CopilotEvent::CurrentSession`]
    CurrentSession,
    /// [`CopilotEvent::Alert`]
    Alert,
    /// [`CopilotEvent::RequestsInFlight`]
    RequestsInFlight,
}
