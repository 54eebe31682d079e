//! Copilot Messages
//!
//! Identifiers and render payloads that flow from the orchestration layer to
//! whatever surface paints them (terminal, web view, test harness).
//!
//! # Design Philosophy
//!
//! Surfaces are pure renderers. Everything a surface needs to draw a turn is
//! carried in [`TurnOutput`] blocks and [`Alert`]s; none of these types know
//! how they will be displayed.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-assigned conversation identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Wrap an identifier handed out by the copilot service
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one execution content (one rendered turn)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    /// Generate a new unique execution ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One option offered by the copilot service for `/pick`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickOption {
    /// Token the user sends back to pick this option
    pub token: String,
    /// Human-readable label
    pub label: String,
}

/// A block of rendered output inside an execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnOutput {
    /// Plain answer or greeting text
    Text(String),
    /// Text followed by options the user can pick
    Options {
        /// Text shown above the options
        prompt: String,
        /// Pickable options
        options: Vec<PickOption>,
    },
    /// The service is still working on the answer
    Working(String),
    /// A transient failure; the user is asked whether to retry
    RetryPrompt {
        /// What failed
        reason: String,
    },
    /// Short acknowledgment or informational line
    Notice(String),
    /// Command listing
    Help(Vec<HelpEntry>),
    /// The command failed and will not be retried
    Error(String),
}

/// One line of `/help` output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpEntry {
    /// What to type
    pub usage: String,
    /// What it does
    pub description: String,
}

/// Alert severity classes for remote failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    /// HTTP 401
    Unauthorized,
    /// HTTP 403
    AccessDenied,
    /// Anything else the caller did not handle itself
    Unpredicted,
}

impl AlertKind {
    /// Default alert title
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::AccessDenied => "Access denied",
            Self::Unpredicted => "Unpredicted error",
        }
    }
}

/// Where the surface must navigate after an alert
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Redirect {
    /// Back to the login page
    Login,
}

/// A blocking alert raised by the remote request layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert class
    pub kind: AlertKind,
    /// Detail text
    pub message: String,
    /// Navigation forced by the alert
    pub redirect: Option<Redirect>,
}

impl Alert {
    /// Create an alert; auth failures always redirect to login
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        let redirect = match kind {
            AlertKind::Unauthorized | AlertKind::AccessDenied => Some(Redirect::Login),
            AlertKind::Unpredicted => None,
        };
        Self {
            kind,
            message: message.into(),
            redirect,
        }
    }
}
