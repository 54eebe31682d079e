//! Copilot Service Traits
//!
//! Trait definitions for the remote copilot service. This abstraction lets
//! the command flows run against the real HTTP API, an in-process fake, or a
//! test double without changing core logic.
//!
//! # Design Philosophy
//!
//! The service is an opaque conversational backend. It hands out session ids,
//! answers questions, offers pickable options, and may report that it is
//! still working. Every call returns a typed [`Reply`] or a [`RemoteError`];
//! how failures are surfaced is decided by the remote request layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{PickOption, SessionId};

/// Where the conversation stands after a reply
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyState {
    /// The answer is final for this turn
    #[default]
    Answered,
    /// The service is still working; poll again
    Working,
    /// The service ended the conversation
    Closed,
}

/// One reply from the copilot service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Session the reply belongs to (may differ from the one asked with)
    pub session_id: SessionId,
    /// Answer or greeting text
    #[serde(default)]
    pub text: String,
    /// Options the user can pick from
    #[serde(default)]
    pub options: Vec<PickOption>,
    /// Conversation state
    #[serde(default)]
    pub state: ReplyState,
}

impl Reply {
    /// A final answer
    pub fn answered(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
            options: Vec::new(),
            state: ReplyState::Answered,
        }
    }

    /// A "still working" reply
    pub fn working(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            state: ReplyState::Working,
            ..Self::answered(session_id, text)
        }
    }

    /// Attach pickable options
    #[must_use]
    pub fn with_options(mut self, options: Vec<PickOption>) -> Self {
        self.options = options;
        self
    }

    /// Set the conversation state
    #[must_use]
    pub fn with_state(mut self, state: ReplyState) -> Self {
        self.state = state;
        self
    }
}

/// How a failed remote call is surfaced
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 401: alert and redirect to login, never retried
    Unauthorized,
    /// HTTP 403: alert and redirect to login, never retried
    Forbidden,
    /// Anything else: recoverable, may be retried
    Transient,
}

impl FailureKind {
    /// Whether the user may be offered a retry
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Errors returned by a copilot service
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Non-success HTTP status
    #[error("service returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The request never got a response
    #[error("connection failed: {0}")]
    Connection(String),

    /// The response could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// HTTP status code, if the service answered
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Connection(_) | Self::InvalidResponse(_) => None,
        }
    }

    /// Classify the failure
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self.status() {
            Some(401) => FailureKind::Unauthorized,
            Some(403) => FailureKind::Forbidden,
            _ => FailureKind::Transient,
        }
    }
}

/// Copilot service trait
///
/// Implement this trait to connect the command line to a copilot backend.
#[async_trait]
pub trait CopilotService: Send + Sync {
    /// Get the service name (e.g., "HTTP")
    fn name(&self) -> &str;

    /// Open a new conversation and return its greeting
    async fn start_session(&self) -> Result<Reply, RemoteError>;

    /// Ask a free-text question, in an existing conversation when given
    async fn ask(&self, session: Option<&SessionId>, question: &str)
        -> Result<Reply, RemoteError>;

    /// Pick one of the options offered in a conversation
    async fn pick(&self, session: &SessionId, token: &str) -> Result<Reply, RemoteError>;

    /// Fetch the latest state of a conversation that was still working
    async fn poll(&self, session: &SessionId) -> Result<Reply, RemoteError>;
}
