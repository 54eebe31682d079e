//! Copilot Core - Headless Command Line for a Conversational Copilot
//!
//! This crate provides the core logic of the copilot command line, completely
//! independent of any terminal or UI framework. A surface feeds it lines of
//! text and draws the executions it renders.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Surface (CLI)                           │
//! │        input line ──► Copilot::submit / Copilot::run             │
//! │        RenderDelegate ◄── ExecutionContent updates               │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                         COPILOT CORE                             │
//! │  ┌────────────┐  ┌────────────┐  ┌──────────────┐  ┌───────────┐ │
//! │  │  Command   │  │ Execution  │  │   Session    │  │  Remote   │ │
//! │  │  Matcher   │─►│Orchestrator│─►│   Manager    │  │  Invoker  │ │
//! │  └────────────┘  └─────┬──────┘  └──────────────┘  └─────┬─────┘ │
//! │                        │  EventBus (sync pub/sub)         │       │
//! │                  ┌─────┴──────┐                    ┌─────┴─────┐ │
//! │                  │ Execution  │                    │  Copilot  │ │
//! │                  │  History   │                    │  Service  │ │
//! │                  └────────────┘                    └───────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Copilot`]: Assembles everything behind `submit` and `run`
//! - [`Command`] / [`CommandTree`]: The immutable command grammar
//! - [`CommandLine`]: Picked chain plus matching modes
//! - [`Orchestrator`]: Runs handlers and drives the continuation protocol
//! - [`SessionManager`]: Stack of copilot conversations
//! - [`ExecutionHistory`]: Bounded history with pinning
//! - [`RemoteInvoker`]: In-flight counting and alerting for remote calls
//!
//! # Module Overview
//!
//! - [`command`]: Grammar nodes and trees
//! - [`matcher`]: Text to matched commands
//! - [`command_line`]: Submission state between inputs
//! - [`bus`] / [`events`]: Synchronous event bus and its events
//! - [`orchestrator`]: Executions, handlers and rendering
//! - [`execution`]: Execution contents and the bounded history
//! - [`session`]: Session stack
//! - [`remote`] / [`retry`]: Remote request layer and retry protocol
//! - [`backend`]: Copilot service abstraction (HTTP, etc.)
//! - [`flows`]: Built-in commands
//! - [`config`]: TOML / environment configuration
//! - [`messages`]: Shared identifiers and rendered output blocks

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod bus;
pub mod command;
pub mod command_line;
pub mod config;
pub mod copilot;
pub mod events;
pub mod execution;
pub mod flows;
pub mod matcher;
pub mod messages;
pub mod orchestrator;
pub mod remote;
pub mod retry;
pub mod session;

// Re-exports for convenience
pub use backend::{
    CopilotService, FailureKind, HttpCopilotService, RemoteError, Reply, ReplyState,
};
pub use bus::{EventBus, Subscription};
pub use command::{Command, CommandId, CommandKind, CommandTree, CommandTreeError, PublishDirective};
pub use command_line::{CommandLine, MatchSettings, Submission};
pub use copilot::{Copilot, Dispatch};
pub use events::{CopilotEvent, EventKind, SessionCallback};
pub use execution::{
    ExecutionContent, ExecutionError, ExecutionHistory, ExecutionResult, ExecutionStore,
    DEFAULT_HISTORY_CAPACITY,
};
pub use matcher::{
    match_command, match_command_text, CommandMatch, MatchRequest, MatchedCommand,
    MatchedCommands, DEFAULT_COMMAND_PREFIX,
};
pub use messages::{
    Alert, AlertKind, ExecutionId, HelpEntry, PickOption, Redirect, SessionId, TurnOutput,
};
pub use orchestrator::{
    CommandHandler, ExecutionHandle, HandlerRegistry, NullRenderer, Orchestrator, RenderDelegate,
    TurnContext,
};
pub use remote::{InvokeOptions, RemoteInvoker};
pub use retry::{retry_on_failure, RetryBoard, RetryChoice, RetryError, RetryPrompt};
pub use session::{CopilotSession, SessionManager, SessionStack, SessionStatus};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, CopilotConfig, CopilotToml,
};
