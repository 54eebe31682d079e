//! Command Definitions
//!
//! Static grammar nodes for the copilot command line. A command is either a
//! fixed literal (`/new`, `yes`) or the free-text catch-all that absorbs a
//! user's question. Commands are built once, shared behind `Arc`, and never
//! mutated afterwards.
//!
//! # Design Philosophy
//!
//! Commands are pure data. What happens when a command runs is decided by the
//! handler registered for its [`CommandId`] in the orchestrator, not by a
//! closure stored on the node.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier of a command, used to look up its handler
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub String);

impl CommandId {
    /// Create a command ID from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a command matches against
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandKind {
    /// A fixed literal token
    Literal(String),
    /// Arbitrary trailing input (quoted, or the rest of the line)
    FreeText,
}

/// How matching a command changes the picked chain for the next input
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishDirective {
    /// Next input starts again from the root commands
    #[default]
    Clear,
    /// Next input continues from this command's trails
    Keep,
    /// Drop the last N picked commands
    Rollback(usize),
}

impl PublishDirective {
    /// Apply the directive to a picked chain that already ends with the
    /// commands just matched
    pub fn apply<T>(self, picked: &mut Vec<T>) {
        match self {
            Self::Clear => picked.clear(),
            Self::Keep => {}
            Self::Rollback(steps) => {
                let keep = picked.len().saturating_sub(steps);
                picked.truncate(keep);
            }
        }
    }
}

/// Errors raised while assembling a command tree
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandTreeError {
    /// More than one free-text command among siblings
    #[error("command '{parent}' has more than one free-text trail")]
    DuplicateFreeText {
        /// The node whose trails are invalid (`<root>` for the roots)
        parent: String,
    },

    /// A literal command with an empty literal
    #[error("command '{0}' has an empty literal; use a free-text command instead")]
    EmptyLiteral(CommandId),
}

/// One node of the command grammar
#[derive(Debug)]
pub struct Command {
    id: CommandId,
    label: String,
    kind: CommandKind,
    trails: Vec<Arc<Command>>,
    executable_on_no_trail: bool,
    published: PublishDirective,
}

impl Command {
    /// Start a literal command. The label defaults to the literal.
    pub fn literal(id: impl Into<String>, literal: impl Into<String>) -> Self {
        let literal = literal.into();
        Self {
            id: CommandId::new(id),
            label: literal.clone(),
            kind: CommandKind::Literal(literal),
            trails: Vec::new(),
            executable_on_no_trail: false,
            published: PublishDirective::Clear,
        }
    }

    /// Start a free-text command
    pub fn free_text(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: CommandId::new(id),
            label: label.into(),
            kind: CommandKind::FreeText,
            trails: Vec::new(),
            executable_on_no_trail: false,
            published: PublishDirective::Clear,
        }
    }

    /// Set the display label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the commands reachable after this one
    #[must_use]
    pub fn with_trails(mut self, trails: Vec<Arc<Command>>) -> Self {
        self.trails = trails;
        self
    }

    /// Allow this command to execute with no further input
    #[must_use]
    pub fn executable_on_no_trail(mut self, executable: bool) -> Self {
        self.executable_on_no_trail = executable;
        self
    }

    /// Set the publish directive
    #[must_use]
    pub fn with_published(mut self, published: PublishDirective) -> Self {
        self.published = published;
        self
    }

    /// Validate and freeze the command
    pub fn build(self) -> Result<Arc<Command>, CommandTreeError> {
        if matches!(&self.kind, CommandKind::Literal(literal) if literal.is_empty()) {
            return Err(CommandTreeError::EmptyLiteral(self.id));
        }
        ensure_single_free_text(&self.trails, self.id.as_str())?;
        Ok(Arc::new(self))
    }

    /// Command identifier
    #[must_use]
    pub fn id(&self) -> &CommandId {
        &self.id
    }

    /// Display name
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Match kind
    #[must_use]
    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// The literal text, or `None` for free text
    #[must_use]
    pub fn literal_text(&self) -> Option<&str> {
        match &self.kind {
            CommandKind::Literal(literal) => Some(literal),
            CommandKind::FreeText => None,
        }
    }

    /// Whether this is the free-text catch-all
    #[must_use]
    pub fn is_free_text(&self) -> bool {
        self.kind == CommandKind::FreeText
    }

    /// Child commands
    #[must_use]
    pub fn trails(&self) -> &[Arc<Command>] {
        &self.trails
    }

    /// Whether the command may run without further input
    #[must_use]
    pub fn is_executable_on_no_trail(&self) -> bool {
        self.executable_on_no_trail
    }

    /// Whether the command is a valid end of input
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.executable_on_no_trail || self.trails.is_empty()
    }

    /// Publish directive for the next input
    #[must_use]
    pub fn published(&self) -> PublishDirective {
        self.published
    }
}

/// The root commands of a command line
#[derive(Clone, Debug, Default)]
pub struct CommandTree {
    roots: Vec<Arc<Command>>,
}

impl CommandTree {
    /// Create a tree, rejecting more than one free-text root
    pub fn new(roots: Vec<Arc<Command>>) -> Result<Self, CommandTreeError> {
        ensure_single_free_text(&roots, "<root>")?;
        Ok(Self { roots })
    }

    /// Compose a new tree with extra roots appended
    pub fn with(&self, extra: Vec<Arc<Command>>) -> Result<Self, CommandTreeError> {
        let mut roots = self.roots.clone();
        roots.extend(extra);
        Self::new(roots)
    }

    /// Root commands in priority order
    #[must_use]
    pub fn roots(&self) -> &[Arc<Command>] {
        &self.roots
    }

    /// Find a command anywhere in the tree by ID (depth-first)
    #[must_use]
    pub fn find(&self, id: &CommandId) -> Option<Arc<Command>> {
        fn walk(nodes: &[Arc<Command>], id: &CommandId) -> Option<Arc<Command>> {
            for node in nodes {
                if node.id() == id {
                    return Some(Arc::clone(node));
                }
                if let Some(found) = walk(node.trails(), id) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.roots, id)
    }
}

fn ensure_single_free_text(
    trails: &[Arc<Command>],
    parent: &str,
) -> Result<(), CommandTreeError> {
    if trails.iter().filter(|c| c.is_free_text()).count() > 1 {
        return Err(CommandTreeError::DuplicateFreeText {
            parent: parent.to_string(),
        });
    }
    Ok(())
}
