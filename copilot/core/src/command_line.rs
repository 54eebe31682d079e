//! Command Line State
//!
//! Input-side state between submissions: the command tree, the chain of
//! commands picked by earlier inputs, and which matching mode each kind of
//! submission uses.

use std::sync::Arc;

use crate::command::{Command, CommandTree};
use crate::matcher::{match_command_text, CommandMatch, MatchRequest, MatchedCommands};

/// Matching modes and root sentinel for a command line
#[derive(Clone, Debug)]
pub struct MatchSettings {
    /// Greedy mode for lines submitted with enter
    pub enter_greedy: bool,
    /// Greedy mode for programmatic runs
    pub run_greedy: bool,
    /// Sentinel that restarts matching from the root
    pub prefix: String,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            enter_greedy: false,
            run_greedy: true,
            prefix: crate::matcher::DEFAULT_COMMAND_PREFIX.to_string(),
        }
    }
}

/// Outcome of submitting a line
#[derive(Clone, Debug, PartialEq)]
pub enum Submission {
    /// The line is a complete command sequence
    Execute {
        /// Matched commands, in order
        commands: Vec<CommandMatch>,
    },
    /// More input is needed; keep the buffer
    Incomplete {
        /// What was recognized so far
        matched: MatchedCommands,
    },
}

/// The command line's picked chain and tree
#[derive(Debug)]
pub struct CommandLine {
    tree: CommandTree,
    picked: Vec<CommandMatch>,
    settings: MatchSettings,
}

impl CommandLine {
    /// Create a command line over a tree
    #[must_use]
    pub fn new(tree: CommandTree, settings: MatchSettings) -> Self {
        Self {
            tree,
            picked: Vec::new(),
            settings,
        }
    }

    /// The command tree
    #[must_use]
    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    /// Matching modes and root sentinel
    #[must_use]
    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    /// Commands picked by earlier inputs
    #[must_use]
    pub fn picked(&self) -> &[CommandMatch] {
        &self.picked
    }

    /// Match without submitting (e.g. for completion hints)
    #[must_use]
    pub fn preview(&self, text: &str, greedy: bool) -> MatchedCommands {
        match_command_text(
            &MatchRequest::new(text, &self.tree)
                .greedy(greedy)
                .picked(&self.picked)
                .prefix(&self.settings.prefix),
        )
    }

    /// Submit a line typed by the user (enter key)
    #[must_use]
    pub fn submit(&self, text: &str) -> Submission {
        self.classify(self.preview(text, self.settings.enter_greedy))
    }

    /// Submit a line programmatically
    #[must_use]
    pub fn run(&self, text: &str) -> Submission {
        self.classify(self.preview(text, self.settings.run_greedy))
    }

    fn classify(&self, matched: MatchedCommands) -> Submission {
        let terminal = matched
            .last()
            .is_some_and(|last| last.command.is_terminal());
        if matched.is_complete() && terminal {
            Submission::Execute {
                commands: matched.commands,
            }
        } else {
            Submission::Incomplete { matched }
        }
    }

    /// Record executed commands and apply the last one's publish directive
    pub fn commit(&mut self, commands: &[CommandMatch]) {
        let Some(last) = commands.last() else {
            return;
        };
        let directive = last.command.published();
        self.picked.extend(commands.iter().cloned());
        directive.apply(&mut self.picked);
        tracing::debug!(
            directive = ?directive,
            picked = self.picked.len(),
            "Committed command sequence"
        );
    }

    /// Make the next plain input continue from `command`'s trails
    pub fn offer(&mut self, command: Arc<Command>) {
        tracing::debug!(command = %command.id(), "Offering context command");
        self.picked.push(CommandMatch::literal(command));
    }

    /// Forget the picked chain
    pub fn reset(&mut self) {
        self.picked.clear();
    }
}
