//! Command Matcher
//!
//! Turns a line of raw input into an ordered list of matched commands plus
//! whatever text could not (yet) be consumed.
//!
//! # Matching rules
//!
//! At each level the trails of the current node are tried in order:
//!
//! 1. a literal equal to the whole remaining text
//! 2. a literal followed by whitespace
//! 3. (greedy only) a literal that is a bare prefix of the text
//! 4. the free-text trail, if one exists
//!
//! Free text in greedy mode swallows the rest of the line. In non-greedy mode a
//! value that starts with `"` or `'` runs to the next unescaped matching quote;
//! an unterminated quote leaves the whole text as leftover so the caller can
//! wait for more keystrokes. Unquoted text is taken whole only when the
//! free-text command has no trails, since nothing could follow it anyway.
//!
//! Matching never fails: unknown or incomplete input is reported through
//! [`MatchedCommands::left`]. Nothing is mutated, so re-matching the same text
//! always yields the same result.

use std::sync::Arc;

use crate::command::{Command, CommandId, CommandTree};

/// Sentinel that restarts matching from the root commands
pub const DEFAULT_COMMAND_PREFIX: &str = "/";

/// A command that matched, with its free-text value if it has one
#[derive(Clone, Debug)]
pub struct CommandMatch {
    /// The matched grammar node
    pub command: Arc<Command>,
    /// Free-text value (only for free-text commands)
    pub value: Option<String>,
}

impl CommandMatch {
    /// Match of a literal command
    #[must_use]
    pub fn literal(command: Arc<Command>) -> Self {
        Self {
            command,
            value: None,
        }
    }

    /// Match of a free-text command with its value
    #[must_use]
    pub fn free_text(command: Arc<Command>, value: impl Into<String>) -> Self {
        Self {
            command,
            value: Some(value.into()),
        }
    }

    /// ID of the matched command
    #[must_use]
    pub fn id(&self) -> &CommandId {
        self.command.id()
    }

    /// Text to echo back for this command
    #[must_use]
    pub fn display_text(&self) -> String {
        match (&self.value, self.command.literal_text()) {
            (Some(value), _) => value.clone(),
            (None, Some(literal)) => literal.to_string(),
            (None, None) => String::new(),
        }
    }
}

impl PartialEq for CommandMatch {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.command, &other.command) && self.value == other.value
    }
}

/// Result of a single matching step
#[derive(Clone, Debug, PartialEq)]
pub struct MatchedCommand {
    /// The command that matched, if any
    pub command: Option<CommandMatch>,
    /// Text left after the match (the untouched input when nothing matched)
    pub left: String,
}

impl MatchedCommand {
    fn matched(command: CommandMatch, left: impl Into<String>) -> Self {
        Self {
            command: Some(command),
            left: left.into(),
        }
    }

    fn unmatched(text: &str) -> Self {
        Self {
            command: None,
            left: text.to_string(),
        }
    }
}

/// Accumulated result of matching a whole line
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchedCommands {
    /// Commands matched, in input order
    pub commands: Vec<CommandMatch>,
    /// Unconsumed text
    pub left: String,
}

impl MatchedCommands {
    /// Whether every character of the input was consumed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.commands.is_empty() && self.left.trim().is_empty()
    }

    /// The last matched command
    #[must_use]
    pub fn last(&self) -> Option<&CommandMatch> {
        self.commands.last()
    }

    /// Echo of the matched commands as a single line
    #[must_use]
    pub fn echo(&self) -> String {
        echo_line(&self.commands)
    }
}

/// Render a sequence of matches as the line the user would have typed
#[must_use]
pub fn echo_line(commands: &[CommandMatch]) -> String {
    commands
        .iter()
        .map(CommandMatch::display_text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Input to [`match_command_text`]
#[derive(Clone, Copy, Debug)]
pub struct MatchRequest<'a> {
    /// Raw input text
    pub text: &'a str,
    /// Greedy mode (free text without quoting, bare literal prefixes)
    pub greedy: bool,
    /// The whole command tree
    pub all_commands: &'a CommandTree,
    /// Commands picked by earlier inputs
    pub picked_commands: &'a [CommandMatch],
    /// Sentinel that forces matching from the root
    pub prefix: &'a str,
}

impl<'a> MatchRequest<'a> {
    /// Non-greedy request starting from the root
    #[must_use]
    pub fn new(text: &'a str, all_commands: &'a CommandTree) -> Self {
        Self {
            text,
            greedy: false,
            all_commands,
            picked_commands: &[],
            prefix: DEFAULT_COMMAND_PREFIX,
        }
    }

    /// Set greedy mode
    #[must_use]
    pub fn greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    /// Continue from previously picked commands
    #[must_use]
    pub fn picked(mut self, picked_commands: &'a [CommandMatch]) -> Self {
        self.picked_commands = picked_commands;
        self
    }

    /// Override the root sentinel
    #[must_use]
    pub fn prefix(mut self, prefix: &'a str) -> Self {
        self.prefix = prefix;
        self
    }
}

/// Match a line of input against the command tree
#[must_use]
pub fn match_command_text(request: &MatchRequest<'_>) -> MatchedCommands {
    let from_root = request.text.trim_start().starts_with(request.prefix)
        || request.picked_commands.is_empty();

    let trails: &[Arc<Command>] = if from_root {
        request.all_commands.roots()
    } else {
        request
            .picked_commands
            .last()
            .map(|picked| picked.command.trails())
            .unwrap_or_default()
    };

    let mut matched = MatchedCommands::default();
    match_into(trails, request.text, request.greedy, &mut matched);
    matched
}

fn match_into(trails: &[Arc<Command>], text: &str, greedy: bool, acc: &mut MatchedCommands) {
    let step = match_command(trails, text, greedy);
    let Some(found) = step.command else {
        acc.left = step.left;
        return;
    };

    let command = Arc::clone(&found.command);
    acc.commands.push(found);

    if step.left.is_empty() || command.trails().is_empty() {
        acc.left = step.left;
        return;
    }

    match_into(command.trails(), &step.left, greedy, acc);
}

/// Match one command from `trails` at the start of `text`
#[must_use]
pub fn match_command(trails: &[Arc<Command>], text: &str, greedy: bool) -> MatchedCommand {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return MatchedCommand::unmatched(text);
    }

    let literals = || {
        trails
            .iter()
            .filter_map(|command| command.literal_text().map(|literal| (command, literal)))
    };

    if let Some((command, _)) = literals().find(|(_, literal)| trimmed == *literal) {
        return MatchedCommand::matched(CommandMatch::literal(Arc::clone(command)), "");
    }

    for (command, literal) in literals() {
        if let Some(rest) = trimmed.strip_prefix(literal) {
            if rest.starts_with(char::is_whitespace) {
                return MatchedCommand::matched(
                    CommandMatch::literal(Arc::clone(command)),
                    rest.trim_start(),
                );
            }
        }
    }

    if greedy {
        for (command, literal) in literals() {
            if let Some(rest) = trimmed.strip_prefix(literal) {
                return MatchedCommand::matched(
                    CommandMatch::literal(Arc::clone(command)),
                    rest.trim_start(),
                );
            }
        }
    }

    let Some(free_text) = trails.iter().find(|command| command.is_free_text()) else {
        return MatchedCommand::unmatched(text);
    };

    if greedy {
        return MatchedCommand::matched(
            CommandMatch::free_text(Arc::clone(free_text), trimmed),
            "",
        );
    }

    match trimmed.chars().next() {
        Some(quote @ ('"' | '\'')) => match find_closing_quote(trimmed, quote) {
            Some(end) => MatchedCommand::matched(
                CommandMatch::free_text(Arc::clone(free_text), &trimmed[1..end]),
                trimmed[end + 1..].trim_start(),
            ),
            None => MatchedCommand::unmatched(text),
        },
        _ if free_text.trails().is_empty() => MatchedCommand::matched(
            CommandMatch::free_text(Arc::clone(free_text), trimmed),
            "",
        ),
        _ => MatchedCommand::unmatched(text),
    }
}

/// Byte index of the quote closing the one at index 0, skipping `\`-escaped quotes
fn find_closing_quote(text: &str, quote: char) -> Option<usize> {
    let mut previous = quote;
    for (idx, c) in text.char_indices().skip(1) {
        if c == quote && previous != '\\' {
            return Some(idx);
        }
        previous = c;
    }
    None
}
