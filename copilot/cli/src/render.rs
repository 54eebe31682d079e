//! Terminal rendering
//!
//! Prints executions as they update. Each execution is drawn once as a
//! prompt line with the echoed command, followed by its blocks; later updates
//! print only the blocks that changed. Drawn state is kept only while an
//! execution is still running, so a turn reopened by a retry is drawn afresh.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use copilot_core::{
    Alert, ExecutionContent, ExecutionId, MatchedCommands, Redirect, RenderDelegate, TurnOutput,
};

const PROMPT: &str = "❯";
const INDENT: &str = "  ";

/// Formats one block as terminal lines
pub fn format_output(output: &TurnOutput, width: usize) -> Vec<String> {
    let wrap = |text: &str| -> Vec<String> {
        let options = textwrap::Options::new(width)
            .initial_indent(INDENT)
            .subsequent_indent(INDENT);
        textwrap::wrap(text, options)
            .into_iter()
            .map(|line| line.into_owned())
            .collect()
    };

    match output {
        TurnOutput::Text(text) => wrap(text),
        TurnOutput::Options { prompt, options } => {
            let mut lines = wrap(prompt);
            lines.extend(
                options
                    .iter()
                    .map(|option| format!("{INDENT}  [{}] {}", option.token, option.label)),
            );
            lines.push(format!("{INDENT}Reply with /pick <token>."));
            lines
        }
        TurnOutput::Working(text) if text.is_empty() => vec![format!("{INDENT}…")],
        TurnOutput::Working(text) => wrap(&format!("… {text}")),
        TurnOutput::RetryPrompt { reason } => {
            let mut lines = wrap(&format!("Request failed: {reason}"));
            lines.push(format!("{INDENT}Retry? (yes / no)"));
            lines
        }
        TurnOutput::Notice(text) => wrap(text),
        TurnOutput::Help(entries) => {
            let column = entries
                .iter()
                .map(|entry| entry.usage.chars().count())
                .max()
                .unwrap_or(0);
            entries
                .iter()
                .map(|entry| {
                    format!(
                        "{INDENT}{:<column$}  {}",
                        entry.usage,
                        entry.description,
                        column = column
                    )
                })
                .collect()
        }
        TurnOutput::Error(message) => wrap(&format!("error: {message}")),
    }
}

/// Format an alert for stderr
pub fn format_alert(alert: &Alert) -> String {
    let mut line = format!("! {}: {}", alert.kind.title(), alert.message);
    if alert.redirect == Some(Redirect::Login) {
        line.push_str(" (sign in again to continue)");
    }
    line
}

/// Format the hint shown when a line is not a complete command
pub fn format_incomplete(matched: &MatchedCommands) -> String {
    let expected: Vec<String> = matched
        .last()
        .map(|last| {
            last.command
                .trails()
                .iter()
                .map(|trail| {
                    trail
                        .literal_text()
                        .map_or_else(|| format!("<{}>", trail.label()), str::to_string)
                })
                .collect()
        })
        .unwrap_or_default();

    match (matched.left.is_empty(), expected.is_empty()) {
        (false, _) => format!("? could not understand `{}`", matched.left),
        (true, false) => format!("? expected one of: {}", expected.join(", ")),
        (true, true) => "? incomplete command".to_string(),
    }
}

#[derive(Default)]
struct Drawn {
    blocks: Vec<TurnOutput>,
    thinking: bool,
}

/// Line-oriented renderer writing to stdout
pub struct TerminalRenderer {
    width: usize,
    drawn: Mutex<HashMap<ExecutionId, Drawn>>,
}

impl TerminalRenderer {
    /// Create a renderer wrapping at `width` columns
    pub fn new(width: usize) -> Self {
        Self {
            width,
            drawn: Mutex::new(HashMap::new()),
        }
    }

    /// Lines to print for an update of `content`
    fn lines_for(&self, content: &ExecutionContent) -> Vec<String> {
        let mut drawn = self.drawn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut lines = Vec::new();

        let state = drawn.entry(content.id).or_insert_with(|| {
            lines.push(format!("{PROMPT} {}", content.echo()));
            Drawn::default()
        });

        for (idx, block) in content.result.content.iter().enumerate() {
            if state.blocks.get(idx) != Some(block) {
                lines.extend(format_output(block, self.width));
            }
        }

        let thinking = content.result.to_be_continue
            && !matches!(content.result.last(), Some(TurnOutput::Working(_)));
        if thinking && !state.thinking {
            lines.push(format!("{INDENT}…"));
        }

        state.blocks.clone_from(&content.result.content);
        state.thinking = thinking;
        if !content.result.to_be_continue {
            drawn.remove(&content.id);
        }
        lines
    }


    /// Forget drawn state and print a separator after `/clear`
    pub fn clear(&self) {
        self.drawn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        println!("{}", "─".repeat(self.width.min(40)));
    }
}

impl RenderDelegate for TerminalRenderer {
    fn render(&self, content: &ExecutionContent) {
        let lines = self.lines_for(content);
        if lines.is_empty() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        for line in lines {
            let _ = writeln!(stdout, "{line}");
        }
        let _ = stdout.flush();
    }
}
