//! Copilot Commands
//!
//! The built-in command grammar and the handlers behind it.
//!
//! | Input           | Effect                                          |
//! |-----------------|-------------------------------------------------|
//! | `/new`          | open a conversation and show its greeting       |
//! | free text       | ask, within the current conversation if any     |
//! | `/pick <token>` | pick an offered option                          |
//! | `/clear`        | drop every unpinned execution                   |
//! | `/help`         | list the root commands                          |
//! | `/pin <n>`      | pin the n-th execution                          |
//! | `/unpin <n>`    | unpin the n-th execution                        |
//! | `yes` / `no`    | answer an open retry prompt                     |
//!
//! Flows that talk to the copilot service run their request through the
//! retry protocol, so a transient failure offers `yes` / `no` in place.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::time::MissedTickBehavior;

use crate::backend::{CopilotService, RemoteError, Reply, ReplyState};
use crate::command::{Command, CommandTree, CommandTreeError};
use crate::events::CopilotEvent;
use crate::messages::{HelpEntry, SessionId, TurnOutput};
use crate::orchestrator::{CommandHandler, HandlerRegistry, TurnContext};
use crate::remote::InvokeOptions;
use crate::retry::{retry_on_failure, RetryChoice, RetryError, RETRY_NO, RETRY_YES};

/// Shortest delay between polls of a working conversation
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Command ids of the built-in grammar
pub mod ids {
    /// `/new`
    pub const NEW: &str = "new";
    /// Free-text question
    pub const ASK: &str = "ask";
    /// `/pick`
    pub const PICK: &str = "pick";
    /// Token after `/pick`
    pub const PICK_TOKEN: &str = "pick.token";
    /// `/clear`
    pub const CLEAR: &str = "clear";
    /// `/help`
    pub const HELP: &str = "help";
    /// `/pin`
    pub const PIN: &str = "pin";
    /// Position after `/pin`
    pub const PIN_POSITION: &str = "pin.position";
    /// `/unpin`
    pub const UNPIN: &str = "unpin";
    /// Position after `/unpin`
    pub const UNPIN_POSITION: &str = "unpin.position";
}

/// Build the root commands, with `prefix` in front of every root literal
pub fn copilot_commands(prefix: &str) -> Result<CommandTree, CommandTreeError> {
    let root = |id: &str, name: &str| Command::literal(id, format!("{prefix}{name}"));

    let new = root(ids::NEW, "new")
        .with_label("Start a new conversation")
        .build()?;
    let pick = root(ids::PICK, "pick")
        .with_label("Pick an offered option")
        .with_trails(vec![Command::free_text(ids::PICK_TOKEN, "option").build()?])
        .build()?;
    let clear = root(ids::CLEAR, "clear")
        .with_label("Clear unpinned output")
        .build()?;
    let help = root(ids::HELP, "help")
        .with_label("List commands")
        .build()?;
    let pin = root(ids::PIN, "pin")
        .with_label("Pin an execution so it is never evicted")
        .with_trails(vec![Command::free_text(ids::PIN_POSITION, "n").build()?])
        .build()?;
    let unpin = root(ids::UNPIN, "unpin")
        .with_label("Unpin an execution")
        .with_trails(vec![Command::free_text(ids::UNPIN_POSITION, "n").build()?])
        .build()?;
    let ask = Command::free_text(ids::ASK, "question").build()?;

    CommandTree::new(vec![new, pick, clear, help, pin, unpin, ask])
}

/// One line per root command, for `/help`
#[must_use]
pub fn help_entries(tree: &CommandTree) -> Vec<HelpEntry> {
    tree.roots()
        .iter()
        .map(|command| {
            let mut usage = command
                .literal_text()
                .map_or_else(|| format!("<{}>", command.label()), str::to_string);
            if let Some(trail) = command.trails().iter().find(|trail| trail.is_free_text()) {
                usage = format!("{usage} <{}>", trail.label());
            }
            HelpEntry {
                usage,
                description: describe(command),
            }
        })
        .collect()
}

fn describe(command: &Command) -> String {
    // Free-text roots carry their placeholder in `label`
    match command.id().as_str() {
        ids::ASK => "Ask the copilot".to_string(),
        _ => command.label().to_string(),
    }
}

/// Register every built-in handler
pub fn register_copilot_handlers(
    registry: &mut HandlerRegistry,
    service: Arc<dyn CopilotService>,
    tree: &CommandTree,
    poll_interval: Duration,
) {
    let conversation = Conversation {
        service,
        poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
    };

    registry.register(ids::NEW, NewSessionHandler(conversation.clone()));
    registry.register(ids::ASK, AskHandler(conversation.clone()));
    registry.register(ids::PICK_TOKEN, PickHandler(conversation));
    registry.register(ids::CLEAR, ClearHandler);
    registry.register(ids::HELP, HelpHandler::new(help_entries(tree)));
    registry.register(ids::PIN_POSITION, PinHandler { locked: true });
    registry.register(ids::UNPIN_POSITION, PinHandler { locked: false });
    registry.register(RETRY_YES, RetryAnswerHandler(RetryChoice::Yes));
    registry.register(RETRY_NO, RetryAnswerHandler(RetryChoice::No));
}

// ============================================================================
// Conversation flows
// ============================================================================

/// Service access shared by the conversation handlers
#[derive(Clone)]
struct Conversation {
    service: Arc<dyn CopilotService>,
    poll_interval: Duration,
}

impl Conversation {
    /// Run `request` through the remote layer and the retry protocol
    ///
    /// Returns `None` when the turn has already been closed (declined or fatal).
    async fn request<F, Fut>(&self, turn: &TurnContext, mut request: F) -> Option<Reply>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<Reply, RemoteError>> + Send,
    {
        let remote = turn.remote();
        let result = retry_on_failure(turn, || {
            remote.invoke(request(), InvokeOptions::handled_inline())
        })
        .await;

        match result {
            Ok(reply) => Some(reply),
            // The retry prompt stays as the last block; "no" answers with "Noted."
            Err(RetryError::Declined(_)) => None,
            Err(RetryError::Fatal(err)) => {
                turn.show(TurnOutput::Error(err.to_string()), false);
                None
            }
        }
    }

    /// Render a reply, polling while the service is still working
    async fn render(&self, turn: &TurnContext, mut reply: Reply) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            match reply.state {
                ReplyState::Working => {
                    turn.show(TurnOutput::Working(reply.text.clone()), true);
                    interval.tick().await;

                    let session = reply.session_id.clone();
                    let service = Arc::clone(&self.service);
                    let Some(next) = self
                        .request(turn, || {
                            let service = Arc::clone(&service);
                            let session = session.clone();
                            async move { service.poll(&session).await }
                        })
                        .await
                    else {
                        return;
                    };
                    turn.bus()
                        .publish(CopilotEvent::ReplaceSession(next.session_id.clone()));
                    reply = next;
                }
                ReplyState::Answered => {
                    turn.show(answer_output(reply), false);
                    return;
                }
                ReplyState::Closed => {
                    tracing::debug!(session_id = %reply.session_id, "Service closed the conversation");
                    turn.bus().publish(CopilotEvent::CloseSession);
                    turn.show(answer_output(reply), false);
                    return;
                }
            }
        }
    }
}

fn answer_output(reply: Reply) -> TurnOutput {
    if reply.options.is_empty() {
        TurnOutput::Text(reply.text)
    } else {
        TurnOutput::Options {
            prompt: reply.text,
            options: reply.options,
        }
    }
}

/// `/new`: open a conversation and show its greeting
struct NewSessionHandler(Conversation);

#[async_trait]
impl CommandHandler for NewSessionHandler {
    async fn handle(&self, turn: &TurnContext) -> anyhow::Result<()> {
        let service = Arc::clone(&self.0.service);
        let reply = self
            .0
            .request(turn, || {
                let service = Arc::clone(&service);
                async move { service.start_session().await }
            })
            .await;

        if let Some(reply) = reply {
            tracing::info!(session_id = %reply.session_id, "Started copilot session");
            turn.bus()
                .publish(CopilotEvent::NewSession(reply.session_id.clone()));
            self.0.render(turn, reply).await;
        }
        Ok(())
    }
}

/// Free text: ask within the current conversation, or without one
struct AskHandler(Conversation);

#[async_trait]
impl CommandHandler for AskHandler {
    async fn handle(&self, turn: &TurnContext) -> anyhow::Result<()> {
        let question = turn
            .value_of(ids::ASK)
            .or_else(|| turn.argument())
            .context("no question to ask")?;

        let session = turn.current_session();
        let service = Arc::clone(&self.0.service);
        let reply = self
            .0
            .request(turn, || {
                let service = Arc::clone(&service);
                let session = session.clone();
                let question = question.clone();
                async move { service.ask(session.as_ref(), &question).await }
            })
            .await;

        if let Some(reply) = reply {
            turn.bus()
                .publish(CopilotEvent::ReplaceSession(reply.session_id.clone()));
            self.0.render(turn, reply).await;
        }
        Ok(())
    }
}

/// `/pick <token>`: pick an option in the current conversation
struct PickHandler(Conversation);

#[async_trait]
impl CommandHandler for PickHandler {
    async fn handle(&self, turn: &TurnContext) -> anyhow::Result<()> {
        let token = turn
            .value_of(ids::PICK_TOKEN)
            .context("no option to pick")?;

        let Some(session) = turn.current_session() else {
            turn.show(
                TurnOutput::Error("No open conversation. Start one with /new.".to_string()),
                false,
            );
            return Ok(());
        };

        let service = Arc::clone(&self.0.service);
        let reply = self
            .0
            .request(turn, || {
                let service = Arc::clone(&service);
                let session: SessionId = session.clone();
                let token = token.clone();
                async move { service.pick(&session, &token).await }
            })
            .await;

        if let Some(reply) = reply {
            turn.bus()
                .publish(CopilotEvent::ReplaceSession(reply.session_id.clone()));
            self.0.render(turn, reply).await;
        }
        Ok(())
    }
}

// ============================================================================
// Local commands
// ============================================================================

/// `/clear`
struct ClearHandler;

#[async_trait]
impl CommandHandler for ClearHandler {
    async fn handle(&self, turn: &TurnContext) -> anyhow::Result<()> {
        turn.bus().publish(CopilotEvent::ClearScreen);
        Ok(())
    }
}

/// `/help`
struct HelpHandler {
    entries: Vec<HelpEntry>,
}

impl HelpHandler {
    fn new(entries: Vec<HelpEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl CommandHandler for HelpHandler {
    async fn handle(&self, turn: &TurnContext) -> anyhow::Result<()> {
        turn.push(TurnOutput::Help(self.entries.clone()), false);
        Ok(())
    }
}

/// `/pin <n>` and `/unpin <n>`; positions count from 1, oldest first
struct PinHandler {
    locked: bool,
}

#[async_trait]
impl CommandHandler for PinHandler {
    async fn handle(&self, turn: &TurnContext) -> anyhow::Result<()> {
        let id = if self.locked {
            ids::PIN_POSITION
        } else {
            ids::UNPIN_POSITION
        };
        let raw = turn.value_of(id).context("no position given")?;
        let position: usize = raw
            .trim()
            .parse()
            .with_context(|| format!("`{raw}` is not a position"))?;

        let target = turn.history().id_at(position)?;
        turn.history().set_locked(target, self.locked)?;

        let verb = if self.locked { "Pinned" } else { "Unpinned" };
        turn.push(TurnOutput::Notice(format!("{verb} #{position}.")), false);
        Ok(())
    }
}

/// `yes` / `no` after a retry prompt
struct RetryAnswerHandler(RetryChoice);

#[async_trait]
impl CommandHandler for RetryAnswerHandler {
    async fn handle(&self, turn: &TurnContext) -> anyhow::Result<()> {
        let answered = turn.answer_retry(self.0);
        let notice = match (self.0, answered) {
            (_, None) => "Nothing to retry.",
            (RetryChoice::Yes, Some(_)) => "Retrying.",
            (RetryChoice::No, Some(_)) => "Noted.",
        };
        turn.push(TurnOutput::Notice(notice.to_string()), false);
        Ok(())
    }
}
