//! Execution Orchestrator
//!
//! Turns matched command sequences into rendered turns. Each execution gets
//! an [`ExecutionContent`] in the history and a spawned task running the
//! handler registered for the deepest matched command.
//!
//! # Continuation protocol
//!
//! Handlers report progress through [`TurnContext`]. Every update carries the
//! full result so far and a `to_be_continue` flag; while it is set the surface
//! shows a "thinking" placeholder after the last block. Whenever the flag
//! turns false `CommandExecuted` is published, so input is unblocked while a
//! retry prompt waits for its answer. A turn resumed by "yes" publishes
//! `Executing` again and settles with a second `CommandExecuted`.
//!
//! ```text
//!   ExecuteCommand ──► Orchestrator::execute
//!                          │ push ExecutionContent ─► history
//!                          │ publish Executing
//!                          ▼
//!                      tokio::spawn(handler.handle(turn))
//!                          │ turn.push(..) ─► history + RenderDelegate
//!                          ▼
//!                      to_be_continue false ─► publish CommandExecuted
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::backend::RemoteError;
use crate::bus::{EventBus, Subscription};
use crate::command::{Command, CommandId, CommandTreeError};
use crate::events::{CopilotEvent, EventKind};
use crate::execution::{ExecutionContent, ExecutionHistory, ExecutionResult};
use crate::matcher::CommandMatch;
use crate::messages::{ExecutionId, SessionId, TurnOutput};
use crate::remote::RemoteInvoker;
use crate::retry::{is_retry_answer, retry_prompt_command, RetryBoard, RetryChoice, RetryPrompt};

/// Draws execution contents on a surface
///
/// Called with the full content after every update. Implementations must not
/// block.
pub trait RenderDelegate: Send + Sync {
    /// Draw (or redraw) one execution
    fn render(&self, content: &ExecutionContent);
}

/// Renderer for headless runs
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRenderer;

impl RenderDelegate for NullRenderer {
    fn render(&self, _content: &ExecutionContent) {}
}

/// Behaviour attached to a command id
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command, reporting output through `turn`
    async fn handle(&self, turn: &TurnContext) -> anyhow::Result<()>;
}

/// Handlers keyed by command id
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<CommandId, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for the command `id`, replacing any previous one
    pub fn register<H>(&mut self, id: impl Into<String>, handler: H)
    where
        H: CommandHandler + 'static,
    {
        self.handlers.insert(CommandId::new(id), Arc::new(handler));
    }

    /// Handler of the deepest matched command that has one
    #[must_use]
    pub fn resolve(&self, commands: &[CommandMatch]) -> Option<Arc<dyn CommandHandler>> {
        commands
            .iter()
            .rev()
            .find_map(|matched| self.handlers.get(matched.id()).cloned())
    }

    /// Whether `id` has a handler
    #[must_use]
    pub fn contains(&self, id: &CommandId) -> bool {
        self.handlers.contains_key(id)
    }

    /// Number of registered handlers
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// State shared by the orchestrator and every running turn
struct Shared {
    bus: EventBus,
    history: ExecutionHistory,
    renderer: Arc<dyn RenderDelegate>,
    remote: RemoteInvoker,
    retries: RetryBoard,
    retry_command: Arc<Command>,
}

/// A running execution, as seen by its handler
pub struct TurnContext {
    content: Mutex<ExecutionContent>,
    // Whether `Executing` was published without a matching `CommandExecuted`
    open: AtomicBool,
    shared: Arc<Shared>,
}

impl TurnContext {
    /// Execution id
    #[must_use]
    pub fn id(&self) -> ExecutionId {
        self.content.lock().id
    }

    /// Matched commands that started this execution
    #[must_use]
    pub fn commands(&self) -> Vec<CommandMatch> {
        self.content.lock().commands.clone()
    }

    /// Free-text value captured by the command `id`, if it matched
    #[must_use]
    pub fn value_of(&self, id: &str) -> Option<String> {
        self.content
            .lock()
            .commands
            .iter()
            .find(|matched| matched.id().as_str() == id)
            .and_then(|matched| matched.value.clone())
    }

    /// Extra argument from programmatic dispatch
    #[must_use]
    pub fn argument(&self) -> Option<String> {
        self.content.lock().argument.clone()
    }

    /// Current result
    #[must_use]
    pub fn result(&self) -> ExecutionResult {
        self.content.lock().result.clone()
    }

    /// Append a block
    pub fn push(&self, output: TurnOutput, to_be_continue: bool) {
        self.update(|result| {
            result.content.push(output);
            result.to_be_continue = to_be_continue;
        });
    }

    /// Replace a trailing "working" block, or append
    pub fn show(&self, output: TurnOutput, to_be_continue: bool) {
        self.update(|result| {
            if matches!(result.last(), Some(TurnOutput::Working(_))) {
                result.content.pop();
            }
            result.content.push(output);
            result.to_be_continue = to_be_continue;
        });
    }

    /// Mark more updates as coming without adding a block
    pub fn resume(&self) {
        self.update(|result| result.to_be_continue = true);
    }

    /// Close the turn if the handler left it open
    pub fn finish(&self) {
        if self.content.lock().result.to_be_continue {
            self.update(|result| result.to_be_continue = false);
        }
    }

    fn update(&self, apply: impl FnOnce(&mut ExecutionResult)) {
        let (snapshot, lifecycle) = {
            let mut content = self.content.lock();
            apply(&mut content.result);
            let to_be_continue = content.result.to_be_continue;
            let was_open = self.open.swap(to_be_continue, Ordering::SeqCst);
            let lifecycle = match (was_open, to_be_continue) {
                (true, false) => Some(CopilotEvent::CommandExecuted {
                    execution_id: content.id,
                }),
                (false, true) => Some(CopilotEvent::Executing {
                    execution_id: content.id,
                }),
                _ => None,
            };
            (content.clone(), lifecycle)
        };

        // Evicted or cleared entries still render; the history just forgets them
        if self
            .shared
            .history
            .update_result(snapshot.id, snapshot.result.clone())
            .is_err()
        {
            tracing::trace!(execution_id = %snapshot.id, "Updating execution outside history");
        }
        self.shared.renderer.render(&snapshot);

        if let Some(event) = lifecycle {
            tracing::debug!(execution_id = %snapshot.id, event = ?event.kind(), "Turn lifecycle");
            self.shared.bus.publish(event);
        }
    }

    /// The bus this execution publishes to
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Remote request layer
    #[must_use]
    pub fn remote(&self) -> &RemoteInvoker {
        &self.shared.remote
    }

    /// Execution history
    #[must_use]
    pub fn history(&self) -> &ExecutionHistory {
        &self.shared.history
    }

    /// Ask the session manager for the current open session
    #[must_use]
    pub fn current_session(&self) -> Option<SessionId> {
        let slot = Arc::new(Mutex::new(None));
        let writer = Arc::clone(&slot);
        self.shared
            .bus
            .publish(CopilotEvent::CurrentSession(Arc::new(move |id| {
                *writer.lock() = id;
            })));
        let current = slot.lock().take();
        current
    }

    /// Answer the newest open retry prompt
    pub fn answer_retry(&self, choice: RetryChoice) -> Option<ExecutionId> {
        self.shared.retries.answer(choice)
    }
}

#[async_trait]
impl RetryPrompt for TurnContext {
    async fn confirm_retry(&self, error: &RemoteError) -> RetryChoice {
        let answer = self.shared.retries.open(self.id());
        self.show(
            TurnOutput::RetryPrompt {
                reason: error.to_string(),
            },
            false,
        );
        self.shared
            .bus
            .publish(CopilotEvent::OfferCommand(Arc::clone(&self.shared.retry_command)));

        // A dropped sender means the prompt was abandoned
        let choice = answer.await.unwrap_or(RetryChoice::No);
        if choice == RetryChoice::Yes {
            self.resume();
        }
        choice
    }
}

/// A spawned execution
#[derive(Debug)]
pub struct ExecutionHandle {
    /// Id of the execution content
    pub id: ExecutionId,
    task: JoinHandle<()>,
}

impl ExecutionHandle {
    /// Wait for the handler task to finish
    pub async fn finished(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

/// Runs matched commands against the handler registry
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
    handlers: Arc<HandlerRegistry>,
}

impl Orchestrator {
    /// Create an orchestrator
    pub fn new(
        bus: EventBus,
        history: ExecutionHistory,
        renderer: Arc<dyn RenderDelegate>,
        handlers: HandlerRegistry,
    ) -> Result<Self, CommandTreeError> {
        let shared = Shared {
            remote: RemoteInvoker::new(bus.clone()),
            bus,
            history,
            renderer,
            retries: RetryBoard::new(),
            retry_command: retry_prompt_command()?,
        };
        Ok(Self {
            shared: Arc::new(shared),
            handlers: Arc::new(handlers),
        })
    }

    /// The bus
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Execution history
    #[must_use]
    pub fn history(&self) -> &ExecutionHistory {
        &self.shared.history
    }

    /// Remote request layer shared by every turn
    #[must_use]
    pub fn remote(&self) -> &RemoteInvoker {
        &self.shared.remote
    }

    /// Open retry prompts
    #[must_use]
    pub fn retries(&self) -> &RetryBoard {
        &self.shared.retries
    }

    /// The yes/no command offered while a retry prompt is open
    #[must_use]
    pub fn retry_command(&self) -> &Arc<Command> {
        &self.shared.retry_command
    }

    /// Start one execution
    ///
    /// Must be called from within a tokio runtime.
    pub fn execute(&self, commands: Vec<CommandMatch>, argument: Option<String>) -> ExecutionHandle {
        let answers_retry = commands
            .last()
            .is_some_and(|matched| is_retry_answer(matched.id()));
        if !answers_retry {
            let declined = self.shared.retries.decline_all();
            if declined > 0 {
                tracing::debug!(declined, "Declined abandoned retry prompts");
            }
        }

        let content = ExecutionContent::new(commands, argument);
        let id = content.id;
        if let Some(evicted) = self.shared.history.push(content.clone()) {
            tracing::debug!(execution_id = %evicted.id, "Evicted execution from history");
        }
        tracing::debug!(execution_id = %id, command = %content.echo(), "Executing");

        self.shared.renderer.render(&content);
        self.shared
            .bus
            .publish(CopilotEvent::Executing { execution_id: id });

        let handler = self.handlers.resolve(&content.commands);
        let turn = TurnContext {
            content: Mutex::new(content),
            open: AtomicBool::new(true),
            shared: Arc::clone(&self.shared),
        };

        let task = tokio::spawn(async move {
            match handler {
                Some(handler) => {
                    if let Err(err) = handler.handle(&turn).await {
                        tracing::warn!(execution_id = %id, error = %err, "Command failed");
                        turn.show(TurnOutput::Error(format!("{err:#}")), false);
                    }
                }
                None => {
                    let echo = turn.content.lock().echo();
                    tracing::warn!(execution_id = %id, command = %echo, "No handler registered");
                    turn.push(TurnOutput::Error(format!("Nothing to run for `{echo}`")), false);
                }
            }
            // Publishes CommandExecuted unless the turn already settled
            turn.finish();
        });

        ExecutionHandle { id, task }
    }

    /// Execute every [`CopilotEvent::ExecuteCommand`] published on `bus`
    pub fn attach(&self, bus: &EventBus) -> Subscription {
        let orchestrator = self.clone();
        bus.subscribe(EventKind::ExecuteCommand, move |event| {
            if let CopilotEvent::ExecuteCommand { commands, argument } = event {
                let _ = orchestrator.execute(commands.clone(), argument.clone());
            }
        })
    }
}
