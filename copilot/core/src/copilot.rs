//! Copilot - The Command Line Core
//!
//! Wires the bus, the session stack, the execution history, the command line
//! and the orchestrator into one object a surface can drive with lines of
//! text.
//!
//! # Design Philosophy
//!
//! The core is UI-agnostic. A surface hands it input through [`Copilot::submit`]
//! (enter) or [`Copilot::run`] (programmatic dispatch) and draws whatever the
//! [`RenderDelegate`] receives. Alerts and in-flight counts arrive on the bus.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::CopilotService;
use crate::bus::{EventBus, Subscription};
use crate::command::CommandTreeError;
use crate::command_line::{CommandLine, Submission};
use crate::config::CopilotConfig;
use crate::events::{CopilotEvent, EventKind};
use crate::execution::ExecutionHistory;
use crate::flows::{copilot_commands, register_copilot_handlers};
use crate::matcher::{CommandMatch, MatchedCommands};
use crate::orchestrator::{ExecutionHandle, HandlerRegistry, Orchestrator, RenderDelegate};
use crate::session::SessionManager;

/// What happened to a line of input
#[derive(Debug)]
pub enum Dispatch {
    /// An execution was started
    Started(ExecutionHandle),
    /// The line is not a complete command; keep it in the buffer
    Incomplete(MatchedCommands),
}

/// The assembled command line
pub struct Copilot {
    bus: EventBus,
    sessions: SessionManager,
    history: ExecutionHistory,
    command_line: Arc<Mutex<CommandLine>>,
    orchestrator: Orchestrator,
    subscriptions: Vec<Subscription>,
}

impl Copilot {
    /// Assemble a command line talking to `service`
    pub fn new(
        config: &CopilotConfig,
        service: Arc<dyn CopilotService>,
        renderer: Arc<dyn RenderDelegate>,
    ) -> Result<Self, CommandTreeError> {
        let bus = EventBus::new();
        let tree = copilot_commands(&config.matching.prefix)?;

        let mut handlers = HandlerRegistry::new();
        register_copilot_handlers(&mut handlers, service, &tree, config.poll_interval);

        let sessions = SessionManager::new();
        let history = ExecutionHistory::new(config.history_capacity);
        let command_line = Arc::new(Mutex::new(CommandLine::new(
            tree,
            config.matching.clone(),
        )));
        let orchestrator = Orchestrator::new(bus.clone(), history.clone(), renderer, handlers)?;

        let mut subscriptions = sessions.attach(&bus);
        subscriptions.push(history.attach(&bus));
        subscriptions.push(orchestrator.attach(&bus));

        let offered_to = Arc::clone(&command_line);
        subscriptions.push(bus.subscribe(EventKind::OfferCommand, move |event| {
            if let CopilotEvent::OfferCommand(command) = event {
                offered_to.lock().offer(Arc::clone(command));
            }
        }));

        tracing::debug!(
            history_capacity = config.history_capacity,
            prefix = %config.matching.prefix,
            "Copilot assembled"
        );

        Ok(Self {
            bus,
            sessions,
            history,
            command_line,
            orchestrator,
            subscriptions,
        })
    }

    /// Submit a line typed by the user (enter)
    pub fn submit(&self, text: &str) -> Dispatch {
        let submission = self.command_line.lock().submit(text);
        self.dispatch(submission, None)
    }

    /// Dispatch a line programmatically, with an optional extra argument
    pub fn run(&self, text: &str, argument: Option<String>) -> Dispatch {
        let submission = self.command_line.lock().run(text);
        self.dispatch(submission, argument)
    }

    /// Match `text` without executing anything
    #[must_use]
    pub fn preview(&self, text: &str) -> MatchedCommands {
        let line = self.command_line.lock();
        let greedy = line.settings().enter_greedy;
        line.preview(text, greedy)
    }

    /// Commands picked by earlier inputs
    #[must_use]
    pub fn picked(&self) -> Vec<CommandMatch> {
        self.command_line.lock().picked().to_vec()
    }

    fn dispatch(&self, submission: Submission, argument: Option<String>) -> Dispatch {
        match submission {
            Submission::Execute { commands } => {
                self.command_line.lock().commit(&commands);
                Dispatch::Started(self.orchestrator.execute(commands, argument))
            }
            Submission::Incomplete { matched } => {
                tracing::debug!(left = %matched.left, "Input incomplete");
                Dispatch::Incomplete(matched)
            }
        }
    }

    /// The bus; subscribe here for alerts and in-flight counts
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Session stack
    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Execution history
    #[must_use]
    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    /// Execution orchestrator
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Detach every bus listener installed by [`Copilot::new`]
    pub fn shutdown(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        tracing::debug!("Copilot shut down");
    }
}
