//! Integration Tests for the Copilot Command Line
//!
//! These tests drive [`Copilot`] with lines of text, the way a surface does,
//! against a mock copilot service.
//!
//! # Test Coverage
//!
//! 1. **Session flow**: `/new` then `/pick` reuse the same session id
//! 2. **Free text**: unquoted questions in non-greedy mode
//! 3. **Retry protocol**: `yes` replays the same request, `no` is noted
//! 4. **Alerts**: 401/403 raise login alerts and are never retried
//! 5. **Continuation**: polling while the service is working
//! 6. **History**: pinning survives `/clear`
//!
//! # Mock Service
//!
//! The mock records every call, hands out `s-1`, `s-2`, ... as session ids,
//! can fail the next N calls with injected errors, and can answer "still
//! working" a configurable number of times.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use copilot_core::{
    Alert, AlertKind, CopilotConfig, CopilotEvent, CopilotService, Copilot, Dispatch, EventKind,
    ExecutionContent, ExecutionHandle, ExecutionId, ExecutionResult, Redirect, RemoteError, RenderDelegate,
    Reply, ReplyState, SessionId, TurnOutput,
};

// ============================================================================
// Mock Copilot Service
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
enum Call {
    Start,
    Ask(Option<SessionId>, String),
    Pick(SessionId, String),
    Poll(SessionId),
}

#[derive(Default)]
struct MockCopilotService {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<VecDeque<RemoteError>>,
    working_replies: AtomicUsize,
    next_session: AtomicUsize,
}

impl MockCopilotService {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next call with `error`
    fn fail_next(&self, error: RemoteError) {
        self.failures.lock().push_back(error);
    }

    /// Answer "still working" this many times before the real answer
    fn work_for(&self, replies: usize) {
        self.working_replies.store(replies, Ordering::SeqCst);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, call: Call) -> Result<(), RemoteError> {
        self.calls.lock().push(call);
        match self.failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fresh_session(&self) -> SessionId {
        let n = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        SessionId::new(format!("s-{n}"))
    }

    fn answer(&self, session: SessionId, text: String) -> Reply {
        let remaining = self.working_replies.load(Ordering::SeqCst);
        if remaining > 0 {
            self.working_replies.store(remaining - 1, Ordering::SeqCst);
            Reply::working(session, "Thinking...")
        } else {
            Reply::answered(session, text)
        }
    }
}

#[async_trait]
impl CopilotService for MockCopilotService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start_session(&self) -> Result<Reply, RemoteError> {
        self.record(Call::Start)?;
        Ok(Reply::answered(
            self.fresh_session(),
            "Hello! What can I do for you?",
        ))
    }

    async fn ask(&self, session: Option<&SessionId>, question: &str) -> Result<Reply, RemoteError> {
        self.record(Call::Ask(session.cloned(), question.to_string()))?;
        let session = session.cloned().unwrap_or_else(|| self.fresh_session());
        if question == "bye" {
            return Ok(Reply::answered(session, "Goodbye.").with_state(ReplyState::Closed));
        }
        Ok(self.answer(session, format!("You asked: {question}")))
    }

    async fn pick(&self, session: &SessionId, token: &str) -> Result<Reply, RemoteError> {
        self.record(Call::Pick(session.clone(), token.to_string()))?;
        Ok(Reply::answered(session.clone(), format!("Picked {token}")))
    }

    async fn poll(&self, session: &SessionId) -> Result<Reply, RemoteError> {
        self.record(Call::Poll(session.clone()))?;
        Ok(self.answer(session.clone(), "Here is your answer".to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct RecordingRenderer {
    frames: Mutex<Vec<ExecutionContent>>,
}

impl RecordingRenderer {
    fn results_of(&self, handle_id: copilot_core::ExecutionId) -> Vec<ExecutionResult> {
        self.frames
            .lock()
            .iter()
            .filter(|frame| frame.id == handle_id)
            .map(|frame| frame.result.clone())
            .collect()
    }
}

impl RenderDelegate for RecordingRenderer {
    fn render(&self, content: &ExecutionContent) {
        self.frames.lock().push(content.clone());
    }
}

struct Harness {
    copilot: Copilot,
    service: Arc<MockCopilotService>,
    renderer: Arc<RecordingRenderer>,
}

fn harness() -> Harness {
    let mut config = CopilotConfig::default();
    config.poll_interval = Duration::from_millis(1);

    let service = MockCopilotService::new();
    let renderer = Arc::new(RecordingRenderer::default());
    let copilot = Copilot::new(
        &config,
        Arc::clone(&service) as Arc<dyn CopilotService>,
        Arc::clone(&renderer) as Arc<dyn RenderDelegate>,
    )
    .unwrap();

    Harness {
        copilot,
        service,
        renderer,
    }
}

fn started(dispatch: Dispatch) -> ExecutionHandle {
    match dispatch {
        Dispatch::Started(handle) => handle,
        Dispatch::Incomplete(matched) => panic!("input incomplete, left: {:?}", matched.left),
    }
}

impl Harness {
    /// Submit a line and wait for its execution to finish
    async fn submit(&self, text: &str) -> ExecutionResult {
        let handle = started(self.copilot.submit(text));
        let id = handle.id;
        handle.finished().await.unwrap();
        self.renderer
            .results_of(id)
            .pop()
            .expect("execution rendered at least once")
    }

    /// Wait until a retry prompt is open
    async fn wait_for_retry_prompt(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.copilot.orchestrator().retries().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("retry prompt never opened");
    }
}

fn status(status: u16) -> RemoteError {
    RemoteError::Status {
        status,
        message: "from mock".to_string(),
    }
}

fn alerts(copilot: &Copilot) -> Arc<Mutex<Vec<Alert>>> {
    let alerts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&alerts);
    let _ = copilot.bus().subscribe(EventKind::Alert, move |event| {
        if let CopilotEvent::Alert(alert) = event {
            sink.lock().push(alert.clone());
        }
    });
    alerts
}

// ============================================================================
// Session flow
// ============================================================================

#[tokio::test]
async fn test_new_then_pick_uses_same_session() {
    let h = harness();

    let greeting = h.submit("/new").await;
    assert_eq!(
        greeting.content,
        vec![TurnOutput::Text("Hello! What can I do for you?".to_string())]
    );
    assert!(!greeting.to_be_continue);
    assert_eq!(
        h.copilot.sessions().current_session(),
        Some(SessionId::new("s-1"))
    );

    let picked = h.submit("/pick t1").await;
    assert_eq!(picked.content, vec![TurnOutput::Text("Picked t1".to_string())]);
    assert_eq!(
        h.service.calls(),
        vec![Call::Start, Call::Pick(SessionId::new("s-1"), "t1".to_string())]
    );
    assert_eq!(h.copilot.sessions().snapshot().len(), 1);
}

#[tokio::test]
async fn test_second_new_closes_first_session() {
    let h = harness();
    h.submit("/new").await;
    h.submit("/new").await;

    let sessions = h.copilot.sessions().snapshot();
    assert_eq!(sessions.len(), 2);
    assert!(!sessions[0].is_open());
    assert_eq!(
        h.copilot.sessions().current_session(),
        Some(SessionId::new("s-2"))
    );
}

#[tokio::test]
async fn test_pick_without_session_is_an_error() {
    let h = harness();
    let result = h.submit("/pick t1").await;

    assert!(matches!(result.content[..], [TurnOutput::Error(_)]));
    assert!(h.service.calls().is_empty());
}

#[tokio::test]
async fn test_closed_conversation_closes_session() {
    let h = harness();
    h.submit("/new").await;
    let result = h.submit("bye").await;

    assert_eq!(result.content, vec![TurnOutput::Text("Goodbye.".to_string())]);
    assert_eq!(h.copilot.sessions().current_session(), None);
}

// ============================================================================
// Free text
// ============================================================================

#[tokio::test]
async fn test_unquoted_free_text_without_session() {
    let h = harness();
    let result = h.submit("hello world").await;

    assert_eq!(
        result.content,
        vec![TurnOutput::Text("You asked: hello world".to_string())]
    );
    assert_eq!(
        h.service.calls(),
        vec![Call::Ask(None, "hello world".to_string())]
    );
    // The server-assigned id is adopted as the current session
    assert_eq!(
        h.copilot.sessions().current_session(),
        Some(SessionId::new("s-1"))
    );
}

#[tokio::test]
async fn test_free_text_continues_current_session() {
    let h = harness();
    h.submit("/new").await;
    h.submit("what is due today?").await;

    assert_eq!(
        h.service.calls()[1],
        Call::Ask(Some(SessionId::new("s-1")), "what is due today?".to_string())
    );
}

#[tokio::test]
async fn test_incomplete_input_does_not_execute() {
    let h = harness();
    match h.copilot.submit("/pick") {
        Dispatch::Incomplete(matched) => assert_eq!(matched.commands.len(), 1),
        Dispatch::Started(_) => panic!("`/pick` alone must not execute"),
    }
    assert!(h.copilot.history().is_empty());
}

#[tokio::test]
async fn test_run_matches_greedily() {
    let h = harness();
    h.submit("/new").await;

    let handle = started(h.copilot.run("/pickt9", None));
    handle.finished().await.unwrap();

    assert_eq!(
        h.service.calls()[1],
        Call::Pick(SessionId::new("s-1"), "t9".to_string())
    );
}

// ============================================================================
// Retry protocol
// ============================================================================

#[tokio::test]
async fn test_retry_yes_replays_same_request() {
    let h = harness();
    let alerts = alerts(&h.copilot);
    h.service.fail_next(status(503));

    let ask = started(h.copilot.submit("hello world"));
    let ask_id = ask.id;
    h.wait_for_retry_prompt().await;

    let answer = h.submit("yes").await;
    assert_eq!(answer.content, vec![TurnOutput::Notice("Retrying.".to_string())]);
    ask.finished().await.unwrap();

    assert_eq!(
        h.service.calls(),
        vec![
            Call::Ask(None, "hello world".to_string()),
            Call::Ask(None, "hello world".to_string()),
        ]
    );

    let result = h.renderer.results_of(ask_id).pop().unwrap();
    assert!(matches!(result.content[0], TurnOutput::RetryPrompt { .. }));
    assert_eq!(
        result.content.last(),
        Some(&TurnOutput::Text("You asked: hello world".to_string()))
    );
    assert!(!result.to_be_continue);

    // The failure was handled inline, so no generic alert
    assert!(alerts.lock().is_empty());
}

fn lifecycle(copilot: &Copilot, kind: EventKind) -> Arc<Mutex<Vec<ExecutionId>>> {
    let ids = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ids);
    let _ = copilot.bus().subscribe(kind, move |event| match event {
        CopilotEvent::Executing { execution_id } | CopilotEvent::CommandExecuted { execution_id } => {
            sink.lock().push(*execution_id)
        }
        _ => {}
    });
    ids
}

#[tokio::test]
async fn test_retry_prompt_settles_turn_until_answered() {
    let h = harness();
    let executing = lifecycle(&h.copilot, EventKind::Executing);
    let executed = lifecycle(&h.copilot, EventKind::CommandExecuted);
    h.service.fail_next(status(503));

    let ask = started(h.copilot.submit("hello world"));
    let ask_id = ask.id;
    h.wait_for_retry_prompt().await;

    // Input is unblocked while the prompt waits
    assert_eq!(*executed.lock(), vec![ask_id]);
    let prompt = h.renderer.results_of(ask_id).pop().unwrap();
    assert!(!prompt.to_be_continue);

    let answer = started(h.copilot.submit("yes"));
    let answer_id = answer.id;
    answer.finished().await.unwrap();
    ask.finished().await.unwrap();

    let count = |ids: &[ExecutionId]| ids.iter().filter(|id| **id == ask_id).count();
    assert_eq!(count(&executing.lock()), 2);
    assert_eq!(count(&executed.lock()), 2);
    assert!(executed.lock().contains(&answer_id));
}

#[tokio::test]
async fn test_retry_no_is_noted() {
    let h = harness();
    h.service.fail_next(status(500));

    let new = started(h.copilot.submit("/new"));
    let new_id = new.id;
    h.wait_for_retry_prompt().await;

    let answer = h.submit("no").await;
    assert_eq!(answer.content, vec![TurnOutput::Notice("Noted.".to_string())]);
    new.finished().await.unwrap();

    assert_eq!(h.service.calls(), vec![Call::Start]);
    assert_eq!(h.copilot.sessions().current_session(), None);

    let result = h.renderer.results_of(new_id).pop().unwrap();
    assert!(matches!(result.content[..], [TurnOutput::RetryPrompt { .. }]));
    assert!(!result.to_be_continue);
}

#[tokio::test]
async fn test_moving_on_declines_open_retry() {
    let h = harness();
    h.service.fail_next(status(500));

    let new = started(h.copilot.submit("/new"));
    h.wait_for_retry_prompt().await;

    let help = h.submit("/help").await;
    assert!(matches!(help.content[..], [TurnOutput::Help(_)]));

    new.finished().await.unwrap();
    assert!(h.copilot.orchestrator().retries().is_empty());
    assert_eq!(h.service.calls(), vec![Call::Start]);
}

// ============================================================================
// Alerts
// ============================================================================

#[tokio::test]
async fn test_unauthorized_alerts_and_is_not_retried() {
    let h = harness();
    let alerts = alerts(&h.copilot);
    h.service.fail_next(status(401));

    let result = h.submit("/new").await;

    assert!(matches!(result.content[..], [TurnOutput::Error(_)]));
    assert!(h.copilot.orchestrator().retries().is_empty());
    let alerts = alerts.lock();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Unauthorized);
    assert_eq!(alerts[0].redirect, Some(Redirect::Login));
}

#[tokio::test]
async fn test_forbidden_alerts_with_login_redirect() {
    let h = harness();
    let alerts = alerts(&h.copilot);
    h.submit("/new").await;
    h.service.fail_next(status(403));

    h.submit("/pick t1").await;

    let alerts = alerts.lock();
    assert_eq!(alerts[0].kind, AlertKind::AccessDenied);
    assert_eq!(alerts[0].redirect, Some(Redirect::Login));
}

#[tokio::test]
async fn test_in_flight_count_returns_to_zero() {
    let h = harness();
    let counts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&counts);
    let _ = h
        .copilot
        .bus()
        .subscribe(EventKind::RequestsInFlight, move |event| {
            if let CopilotEvent::RequestsInFlight(n) = event {
                sink.lock().push(*n);
            }
        });

    h.submit("/new").await;

    assert_eq!(*counts.lock(), vec![1, 0]);
    assert_eq!(h.copilot.orchestrator().remote().in_flight(), 0);
}

// ============================================================================
// Continuation
// ============================================================================

#[tokio::test]
async fn test_working_reply_is_polled_until_answered() {
    let h = harness();
    let executed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&executed);
    let _ = h
        .copilot
        .bus()
        .subscribe(EventKind::CommandExecuted, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    h.submit("/new").await;
    h.service.work_for(2);

    let handle = started(h.copilot.submit("summarize my week"));
    let id = handle.id;
    handle.finished().await.unwrap();

    let frames = h.renderer.results_of(id);
    assert!(frames
        .iter()
        .any(|frame| frame.to_be_continue
            && frame.content == vec![TurnOutput::Working("Thinking...".to_string())]));

    let last = frames.last().unwrap();
    assert_eq!(
        last.content,
        vec![TurnOutput::Text("Here is your answer".to_string())]
    );
    assert!(!last.to_be_continue);

    let polls = h
        .service
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Poll(_)))
        .count();
    assert_eq!(polls, 2);
    assert_eq!(executed.load(Ordering::SeqCst), 2);
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn test_clear_keeps_pinned_executions() {
    let h = harness();
    h.submit("/help").await;
    h.submit("/help").await;

    let pinned = h.submit("/pin 1").await;
    assert_eq!(pinned.content, vec![TurnOutput::Notice("Pinned #1.".to_string())]);

    h.submit("/clear").await;

    let history = h.copilot.history().snapshot();
    assert_eq!(history.len(), 1);
    assert!(history[0].locked);
    assert_eq!(history[0].echo(), "/help");
}

#[tokio::test]
async fn test_pin_out_of_range_is_an_error() {
    let h = harness();
    let result = h.submit("/pin 7").await;
    assert!(matches!(result.content[..], [TurnOutput::Error(_)]));
}
