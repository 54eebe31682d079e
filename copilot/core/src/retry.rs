//! Retry Protocol
//!
//! Session-initiating flows wrap their remote call in [`retry_on_failure`].
//! A transient failure asks the user whether to try again; "yes" replays the
//! same operation with the same arguments, "no" gives up. Auth failures are
//! returned at once (the remote layer has already raised their alert).

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::backend::RemoteError;
use crate::command::{Command, CommandId, CommandTreeError};
use crate::messages::ExecutionId;

/// Id of the offered retry prompt command
pub const RETRY_COMMAND: &str = "retry";
/// Id of the "yes" answer
pub const RETRY_YES: &str = "retry.yes";
/// Id of the "no" answer
pub const RETRY_NO: &str = "retry.no";

/// The user's answer to a retry prompt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryChoice {
    /// Replay the failed operation
    Yes,
    /// Give up
    No,
}

/// Why a retried operation did not produce a value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError {
    /// The user declined to retry after this failure
    #[error("retry declined after: {0}")]
    Declined(RemoteError),

    /// The failure is not retryable
    #[error(transparent)]
    Fatal(RemoteError),
}

/// Asks the user whether to retry a failed operation
#[async_trait]
pub trait RetryPrompt: Send + Sync {
    /// Show `error` and wait for the answer
    async fn confirm_retry(&self, error: &RemoteError) -> RetryChoice;
}

/// Run `operation` until it succeeds, fails fatally or the user declines
pub async fn retry_on_failure<T, F, Fut>(
    prompt: &dyn RetryPrompt,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 1u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.kind().is_retryable() {
            return Err(RetryError::Fatal(err));
        }

        match prompt.confirm_retry(&err).await {
            RetryChoice::Yes => {
                attempt += 1;
                tracing::info!(attempt, error = %err, "Retrying remote operation");
            }
            RetryChoice::No => {
                tracing::debug!(attempt, "Retry declined");
                return Err(RetryError::Declined(err));
            }
        }
    }
}

/// The yes/no command offered while a retry prompt is open
pub fn retry_prompt_command() -> Result<Arc<Command>, CommandTreeError> {
    let yes = Command::literal(RETRY_YES, "yes")
        .with_label("Retry the failed request")
        .build()?;
    let no = Command::literal(RETRY_NO, "no")
        .with_label("Give up")
        .build()?;
    Command::literal(RETRY_COMMAND, "retry")
        .with_label("Retry?")
        .with_trails(vec![yes, no])
        .build()
}

/// Whether a command id answers a retry prompt
#[must_use]
pub fn is_retry_answer(id: &CommandId) -> bool {
    id.as_str() == RETRY_YES || id.as_str() == RETRY_NO
}

struct PendingRetry {
    execution_id: ExecutionId,
    answer: oneshot::Sender<RetryChoice>,
}

/// Open retry prompts waiting for a yes/no command
///
/// The most recently opened prompt is answered first.
#[derive(Clone, Default)]
pub struct RetryBoard {
    pending: Arc<Mutex<Vec<PendingRetry>>>,
}

impl RetryBoard {
    /// Create an empty board
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a prompt for `execution_id`
    pub fn open(&self, execution_id: ExecutionId) -> oneshot::Receiver<RetryChoice> {
        let (answer, receiver) = oneshot::channel();
        self.pending.lock().push(PendingRetry {
            execution_id,
            answer,
        });
        receiver
    }

    /// Answer the newest prompt still being waited on
    ///
    /// Returns the execution that received the answer.
    pub fn answer(&self, choice: RetryChoice) -> Option<ExecutionId> {
        let mut pending = self.pending.lock();
        while let Some(retry) = pending.pop() {
            if retry.answer.send(choice).is_ok() {
                return Some(retry.execution_id);
            }
        }
        None
    }

    /// Decline every open prompt
    pub fn decline_all(&self) -> usize {
        let drained: Vec<PendingRetry> = self.pending.lock().drain(..).collect();
        drained
            .into_iter()
            .map(|retry| retry.answer.send(RetryChoice::No))
            .filter(Result::is_ok)
            .count()
    }

    /// Number of open prompts
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no prompt is open
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    struct ScriptedPrompt {
        answers: Mutex<VecDeque<RetryChoice>>,
        asked: Mutex<Vec<String>>,
    }

    impl ScriptedPrompt {
        fn new(answers: &[RetryChoice]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RetryPrompt for ScriptedPrompt {
        async fn confirm_retry(&self, error: &RemoteError) -> RetryChoice {
            self.asked.lock().push(error.to_string());
            self.answers.lock().pop_front().unwrap_or(RetryChoice::No)
        }
    }

    fn transient() -> RemoteError {
        RemoteError::Connection("refused".to_string())
    }

    #[tokio::test]
    async fn test_yes_replays_with_same_arguments() {
        let prompt = ScriptedPrompt::new(&[RetryChoice::Yes]);
        let calls = Mutex::new(Vec::new());
        let question = String::from("hello world");

        let result = retry_on_failure(&prompt, || {
            calls.lock().push(question.clone());
            let attempt = calls.lock().len();
            async move {
                if attempt == 1 {
                    Err(transient())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(*calls.lock(), vec!["hello world", "hello world"]);
        assert_eq!(prompt.asked.lock().len(), 1);
    }

    #[test]
    fn test_no_declines() {
        let prompt = ScriptedPrompt::new(&[RetryChoice::No]);
        let result: Result<(), _> =
            tokio_test::block_on(retry_on_failure(&prompt, || async { Err(transient()) }));
        assert_eq!(result, Err(RetryError::Declined(transient())));
    }

    #[tokio::test]
    async fn test_auth_failure_is_never_retried() {
        let prompt = ScriptedPrompt::new(&[RetryChoice::Yes]);
        let unauthorized = RemoteError::Status {
            status: 401,
            message: String::new(),
        };
        let expected = unauthorized.clone();

        let result: Result<(), _> = retry_on_failure(&prompt, || {
            let err = unauthorized.clone();
            async move { Err(err) }
        })
        .await;

        assert_eq!(result, Err(RetryError::Fatal(expected)));
        assert!(prompt.asked.lock().is_empty());
    }

    #[test]
    fn test_retry_prompt_command_shape() {
        let command = retry_prompt_command().unwrap();
        let answers: Vec<&str> = command
            .trails()
            .iter()
            .map(|trail| trail.id().as_str())
            .collect();
        assert_eq!(answers, vec![RETRY_YES, RETRY_NO]);
        assert!(is_retry_answer(&CommandId::new(RETRY_NO)));
        assert!(!is_retry_answer(&CommandId::new(RETRY_COMMAND)));
    }

    #[tokio::test]
    async fn test_board_answers_newest_first() {
        let board = RetryBoard::new();
        let older = ExecutionId::new();
        let newer = ExecutionId::new();
        let older_rx = board.open(older);
        let newer_rx = board.open(newer);

        assert_eq!(board.answer(RetryChoice::Yes), Some(newer));
        assert_eq!(newer_rx.await.unwrap(), RetryChoice::Yes);

        assert_eq!(board.decline_all(), 1);
        assert_eq!(older_rx.await.unwrap(), RetryChoice::No);
        assert!(board.is_empty());
    }

    #[test]
    fn test_board_skips_abandoned_prompts() {
        let board = RetryBoard::new();
        let live = ExecutionId::new();
        let _live_rx = board.open(live);
        drop(board.open(ExecutionId::new()));

        assert_eq!(board.answer(RetryChoice::No), Some(live));
        assert_eq!(board.answer(RetryChoice::No), None);
    }
}
