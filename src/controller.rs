//! Turn orchestration and model start-up.
//!
//! `ChatController` is the only writer of lifecycle and turn state. Commands
//! update the session synchronously and hand the external call to a spawned
//! task, so the caller (usually a UI event handler) never waits on the model.

use crate::ai::ModelService;
use crate::config::AppConfig;
use crate::error::{ChatError, ChatResult};
use crate::session::{LifecycleEvent, LifecycleStatus, Rejection, Session};
use crate::types::ChatMessage;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CONTEXT_RESET_NOTE: &str = "Context cleared. The model no longer sees earlier messages.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub start: Duration,
    pub completion: Duration,
}

impl From<&AppConfig> for Timeouts {
    fn from(config: &AppConfig) -> Self {
        Self {
            start: config.start_timeout,
            completion: config.completion_timeout,
        }
    }
}

/// Result of [`ChatController::send_turn`].
#[derive(Debug)]
pub enum SendOutcome {
    /// The user message is in the conversation and the request is running.
    /// Callers clear their input buffer on this.
    Accepted(TurnHandle),
    Rejected(Rejection),
}

impl SendOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SendOutcome::Accepted(_))
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            SendOutcome::Accepted(_) => None,
            SendOutcome::Rejected(reason) => Some(*reason),
        }
    }

    pub fn into_handle(self) -> Option<TurnHandle> {
        match self {
            SendOutcome::Accepted(handle) => Some(handle),
            SendOutcome::Rejected(_) => None,
        }
    }
}

/// Running turn. Dropping the handle does not cancel the turn.
#[derive(Debug)]
pub struct TurnHandle {
    task: JoinHandle<ChatResult<String>>,
}

impl TurnHandle {
    /// Waits for the turn and returns the assistant reply or the failure
    /// that was reported in the conversation.
    pub async fn wait(self) -> ChatResult<String> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(ChatError::Cancelled),
            Err(err) => Err(ChatError::Process(format!("turn task failed: {err}"))),
        }
    }
}

/// Clears the turn's cancellation slot and reopens the gate when dropped, so
/// an aborted or panicking turn task still leaves the session usable.
struct TurnGuard {
    inner: Option<Arc<Inner>>,
}

impl TurnGuard {
    fn new(inner: Arc<Inner>) -> Self {
        Self { inner: Some(inner) }
    }

    fn finish(mut self, reply: ChatMessage) {
        if let Some(inner) = self.inner.take() {
            inner.end_turn(Some(reply));
        }
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            tracing::warn!("turn ended without a reply");
            inner.end_turn(None);
        }
    }
}

struct Inner {
    session: Arc<Session>,
    service: Arc<dyn ModelService>,
    timeouts: Timeouts,
    shutdown: CancellationToken,
    active_turn: Mutex<Option<CancellationToken>>,
}

impl Inner {
    fn active_turn(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active_turn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn end_turn(&self, reply: Option<ChatMessage>) {
        // Cleared before the gate reopens so a new turn's token is never lost.
        *self.active_turn() = None;
        self.session.finish_turn(reply);
    }
}

#[derive(Clone)]
pub struct ChatController {
    inner: Arc<Inner>,
}

impl ChatController {
    pub fn new(session: Arc<Session>, service: Arc<dyn ModelService>, timeouts: Timeouts) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                service,
                timeouts,
                shutdown: CancellationToken::new(),
                active_turn: Mutex::new(None),
            }),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    /// Moves to `Starting` right away and starts the model in the background.
    ///
    /// The returned handle resolves to the status this start produced. With
    /// overlapping starts the one finishing last decides the final status.
    pub fn request_start(&self) -> JoinHandle<LifecycleStatus> {
        let session = Arc::clone(&self.inner.session);
        session.apply(LifecycleEvent::StartRequested);
        tracing::info!(status = ?LifecycleStatus::Starting, "model start requested");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let token = inner.shutdown.child_token();
            let result = bounded(inner.timeouts.start, &token, inner.service.start()).await;
            match result {
                Ok(()) => {
                    let status = session.apply(LifecycleEvent::StartSucceeded);
                    tracing::info!(?status, "model online");
                    status
                }
                Err(err) => {
                    tracing::warn!(error = %err, "model failed to start");
                    session.fail_start(ChatMessage::error(format!("Error starting model: {err}")))
                }
            }
        })
    }

    /// Starts a turn for `raw` if the input is non-empty, the model is online
    /// and no other turn is running. Rejections change nothing.
    pub fn send_turn(&self, raw: &str) -> SendOutcome {
        let prompt = raw.trim();
        if prompt.is_empty() {
            tracing::debug!("empty prompt ignored");
            return SendOutcome::Rejected(Rejection::EmptyInput);
        }
        if let Err(reason) = self.inner.session.try_begin_turn(prompt) {
            tracing::debug!(?reason, "send rejected");
            return SendOutcome::Rejected(reason);
        }

        let token = self.inner.shutdown.child_token();
        *self.inner.active_turn() = Some(token.clone());
        let guard = TurnGuard::new(Arc::clone(&self.inner));
        let prompt = prompt.to_string();
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            tracing::debug!(chars = prompt.chars().count(), "turn started");
            let result =
                bounded(inner.timeouts.completion, &token, inner.service.complete(&prompt)).await;
            let reply = match &result {
                Ok(text) => ChatMessage::assistant(text.clone()),
                Err(err) => {
                    tracing::warn!(error = %err, "turn failed");
                    ChatMessage::error(format!("Error asking model: {err}"))
                }
            };
            guard.finish(reply);
            result
        });

        SendOutcome::Accepted(TurnHandle { task })
    }

    /// Cancels the running turn, if any. Returns whether one was running.
    pub fn cancel_turn(&self) -> bool {
        match self.inner.active_turn().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels all in-flight work and releases the model process.
    pub async fn shutdown(&self) -> ChatResult<()> {
        self.inner.shutdown.cancel();
        self.inner.service.shutdown().await
    }

    /// Synchronous teardown: cancels in-flight work and kills the model
    /// process without waiting for it.
    pub fn terminate(&self) {
        self.inner.shutdown.cancel();
        self.inner.service.terminate();
    }

    /// Drops the prompt history the model sees and notes it in the
    /// conversation. The visible messages are kept. Refused while a turn is
    /// running.
    pub fn reset_context(&self) -> Result<(), Rejection> {
        let service = &self.inner.service;
        let note = ChatMessage::system(CONTEXT_RESET_NOTE);
        match self.inner.session.note_if_idle(note, || service.reset_context()) {
            Ok(_) => {
                tracing::info!("model context reset");
                Ok(())
            }
            Err(reason) => {
                tracing::debug!(?reason, "context reset rejected");
                Err(reason)
            }
        }
    }
}

/// Runs `call` until it finishes, `limit` elapses or `token` is cancelled.
async fn bounded<T>(
    limit: Duration,
    token: &CancellationToken,
    call: impl Future<Output = ChatResult<T>>,
) -> ChatResult<T> {
    tokio::select! {
        _ = token.cancelled() => Err(ChatError::Cancelled),
        result = tokio::time::timeout(limit, call) => {
            result.unwrap_or(Err(ChatError::Timeout(limit)))
        }
    }
}
