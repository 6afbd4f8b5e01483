//! Session state shared between the controller and the presentation layer.
//!
//! The whole state lives in a single `watch` channel. Every mutation is one
//! `send_modify` call, so subscribers always observe a consistent
//! status/gate/conversation triple and the check-and-set for a new turn cannot
//! interleave with another writer.

mod lifecycle;
mod store;

pub use lifecycle::{LifecycleEvent, LifecycleStatus};
pub use store::ConversationStore;

use crate::types::ChatMessage;
use std::sync::Arc;
use tokio::sync::watch;

/// Why a send was not started. None of these are surfaced as messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    EmptyInput,
    NotOnline,
    TurnInProgress,
}

#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub status: LifecycleStatus,
    pub pending_turn: bool,
    pub conversation: ConversationStore,
}

impl SessionState {
    pub fn messages(&self) -> Arc<Vec<ChatMessage>> {
        self.conversation.snapshot()
    }

    /// Whether the composer should accept input right now.
    pub fn can_send(&self) -> bool {
        self.status.can_send() && !self.pending_turn
    }
}

pub struct Session {
    state: watch::Sender<SessionState>,
}

impl Session {
    /// New session, offline, seeded with an assistant greeting.
    pub fn new(greeting: impl Into<String>) -> Self {
        let mut conversation = ConversationStore::new();
        conversation.append(ChatMessage::assistant(greeting));
        let (state, _) = watch::channel(SessionState {
            conversation,
            ..SessionState::default()
        });
        Self { state }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> LifecycleStatus {
        self.state.borrow().status
    }

    pub fn is_pending(&self) -> bool {
        self.state.borrow().pending_turn
    }

    pub fn messages(&self) -> Arc<Vec<ChatMessage>> {
        self.state.borrow().messages()
    }

    /// Appends to the conversation and returns the new length.
    pub fn append(&self, message: ChatMessage) -> usize {
        let mut len = 0;
        self.state.send_modify(|state| {
            len = state.conversation.append(message);
        });
        len
    }

    pub(crate) fn apply(&self, event: LifecycleEvent) -> LifecycleStatus {
        let mut next = LifecycleStatus::Offline;
        self.state.send_modify(|state| {
            state.status = state.status.transition(event);
            next = state.status;
        });
        next
    }

    /// Marks the start as failed and records why, in one update.
    pub(crate) fn fail_start(&self, report: ChatMessage) -> LifecycleStatus {
        let mut next = LifecycleStatus::Error;
        self.state.send_modify(|state| {
            state.status = state.status.transition(LifecycleEvent::StartFailed);
            state.conversation.append(report);
            next = state.status;
        });
        next
    }

    /// Closes the gate and appends the user message if the session is online
    /// and idle. Rejections leave the state untouched and notify no one.
    pub(crate) fn try_begin_turn(&self, prompt: &str) -> Result<usize, Rejection> {
        let mut outcome = Err(Rejection::NotOnline);
        self.state.send_if_modified(|state| {
            if !state.status.can_send() {
                outcome = Err(Rejection::NotOnline);
                return false;
            }
            if state.pending_turn {
                outcome = Err(Rejection::TurnInProgress);
                return false;
            }
            state.pending_turn = true;
            outcome = Ok(state.conversation.append(ChatMessage::user(prompt)));
            true
        });
        outcome
    }

    /// Runs `action` and appends `note` while no turn is pending. A turn
    /// cannot begin until both are done.
    pub(crate) fn note_if_idle(
        &self,
        note: ChatMessage,
        action: impl FnOnce(),
    ) -> Result<usize, Rejection> {
        let mut outcome = Err(Rejection::TurnInProgress);
        self.state.send_if_modified(|state| {
            if state.pending_turn {
                return false;
            }
            action();
            outcome = Ok(state.conversation.append(note));
            true
        });
        outcome
    }

    /// Appends the turn's reply, if any, and reopens the gate.
    pub(crate) fn finish_turn(&self, reply: Option<ChatMessage>) {
        self.state.send_modify(|state| {
            if let Some(message) = reply {
                state.conversation.append(message);
            }
            state.pending_turn = false;
        });
    }
}
