use crate::types::ChatMessage;
use std::sync::Arc;

/// Append-only, insertion-ordered message log.
///
/// Snapshots share the backing vector; an append after a snapshot was taken
/// copies it first, so readers never see a message appear under them.
#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    messages: Arc<Vec<ChatMessage>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new length of the log.
    pub fn append(&mut self, message: ChatMessage) -> usize {
        let messages = Arc::make_mut(&mut self.messages);
        messages.push(message);
        messages.len()
    }

    pub fn snapshot(&self) -> Arc<Vec<ChatMessage>> {
        Arc::clone(&self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }
}
