use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};

const MESSAGE_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[hour repr:12 padding:zero]:[minute padding:zero] [period case:upper]");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A single entry of the visible conversation.
///
/// Fields are private so a message cannot change after it has been built;
/// `error` is only ever set by [`ChatMessage::error`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    role: Role,
    content: String,
    created_at: OffsetDateTime,
    error: bool,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>, error: bool) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: OffsetDateTime::now_utc(),
            error,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, false)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, false)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, false)
    }

    /// System message reporting a failure.
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, true)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    /// Creation time in the local offset, e.g. `09:41 AM`.
    pub fn display_time(&self) -> Option<String> {
        let mut datetime = self.created_at;
        if let Ok(offset) = UtcOffset::current_local_offset() {
            datetime = datetime.to_offset(offset);
        }
        datetime.format(MESSAGE_TIME_FORMAT).ok()
    }
}
