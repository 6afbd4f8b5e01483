use std::time::Duration;

/// Everything that can go wrong between the controller and the model server.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChatError {
    /// The model server could not be brought up.
    #[error("{0}")]
    Startup(String),

    #[error("backend error {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("model process error: {0}")]
    Process(String),
}

impl ChatError {
    pub fn startup(detail: impl Into<String>) -> Self {
        Self::Startup(detail.into())
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config(detail.into())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::MalformedResponse(err.to_string())
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Process(err.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure_kind() {
        let backend = ChatError::Backend {
            status: 500,
            body: "backend crashed".into(),
        };
        assert_eq!(backend.to_string(), "backend error 500: backend crashed");
        assert_eq!(
            ChatError::Timeout(Duration::from_secs(120)).to_string(),
            "timed out after 120s"
        );
        assert_eq!(
            ChatError::startup("connection refused").to_string(),
            "connection refused"
        );
    }
}
