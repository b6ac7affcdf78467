/// Error types for the inbox sync engine
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InboxError {
    #[error("No user is signed in")]
    NotAuthenticated,

    #[error("Inbox has not been loaded yet")]
    NotInitialized,

    #[error("Message not found in inbox: {0}")]
    MessageNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A newer reload superseded this one. Never reported to listeners.
    #[error("Reload was superseded")]
    Cancelled,
    #[error("Background task failed: {0}")]
    Task(String),
}

impl InboxError {
    /// Network, HTTP and socket failures
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            InboxError::Transport(_) | InboxError::Http { .. } | InboxError::Socket(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, InboxError::Cancelled)
    }
}

impl From<tokio::task::JoinError> for InboxError {
    fn from(e: tokio::task::JoinError) -> Self {
        InboxError::Task(e.to_string())
    }
}

impl From<reqwest::Error> for InboxError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => InboxError::Http {
                status: status.as_u16(),
                body: e.to_string(),
            },
            None => InboxError::Transport(e.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for InboxError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        InboxError::Socket(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InboxError>;
