// ABOUTME: Error taxonomy for session lifecycle and event dispatch.
// ABOUTME: Gateway and handler failures wrap anyhow errors from collaborators.

use thiserror::Error;

/// Errors surfaced by the session engine
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Unexpected gateway response: {0}")]
    Protocol(String),

    #[error("Session is not connected")]
    NotConnected,

    #[error("Event worker is not running")]
    NotRunning,

    #[error("Event worker is already running")]
    AlreadyRunning,

    #[error("Gateway error: {0:#}")]
    Gateway(#[from] anyhow::Error),

    #[error("Handler for '{event}' failed: {source:#}")]
    Handler {
        event: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Event worker failed: {0}")]
    Worker(String),
}

impl SessionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the error comes from calling an operation in the wrong lifecycle state
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::NotRunning | Self::AlreadyRunning
        )
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
