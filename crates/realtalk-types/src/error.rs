use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of everything that can go wrong in a session.
///
/// The kind alone decides whether the supervisor retries: permission and
/// configuration problems need a human, everything else is transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Microphone access was denied.
    Permission,
    /// The credential request failed.
    Session,
    /// The credential response was malformed.
    Config,
    /// Negotiation or transport failure.
    Connection,
    /// The remote side reported an error over the control channel.
    Server,
    /// The connection did not come up within the timeout window.
    Timeout,
}

impl ErrorKind {
    pub fn retryable(self) -> bool {
        !matches!(self, Self::Permission | Self::Config)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permission => "permission",
            Self::Session => "session",
            Self::Config => "config",
            Self::Connection => "connection",
            Self::Server => "server",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error routed through the supervisor's single error path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct AssistantError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AssistantError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Session, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}
