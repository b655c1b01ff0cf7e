//! Shared types, wire messages, and error definitions for realtalk.
//!
//! This crate is the leaf of the workspace: the voice transport crate and
//! the assistant crate both depend on it for cross-cutting definitions,
//! and it depends on nothing internal. Keeping the connection status, the
//! control-message shapes, and the error taxonomy here lets every component
//! agree on them without depending on each other.

use serde::{Deserialize, Serialize};

mod credential;
mod error;
pub mod message;
mod tool;

pub use credential::SessionCredential;
pub use error::{AssistantError, ErrorKind};
pub use message::{ClientEvent, ServerEvent};
pub use tool::{StoredMessage, ToolCallRequest};

/// Lifecycle state of the realtime session.
///
/// Exactly one value exists per client session and only the connection
/// supervisor changes it; everything else observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Nothing started yet.
    #[default]
    Idle,
    /// Credential fetch and offer/answer exchange in progress.
    Negotiating,
    /// ICE reported a usable path; the session is live.
    Connected,
    /// Live, but the last keep-alive could not be sent.
    Degraded,
    /// Waiting out the backoff delay before the next negotiation.
    Reconnecting,
    /// Terminal. No further automatic work happens.
    Closed,
}

impl ConnectionStatus {
    /// Returns the canonical lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Negotiating => "negotiating",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Whether media and control traffic can flow in this state.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connected | Self::Degraded)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
