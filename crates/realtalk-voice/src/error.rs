use realtalk_types::AssistantError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("session request failed: {0}")]
    Session(String),

    #[error("invalid session configuration: {0}")]
    InvalidCredential(String),

    #[error("negotiation with realtime endpoint failed: {0}")]
    Negotiation(String),

    #[error("peer connection error: {0}")]
    PeerConnection(String),

    #[error("data channel is not open")]
    ChannelClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<VoiceError> for AssistantError {
    fn from(err: VoiceError) -> Self {
        let message = err.to_string();
        match err {
            VoiceError::PermissionDenied(_) => AssistantError::permission(message),
            VoiceError::Session(_) => AssistantError::session(message),
            VoiceError::InvalidCredential(_) | VoiceError::Config(_) => {
                AssistantError::config(message)
            }
            VoiceError::Negotiation(_)
            | VoiceError::PeerConnection(_)
            | VoiceError::ChannelClosed => AssistantError::connection(message),
        }
    }
}
