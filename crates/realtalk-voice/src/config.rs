use crate::error::VoiceError;
use serde::{Deserialize, Serialize};

fn default_session_url() -> String {
    "http://127.0.0.1:8000/session".to_string()
}

fn default_realtime_url() -> String {
    "https://api.openai.com/v1/realtime".to_string()
}

fn default_data_channel_label() -> String {
    "oai-events".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer {
        urls: vec!["stun:stun.l.google.com:19302".to_string()],
        username: String::new(),
        credential: String::new(),
    }]
}

/// A STUN or TURN server handed to the peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub credential: String,
}

/// Where and how the client reaches the realtime service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Backend endpoint that mints the ephemeral client secret.
    #[serde(default = "default_session_url")]
    pub session_url: String,
    /// Realtime endpoint accepting the SDP offer.
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,
    /// Optional `model` query parameter for the SDP exchange.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServer>,
    #[serde(default = "default_data_channel_label")]
    pub data_channel_label: String,
    /// Per-request timeout for the credential and SDP calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            session_url: default_session_url(),
            realtime_url: default_realtime_url(),
            model: None,
            ice_servers: default_ice_servers(),
            data_channel_label: default_data_channel_label(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RealtimeConfig {
    pub fn new(session_url: impl Into<String>, realtime_url: impl Into<String>) -> Self {
        Self {
            session_url: session_url.into(),
            realtime_url: realtime_url.into(),
            ..Self::default()
        }
    }

    /// Rejects configurations that can never negotiate.
    pub fn validate(&self) -> Result<(), VoiceError> {
        if self.session_url.trim().is_empty() {
            return Err(VoiceError::Config("session_url must not be empty".to_string()));
        }
        if self.realtime_url.trim().is_empty() {
            return Err(VoiceError::Config("realtime_url must not be empty".to_string()));
        }
        if self.data_channel_label.trim().is_empty() {
            return Err(VoiceError::Config(
                "data_channel_label must not be empty".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(VoiceError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
