use realtalk_voice::VoiceError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Request(String),

    #[error("notification endpoint returned {status}: {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum BiographyError {
    #[error("failed to read biography file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse biography: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryError(pub String);

/// Anything that prevents a supervisor from being assembled.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Biography(#[from] BiographyError),
}
