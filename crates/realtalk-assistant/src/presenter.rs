//! Presentation adapter.
//!
//! The visual layer is out of process; the supervisor only tells it what to
//! show.

use tracing::{error, info, warn};

/// What the assistant avatar is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Speaking,
    Processing,
    /// A short error flash; the next activity update replaces it.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

pub trait Presenter: Send + Sync {
    fn show_status(&self, message: &str, level: StatusLevel);

    fn set_activity(&self, activity: Activity);

    fn show_muted(&self, muted: bool);
}

/// Renders presentation updates as log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn show_status(&self, message: &str, level: StatusLevel) {
        match level {
            StatusLevel::Info | StatusLevel::Success => info!(level = ?level, "{}", message),
            StatusLevel::Warning => warn!("{}", message),
            StatusLevel::Error => error!("{}", message),
        }
    }

    fn set_activity(&self, activity: Activity) {
        tracing::debug!(activity = ?activity, "activity changed");
    }

    fn show_muted(&self, muted: bool) {
        info!(muted, "microphone mute toggled");
    }
}
