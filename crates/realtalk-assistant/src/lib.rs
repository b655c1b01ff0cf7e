//! realtalk voice assistant client.
//!
//! Wires the connection [`supervisor`] to its collaborators: the HTTP
//! credential fetcher and SDP exchange from `realtalk-voice`, the
//! control-message [`router`], the [`tools`] handler with its email
//! [`notify`] side effect, and a [`presenter`] for user-visible state.

pub mod biography;
pub mod config;
pub mod error;
pub mod notify;
pub mod presenter;
pub mod prompt;
pub mod router;
pub mod supervisor;
pub mod telemetry;
pub mod tools;

use crate::biography::Biography;
use crate::config::Config;
use crate::error::SetupError;
use crate::notify::HttpNotifier;
use crate::presenter::Presenter;
use crate::router::ControlRouter;
use crate::supervisor::{SessionHandle, Supervisor, SupervisorConfig, SupervisorDeps};
use crate::tools::ToolHandler;
use realtalk_voice::{
    CredentialFetcher, HttpCredentialFetcher, HttpSdpExchange, MediaPlatform, PlaybackSink,
    SdpExchange, TransportNegotiator,
};
use std::sync::Arc;
use std::time::Duration;

/// Everything a session talks to outside this crate.
pub struct Backends {
    pub credentials: Arc<dyn CredentialFetcher>,
    pub exchange: Arc<dyn SdpExchange>,
    pub platform: Arc<dyn MediaPlatform>,
    pub playback: Arc<dyn PlaybackSink>,
}

/// Builds a supervisor talking to the HTTP backends named in `config`.
///
/// The returned [`Supervisor`] does nothing until [`Supervisor::run`] is
/// polled and [`SessionHandle::initialize`] is called.
pub fn build_supervisor(
    config: &Config,
    platform: Arc<dyn MediaPlatform>,
    playback: Arc<dyn PlaybackSink>,
    presenter: Arc<dyn Presenter>,
) -> Result<(Supervisor, SessionHandle), SetupError> {
    config.validate()?;
    let backends = Backends {
        credentials: Arc::new(HttpCredentialFetcher::new(&config.realtime)?),
        exchange: Arc::new(HttpSdpExchange::new(&config.realtime)?),
        platform,
        playback,
    };
    build_supervisor_with(config, backends, presenter)
}

/// Builds a supervisor over caller-supplied backends. Notifications still
/// go to `notify.url`.
pub fn build_supervisor_with(
    config: &Config,
    backends: Backends,
    presenter: Arc<dyn Presenter>,
) -> Result<(Supervisor, SessionHandle), SetupError> {
    config.validate()?;

    let biography = Arc::new(Biography::load(config.assistant.biography_path.as_deref())?);
    let notifier = Arc::new(HttpNotifier::new(
        &config.notify,
        Duration::from_secs(config.realtime.request_timeout_secs),
    )?);

    let negotiator = Arc::new(TransportNegotiator::new(
        backends.platform,
        backends.exchange,
        backends.playback,
        &config.realtime,
    ));
    let tools = ToolHandler::new(Arc::clone(&biography), notifier, config.notify.clone());
    let router = ControlRouter::new(
        prompt::session_config(&biography, config.assistant.voice.clone()),
        prompt::greeting_instructions(&biography),
        tools,
        Arc::clone(&presenter),
    );

    Ok(Supervisor::new(
        SupervisorDeps {
            credentials: backends.credentials,
            negotiator,
            router,
            presenter,
        },
        SupervisorConfig::from(&config.supervisor),
    ))
}
