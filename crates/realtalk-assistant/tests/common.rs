#![allow(dead_code)]

use async_trait::async_trait;
use realtalk_assistant::biography::Biography;
use realtalk_assistant::config::NotifyConfig;
use realtalk_assistant::error::NotifyError;
use realtalk_assistant::notify::{EmailNotification, Notifier};
use realtalk_assistant::presenter::{Activity, Presenter, StatusLevel};
use realtalk_assistant::prompt;
use realtalk_assistant::router::ControlRouter;
use realtalk_assistant::supervisor::{SessionHandle, Supervisor, SupervisorConfig, SupervisorDeps};
use realtalk_assistant::tools::ToolHandler;
use realtalk_types::SessionCredential;
use realtalk_voice::loopback::{LoopbackExchange, LoopbackOptions, LoopbackPlatform, LoopbackPlayback};
use realtalk_voice::{CredentialFetcher, RealtimeConfig, TransportNegotiator, VoiceError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Credential source with scripted outcomes. Once the script runs out every
/// call returns `fallback`.
pub struct FakeCredentials {
    script: Mutex<VecDeque<Result<SessionCredential, VoiceError>>>,
    fallback: Result<SessionCredential, VoiceError>,
    stalled: AtomicBool,
    calls: Mutex<Vec<Instant>>,
}

impl FakeCredentials {
    pub fn ok() -> Self {
        Self::scripted(Vec::new(), Ok(SessionCredential::new("ek_test", None)))
    }

    pub fn failing(err: VoiceError) -> Self {
        Self::scripted(Vec::new(), Err(err))
    }

    pub fn scripted(
        script: Vec<Result<SessionCredential, VoiceError>>,
        fallback: Result<SessionCredential, VoiceError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            stalled: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A source whose fetches never complete.
    pub fn stalled() -> Self {
        let credentials = Self::ok();
        credentials.stalled.store(true, Ordering::SeqCst);
        credentials
    }

    /// When each fetch happened, in order.
    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialFetcher for FakeCredentials {
    async fn fetch_credential(&self) -> Result<SessionCredential, VoiceError> {
        self.calls.lock().unwrap().push(Instant::now());
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<EmailNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<EmailNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: EmailNotification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    statuses: Mutex<Vec<(String, StatusLevel)>>,
    activities: Mutex<Vec<Activity>>,
    muted: Mutex<Vec<bool>>,
}

impl RecordingPresenter {
    pub fn statuses(&self) -> Vec<(String, StatusLevel)> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn status_messages(&self) -> Vec<String> {
        self.statuses().into_iter().map(|(m, _)| m).collect()
    }

    pub fn activities(&self) -> Vec<Activity> {
        self.activities.lock().unwrap().clone()
    }

    pub fn muted(&self) -> Vec<bool> {
        self.muted.lock().unwrap().clone()
    }
}

impl Presenter for RecordingPresenter {
    fn show_status(&self, message: &str, level: StatusLevel) {
        self.statuses.lock().unwrap().push((message.to_string(), level));
    }

    fn set_activity(&self, activity: Activity) {
        self.activities.lock().unwrap().push(activity);
    }

    fn show_muted(&self, muted: bool) {
        self.muted.lock().unwrap().push(muted);
    }
}

/// A running supervisor wired to in-process collaborators.
pub struct Session {
    pub platform: LoopbackPlatform,
    pub exchange: Arc<LoopbackExchange>,
    pub playback: Arc<LoopbackPlayback>,
    pub credentials: Arc<FakeCredentials>,
    pub notifier: Arc<RecordingNotifier>,
    pub presenter: Arc<RecordingPresenter>,
    pub handle: SessionHandle,
    pub task: JoinHandle<()>,
}

pub fn connecting() -> LoopbackOptions {
    LoopbackOptions {
        auto_connect: true,
        ..LoopbackOptions::default()
    }
}

pub fn start(
    options: LoopbackOptions,
    credentials: FakeCredentials,
    config: SupervisorConfig,
) -> Session {
    let platform = LoopbackPlatform::new(options);
    let exchange = Arc::new(LoopbackExchange::new());
    let playback = Arc::new(LoopbackPlayback::new());
    let credentials = Arc::new(credentials);
    let notifier = Arc::new(RecordingNotifier::default());
    let presenter = Arc::new(RecordingPresenter::default());

    let bio = Arc::new(Biography::embedded().unwrap());
    let tools = ToolHandler::new(Arc::clone(&bio), notifier.clone(), NotifyConfig::default());
    let router = ControlRouter::new(
        prompt::session_config(&bio, None),
        prompt::greeting_instructions(&bio),
        tools,
        presenter.clone(),
    );
    let negotiator = Arc::new(TransportNegotiator::new(
        Arc::new(platform.clone()),
        exchange.clone(),
        playback.clone(),
        &RealtimeConfig::default(),
    ));

    let (supervisor, handle) = Supervisor::new(
        SupervisorDeps {
            credentials: credentials.clone(),
            negotiator,
            router,
            presenter: presenter.clone(),
        },
        config,
    );
    let task = tokio::spawn(supervisor.run());

    Session {
        platform,
        exchange,
        playback,
        credentials,
        notifier,
        presenter,
        handle,
        task,
    }
}

/// Yields to the runtime until `condition` holds, without advancing time.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
