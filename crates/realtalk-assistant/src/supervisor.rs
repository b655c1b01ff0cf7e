//! Connection supervisor.
//!
//! One task owns the session: its status, the current transport, the
//! reconnect counter and every timer. Host commands, timer expiries,
//! transport events and completion of the in-flight negotiation all enter
//! through the `select!` in [`Supervisor::run`], so transitions never
//! interleave.
//!
//! Each negotiation attempt gets a new epoch. Transport events and timer
//! signals carry the epoch they were created for, and anything from an
//! older epoch is discarded.

use crate::config::SupervisorSettings;
use crate::presenter::{Presenter, StatusLevel};
use crate::router::ControlRouter;
use futures::future::BoxFuture;
use realtalk_types::{AssistantError, ClientEvent, ConnectionStatus};
use realtalk_voice::{
    CredentialFetcher, IceConnectionState, LocalStream, PeerEvent, PeerEventSink, Transport,
    TransportEvent, TransportNegotiator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&SupervisorSettings::default())
    }
}

impl From<&SupervisorSettings> for SupervisorConfig {
    fn from(settings: &SupervisorSettings) -> Self {
        Self {
            max_reconnect_attempts: settings.max_reconnect_attempts,
            reconnect_base_delay: settings.reconnect_base_delay(),
            connect_timeout: settings.connect_timeout(),
            heartbeat_interval: settings.heartbeat_interval(),
        }
    }
}

/// Collaborators the supervisor drives.
pub struct SupervisorDeps {
    pub credentials: Arc<dyn CredentialFetcher>,
    pub negotiator: Arc<TransportNegotiator>,
    pub router: ControlRouter,
    pub presenter: Arc<dyn Presenter>,
}

/// Read-only view of the session, published after every transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub status: ConnectionStatus,
    pub processing: bool,
    pub muted: bool,
    pub reconnect_attempts: u32,
    /// Negotiations started since the session was created.
    pub negotiations: u32,
    pub saved_messages: usize,
    pub last_error: Option<AssistantError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Initialize,
    ToggleMute,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    ConnectTimeout { epoch: u64 },
    Heartbeat { epoch: u64 },
    Retry { epoch: u64 },
}

/// Host-side handle on a running [`Supervisor`].
///
/// Commands sent after the session has closed are ignored.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Starts the first negotiation. Ignored unless the session is idle.
    pub fn initialize(&self) {
        self.send(Command::Initialize);
    }

    pub fn toggle_mute(&self) {
        self.send(Command::ToggleMute);
    }

    pub fn close(&self) {
        self.send(Command::Close);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::clone(&self.snapshot.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Waits until a published snapshot satisfies `predicate`. Returns the
    /// last snapshot if the supervisor stops first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> SessionSnapshot
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        loop {
            {
                let current = rx.borrow_and_update();
                if predicate(&current) {
                    return SessionSnapshot::clone(&current);
                }
            }
            if rx.changed().await.is_err() {
                return SessionSnapshot::clone(&rx.borrow());
            }
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(?command, "session already finished, command ignored");
        }
    }
}

type Attempt = BoxFuture<'static, (u64, Result<Transport, AssistantError>)>;

pub struct Supervisor {
    config: SupervisorConfig,
    credentials: Arc<dyn CredentialFetcher>,
    negotiator: Arc<TransportNegotiator>,
    router: ControlRouter,
    presenter: Arc<dyn Presenter>,

    commands: mpsc::UnboundedReceiver<Command>,
    signals_tx: mpsc::UnboundedSender<Signal>,
    signals_rx: mpsc::UnboundedReceiver<Signal>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    snapshot: watch::Sender<SessionSnapshot>,

    status: ConnectionStatus,
    epoch: u64,
    attempts: u32,
    negotiations: u32,
    muted: bool,
    last_error: Option<AssistantError>,

    transport: Option<Transport>,
    bootstrapped: bool,
    attempt: Option<Attempt>,
    /// Events of the current epoch that arrived before its transport was installed.
    early_events: Vec<TransportEvent>,

    connect_timer: Option<JoinHandle<()>>,
    heartbeat_timer: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(deps: SupervisorDeps, config: SupervisorConfig) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot, snapshot_rx) = watch::channel(SessionSnapshot::default());

        let supervisor = Self {
            config,
            credentials: deps.credentials,
            negotiator: deps.negotiator,
            router: deps.router,
            presenter: deps.presenter,
            commands,
            signals_tx,
            signals_rx,
            events_tx,
            events_rx,
            snapshot,
            status: ConnectionStatus::Idle,
            epoch: 0,
            attempts: 0,
            negotiations: 0,
            muted: false,
            last_error: None,
            transport: None,
            bootstrapped: false,
            attempt: None,
            early_events: Vec::new(),
            connect_timer: None,
            heartbeat_timer: None,
            retry_timer: None,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
        };
        (supervisor, handle)
    }

    /// Drives the session until it is closed.
    pub async fn run(mut self) {
        info!("session supervisor started");
        loop {
            tokio::select! {
                biased;
                (epoch, result) = next_attempt(&mut self.attempt) => {
                    self.attempt = None;
                    self.on_attempt_finished(epoch, result);
                }
                Some(event) = self.events_rx.recv() => self.on_transport_event(event),
                Some(signal) = self.signals_rx.recv() => self.on_signal(signal),
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("all session handles dropped");
                        self.close();
                    }
                },
            }
            self.publish();
            if self.status.is_terminal() {
                break;
            }
        }
        info!(negotiations = self.negotiations, "session supervisor stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Initialize => {
                if self.status == ConnectionStatus::Idle {
                    self.presenter
                        .show_status("Initializing assistant...", StatusLevel::Info);
                    self.attempts = 0;
                    self.start_negotiation();
                } else {
                    warn!(status = %self.status, "initialize ignored: session already started");
                }
            }
            Command::ToggleMute => self.toggle_mute(),
            Command::Close => self.close(),
        }
    }

    fn start_negotiation(&mut self) {
        if self.attempt.is_some() || self.status == ConnectionStatus::Negotiating {
            warn!(epoch = self.epoch, "negotiation already in flight");
            return;
        }
        self.release_transport();
        self.early_events.clear();

        self.epoch += 1;
        self.negotiations += 1;
        let epoch = self.epoch;
        self.set_status(ConnectionStatus::Negotiating);
        self.presenter
            .show_status("Initializing connection...", StatusLevel::Info);
        self.router.set_processing(true);
        self.arm_connect_timeout(epoch);

        let credentials = Arc::clone(&self.credentials);
        let negotiator = Arc::clone(&self.negotiator);
        let sink = PeerEventSink::new(epoch, self.events_tx.clone());
        info!(epoch, attempt = self.attempts, "starting negotiation");
        self.attempt = Some(Box::pin(async move {
            (epoch, negotiate_once(credentials, negotiator, sink).await)
        }));
    }

    fn on_attempt_finished(&mut self, epoch: u64, result: Result<Transport, AssistantError>) {
        if epoch != self.epoch || self.status != ConnectionStatus::Negotiating {
            debug!(epoch, "discarding stale negotiation result");
            return;
        }
        match result {
            Ok(transport) => {
                if !transport.set_muted(self.muted) {
                    debug!(epoch, "transport has no outbound audio sender");
                }
                self.transport = Some(transport);
                self.bootstrapped = false;
                for event in std::mem::take(&mut self.early_events) {
                    self.on_transport_event(event);
                }
            }
            Err(err) => self.handle_error(err),
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        if event.epoch != self.epoch {
            trace!(epoch = event.epoch, current = self.epoch, "stale transport event");
            return;
        }
        if self.transport.is_none() {
            if self.attempt.is_some() {
                self.early_events.push(event);
            }
            return;
        }

        match event.event {
            PeerEvent::IceConnectionState(state) => self.on_ice_state(state),
            PeerEvent::Track(track) => {
                if let Some(transport) = self.transport.as_mut() {
                    transport.attach_remote_track(track);
                }
            }
            PeerEvent::ChannelOpen => {
                if let Some(transport) = &self.transport {
                    if !self.bootstrapped {
                        info!(epoch = self.epoch, "control channel open");
                        self.router.bootstrap(transport.channel());
                        self.bootstrapped = true;
                    }
                }
            }
            PeerEvent::ChannelMessage(frame) => {
                let error = match &self.transport {
                    Some(transport) => self.router.handle_frame(transport.channel(), &frame),
                    None => None,
                };
                if let Some(err) = error {
                    self.handle_error(err);
                }
            }
            PeerEvent::ChannelClosed => {
                warn!(epoch = self.epoch, "control channel closed");
            }
        }
    }

    fn on_ice_state(&mut self, state: IceConnectionState) {
        debug!(epoch = self.epoch, ice = %state, "ICE connection state");
        match state {
            IceConnectionState::Connected | IceConnectionState::Completed => self.on_connected(),
            IceConnectionState::Disconnected | IceConnectionState::Failed => {
                self.presenter.show_status("Connection lost", StatusLevel::Error);
                self.handle_error(AssistantError::connection(format!(
                    "ICE connection {}",
                    state
                )));
            }
            IceConnectionState::Closed => {
                if !matches!(
                    self.status,
                    ConnectionStatus::Closed | ConnectionStatus::Reconnecting
                ) {
                    self.presenter
                        .show_status("Connection closed", StatusLevel::Info);
                    self.handle_error(AssistantError::connection("ICE connection closed"));
                }
            }
            IceConnectionState::New | IceConnectionState::Checking => {}
        }
    }

    fn on_connected(&mut self) {
        match self.status {
            ConnectionStatus::Negotiating => {
                clear_timer(&mut self.connect_timer);
                self.attempts = 0;
                self.set_status(ConnectionStatus::Connected);
                self.arm_heartbeat(self.epoch);
                self.presenter.show_status("Connected", StatusLevel::Success);
            }
            ConnectionStatus::Degraded => {
                self.set_status(ConnectionStatus::Connected);
                self.presenter
                    .show_status("Connection restored", StatusLevel::Success);
            }
            _ => {}
        }
    }

    fn on_signal(&mut self, signal: Signal) {
        match signal {
            Signal::ConnectTimeout { epoch } => {
                if epoch == self.epoch && self.status == ConnectionStatus::Negotiating {
                    self.connect_timer = None;
                    self.handle_error(AssistantError::timeout("Connection timeout"));
                }
            }
            Signal::Heartbeat { epoch } => {
                if epoch == self.epoch && self.status.is_live() {
                    self.send_heartbeat();
                }
            }
            Signal::Retry { epoch } => {
                if epoch == self.epoch && self.status == ConnectionStatus::Reconnecting {
                    self.retry_timer = None;
                    self.start_negotiation();
                }
            }
        }
    }

    fn send_heartbeat(&mut self) {
        let Some(transport) = &self.transport else {
            return;
        };
        if !transport.is_channel_open() {
            warn!(epoch = self.epoch, "heartbeat skipped: control channel not open");
            if self.status == ConnectionStatus::Connected {
                self.set_status(ConnectionStatus::Degraded);
                self.presenter
                    .show_status("Connection degraded", StatusLevel::Warning);
            }
            return;
        }
        if self.router.send(transport.channel(), &ClientEvent::Heartbeat)
            && self.status == ConnectionStatus::Degraded
        {
            self.set_status(ConnectionStatus::Connected);
            self.presenter
                .show_status("Connection restored", StatusLevel::Success);
        }
    }

    fn toggle_mute(&mut self) {
        self.muted = !self.muted;
        if let Some(transport) = &self.transport {
            if !transport.set_muted(self.muted) {
                debug!("no outbound audio sender to mute");
            }
        }
        self.presenter.show_muted(self.muted);
    }

    /// The single error path. Releases the transport and timers, then
    /// either schedules a reconnect or closes the session for good.
    fn handle_error(&mut self, err: AssistantError) {
        if self.status == ConnectionStatus::Closed {
            return;
        }
        warn!(
            epoch = self.epoch,
            kind = %err.kind,
            retryable = err.retryable(),
            error = %err.message,
            "session error"
        );
        self.router.show_error();
        self.teardown();
        self.last_error = Some(err.clone());

        if err.retryable() {
            self.schedule_reconnect(err);
        } else {
            self.fail_terminal(err);
        }
    }

    fn schedule_reconnect(&mut self, err: AssistantError) {
        let max = self.config.max_reconnect_attempts;
        if self.attempts >= max {
            self.presenter
                .show_status("Could not reconnect", StatusLevel::Error);
            let message = format!(
                "Could not reconnect after {} attempts: {}",
                self.attempts, err.message
            );
            self.fail_terminal(AssistantError::new(err.kind, message));
            return;
        }

        self.attempts += 1;
        let delay = backoff_delay(self.config.reconnect_base_delay, self.attempts);
        self.set_status(ConnectionStatus::Reconnecting);
        self.presenter.show_status(
            &format!("Reconnecting ({}/{})...", self.attempts, max),
            StatusLevel::Warning,
        );
        info!(
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        let epoch = self.epoch;
        self.retry_timer = Some(self.spawn_signal(delay, Signal::Retry { epoch }));
    }

    fn fail_terminal(&mut self, err: AssistantError) {
        self.teardown();
        clear_timer(&mut self.retry_timer);
        self.presenter.show_status(&err.message, StatusLevel::Error);
        self.last_error = Some(err);
        self.set_status(ConnectionStatus::Closed);
    }

    fn close(&mut self) {
        if self.status == ConnectionStatus::Closed {
            return;
        }
        info!(epoch = self.epoch, "closing session");
        self.teardown();
        clear_timer(&mut self.retry_timer);
        self.attempts = 0;
        self.router.reset();
        self.set_status(ConnectionStatus::Closed);
        self.presenter.show_status("Session closed", StatusLevel::Info);
    }

    /// Drops the in-flight negotiation, closes the transport and cancels
    /// the connection-scoped timers.
    fn teardown(&mut self) {
        if self.attempt.take().is_some() {
            debug!(epoch = self.epoch, "in-flight negotiation dropped");
        }
        self.early_events.clear();
        clear_timer(&mut self.connect_timer);
        clear_timer(&mut self.heartbeat_timer);
        self.release_transport();
    }

    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.bootstrapped = false;
    }

    fn arm_connect_timeout(&mut self, epoch: u64) {
        clear_timer(&mut self.connect_timer);
        let timeout = self.config.connect_timeout;
        self.connect_timer = Some(self.spawn_signal(timeout, Signal::ConnectTimeout { epoch }));
    }

    fn arm_heartbeat(&mut self, epoch: u64) {
        clear_timer(&mut self.heartbeat_timer);
        let interval = self.config.heartbeat_interval;
        let tx = self.signals_tx.clone();
        self.heartbeat_timer = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if tx.send(Signal::Heartbeat { epoch }).is_err() {
                    break;
                }
            }
        }));
    }

    fn spawn_signal(&self, delay: Duration, signal: Signal) -> JoinHandle<()> {
        let tx = self.signals_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(signal).is_err() {
                trace!(?signal, "supervisor gone before timer fired");
            }
        })
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            info!(from = %self.status, to = %status, epoch = self.epoch, "status changed");
            self.status = status;
        }
    }

    fn publish(&self) {
        let next = SessionSnapshot {
            status: self.status,
            processing: self.router.view().processing,
            muted: self.muted,
            reconnect_attempts: self.attempts,
            negotiations: self.negotiations,
            saved_messages: self.router.tools().messages().len(),
            last_error: self.last_error.clone(),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        clear_timer(&mut self.connect_timer);
        clear_timer(&mut self.heartbeat_timer);
        clear_timer(&mut self.retry_timer);
    }
}

async fn next_attempt(slot: &mut Option<Attempt>) -> (u64, Result<Transport, AssistantError>) {
    match slot.as_mut() {
        Some(attempt) => attempt.await,
        None => std::future::pending().await,
    }
}

/// Linear backoff: retry `attempt` waits `attempt * base`, saturating.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(attempt).unwrap_or(Duration::MAX)
}

fn clear_timer(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}

/// One negotiation: microphone, then credential, then offer/answer.
async fn negotiate_once(
    credentials: Arc<dyn CredentialFetcher>,
    negotiator: Arc<TransportNegotiator>,
    sink: PeerEventSink,
) -> Result<Transport, AssistantError> {
    let stream = negotiator.capture_microphone().await?;
    let mut guard = CaptureGuard(Some(stream.clone()));

    let credential = credentials.fetch_credential().await?;
    let transport = negotiator.negotiate(credential, stream, sink).await?;

    guard.disarm();
    Ok(transport)
}

/// Stops captured tracks unless negotiation hands them to a transport,
/// including when the attempt future is dropped mid-flight.
struct CaptureGuard(Option<LocalStream>);

impl CaptureGuard {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if let Some(stream) = self.0.take() {
            stream.stop();
        }
    }
}
