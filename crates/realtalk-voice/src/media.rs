//! Media platform seam.
//!
//! These traits describe the slice of a WebRTC stack the client needs:
//! microphone capture, a peer connection with one data channel, and a
//! playback sink for the remote audio. Peer implementations report
//! asynchronous happenings (ICE transitions, inbound tracks, channel
//! frames) through a [`PeerEventSink`], which tags every event with the
//! negotiation epoch that created the connection.

use crate::config::IceServer;
use crate::error::VoiceError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

/// A locally captured track.
///
/// Clones share the same `enabled` and `ended` flags, so the sender held by
/// the peer connection and the handle held by the transport always agree.
/// Disabling a track silences it without renegotiation; stopping it is
/// permanent.
#[derive(Debug, Clone)]
pub struct LocalTrack {
    id: String,
    kind: MediaKind,
    enabled: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
}

impl LocalTrack {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

/// The tracks produced by one microphone capture.
#[derive(Debug, Clone, Default)]
pub struct LocalStream {
    tracks: Vec<LocalTrack>,
}

impl LocalStream {
    pub fn new(tracks: Vec<LocalTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    /// Stops every track, releasing the capture device.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Capture settings forwarded to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// A track received from the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: MediaKind,
    pub stream_id: Option<String>,
}

/// An outbound sender and the track it carries, if any.
#[derive(Debug, Clone)]
pub struct RtpSender {
    pub track: Option<LocalTrack>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something a peer connection observed.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    IceConnectionState(IceConnectionState),
    Track(RemoteTrack),
    ChannelOpen,
    /// One UTF-8 text frame received on the control channel.
    ChannelMessage(String),
    ChannelClosed,
}

/// A [`PeerEvent`] stamped with the negotiation epoch it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub epoch: u64,
    pub event: PeerEvent,
}

/// Where a peer connection delivers its events.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl PeerEventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Delivers an event. Events posted after the supervisor has gone away
    /// are dropped.
    pub fn emit(&self, event: PeerEvent) {
        if self
            .tx
            .send(TransportEvent {
                epoch: self.epoch,
                event,
            })
            .is_err()
        {
            tracing::trace!(epoch = self.epoch, "peer event dropped: supervisor gone");
        }
    }
}

/// The control data channel.
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Sends one text frame. Fails with [`VoiceError::ChannelClosed`] when
    /// the channel is not open.
    fn send_text(&self, text: &str) -> Result<(), VoiceError>;
}

/// One peer connection. Never reused across negotiations.
#[async_trait]
pub trait PeerConnection: Send {
    fn add_track(&mut self, track: LocalTrack) -> Result<(), VoiceError>;

    fn create_data_channel(&mut self, label: &str) -> Result<Arc<dyn DataChannel>, VoiceError>;

    async fn create_offer(&mut self) -> Result<SessionDescription, VoiceError>;

    async fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), VoiceError>;

    async fn set_remote_description(&mut self, desc: SessionDescription)
        -> Result<(), VoiceError>;

    fn senders(&self) -> Vec<RtpSender>;

    /// Closes the connection and its channels. Must be idempotent.
    fn close(&mut self);
}

/// Access to the host's media stack.
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    /// Requests the microphone. A refusal is reported as
    /// [`VoiceError::PermissionDenied`].
    async fn capture_microphone(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<LocalStream, VoiceError>;

    fn create_peer_connection(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerConnection>, VoiceError>;
}

/// Renders inbound audio.
pub trait PlaybackSink: Send + Sync {
    fn attach(&self, track: &RemoteTrack);

    fn detach(&self, track: &RemoteTrack);
}
