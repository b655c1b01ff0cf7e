//! In-process media platform.
//!
//! Nothing here touches a device or the network. Peer connections record
//! what they were given, and a [`LoopbackPeer`] handle lets the host play
//! the remote side: report ICE transitions, open the control channel,
//! deliver frames and tracks, and inspect what the client sent. With
//! `auto_connect` set, applying the answer immediately connects ICE, opens
//! the channel and delivers one remote audio track. [`LoopbackCredentials`]
//! and [`LoopbackExchange`] stand in for the two HTTP backends.

use crate::config::IceServer;
use crate::credential::CredentialFetcher;
use crate::error::VoiceError;
use crate::media::{
    AudioConstraints, DataChannel, IceConnectionState, LocalStream, LocalTrack, MediaKind,
    MediaPlatform, PeerConnection, PeerEvent, PeerEventSink, PlaybackSink, RemoteTrack,
    RtpSender, SessionDescription,
};
use crate::sdp::SdpExchange;
use async_trait::async_trait;
use realtalk_types::SessionCredential;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
pub struct LoopbackOptions {
    /// Refuse microphone capture, as a user declining the prompt would.
    pub deny_microphone: bool,
    /// Connect as soon as the remote answer is applied.
    pub auto_connect: bool,
}

#[derive(Default)]
struct PlatformState {
    options: LoopbackOptions,
    peers: Vec<LoopbackPeer>,
    captures: Vec<LocalStream>,
}

#[derive(Clone, Default)]
pub struct LoopbackPlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl LoopbackPlatform {
    pub fn new(options: LoopbackOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlatformState {
                options,
                ..PlatformState::default()
            })),
        }
    }

    pub fn set_deny_microphone(&self, deny: bool) {
        lock(&self.state).options.deny_microphone = deny;
    }

    /// Every peer connection created so far, oldest first.
    pub fn peers(&self) -> Vec<LoopbackPeer> {
        lock(&self.state).peers.clone()
    }

    pub fn peer(&self, index: usize) -> Option<LoopbackPeer> {
        lock(&self.state).peers.get(index).cloned()
    }

    pub fn latest_peer(&self) -> Option<LoopbackPeer> {
        lock(&self.state).peers.last().cloned()
    }

    /// Every microphone capture granted so far, oldest first.
    pub fn captures(&self) -> Vec<LocalStream> {
        lock(&self.state).captures.clone()
    }
}

#[async_trait]
impl MediaPlatform for LoopbackPlatform {
    async fn capture_microphone(
        &self,
        _constraints: &AudioConstraints,
    ) -> Result<LocalStream, VoiceError> {
        let mut state = lock(&self.state);
        if state.options.deny_microphone {
            return Err(VoiceError::PermissionDenied(
                "Permission denied by user".to_string(),
            ));
        }
        let stream = LocalStream::new(vec![LocalTrack::new(MediaKind::Audio)]);
        state.captures.push(stream.clone());
        Ok(stream)
    }

    fn create_peer_connection(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerConnection>, VoiceError> {
        let mut state = lock(&self.state);
        let shared = Arc::new(PeerShared {
            sink: events,
            auto_connect: state.options.auto_connect,
            ice_server_count: ice_servers.len(),
            channel: Mutex::new(None),
            tracks: Mutex::new(Vec::new()),
            local_sdp: Mutex::new(None),
            remote_sdp: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        state.peers.push(LoopbackPeer {
            shared: Arc::clone(&shared),
        });
        debug!(epoch = shared.sink.epoch(), "loopback peer connection created");
        Ok(Box::new(LoopbackConnection { shared }))
    }
}

struct PeerShared {
    sink: PeerEventSink,
    auto_connect: bool,
    ice_server_count: usize,
    channel: Mutex<Option<Arc<LoopbackChannel>>>,
    tracks: Mutex<Vec<LocalTrack>>,
    local_sdp: Mutex<Option<String>>,
    remote_sdp: Mutex<Option<String>>,
    closed: AtomicBool,
}

/// Host-side handle on one loopback peer connection.
#[derive(Clone)]
pub struct LoopbackPeer {
    shared: Arc<PeerShared>,
}

impl LoopbackPeer {
    pub fn epoch(&self) -> u64 {
        self.shared.sink.epoch()
    }

    pub fn ice_server_count(&self) -> usize {
        self.shared.ice_server_count
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn set_ice_state(&self, state: IceConnectionState) {
        if !self.is_closed() {
            self.shared.sink.emit(PeerEvent::IceConnectionState(state));
        }
    }

    pub fn open_channel(&self) {
        if self.is_closed() {
            return;
        }
        if let Some(channel) = lock(&self.shared.channel).as_ref() {
            channel.open.store(true, Ordering::SeqCst);
        }
        self.shared.sink.emit(PeerEvent::ChannelOpen);
    }

    /// Closes the control channel while leaving the connection up.
    pub fn close_channel(&self) {
        if let Some(channel) = lock(&self.shared.channel).as_ref() {
            channel.open.store(false, Ordering::SeqCst);
        }
        if !self.is_closed() {
            self.shared.sink.emit(PeerEvent::ChannelClosed);
        }
    }

    /// Delivers one text frame as if the remote endpoint had sent it.
    pub fn deliver(&self, frame: impl Into<String>) {
        if !self.is_closed() {
            self.shared.sink.emit(PeerEvent::ChannelMessage(frame.into()));
        }
    }

    pub fn deliver_track(&self, track: RemoteTrack) {
        if !self.is_closed() {
            self.shared.sink.emit(PeerEvent::Track(track));
        }
    }

    /// Frames the client sent on the control channel, in order.
    pub fn sent_frames(&self) -> Vec<String> {
        lock(&self.shared.channel)
            .as_ref()
            .map(|channel| lock(&channel.sent).clone())
            .unwrap_or_default()
    }

    /// Sent frames parsed as JSON; unparsable frames are skipped.
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    pub fn local_tracks(&self) -> Vec<LocalTrack> {
        lock(&self.shared.tracks).clone()
    }

    pub fn local_description(&self) -> Option<String> {
        lock(&self.shared.local_sdp).clone()
    }

    pub fn remote_description(&self) -> Option<String> {
        lock(&self.shared.remote_sdp).clone()
    }
}

struct LoopbackConnection {
    shared: Arc<PeerShared>,
}

impl LoopbackConnection {
    fn ensure_open(&self) -> Result<(), VoiceError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(VoiceError::PeerConnection(
                "peer connection is closed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerConnection for LoopbackConnection {
    fn add_track(&mut self, track: LocalTrack) -> Result<(), VoiceError> {
        self.ensure_open()?;
        lock(&self.shared.tracks).push(track);
        Ok(())
    }

    fn create_data_channel(&mut self, label: &str) -> Result<Arc<dyn DataChannel>, VoiceError> {
        self.ensure_open()?;
        let channel = Arc::new(LoopbackChannel {
            label: label.to_string(),
            open: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        });
        *lock(&self.shared.channel) = Some(Arc::clone(&channel));
        Ok(channel)
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, VoiceError> {
        self.ensure_open()?;
        let epoch = self.shared.sink.epoch();
        let audio_lines = lock(&self.shared.tracks)
            .iter()
            .map(|track| format!("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=msid:- {}\r\n", track.id()))
            .collect::<String>();
        Ok(SessionDescription::offer(format!(
            "v=0\r\no=- {epoch} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n{audio_lines}m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n"
        )))
    }

    async fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), VoiceError> {
        self.ensure_open()?;
        *lock(&self.shared.local_sdp) = Some(desc.sdp);
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), VoiceError> {
        self.ensure_open()?;
        *lock(&self.shared.remote_sdp) = Some(desc.sdp);

        if self.shared.auto_connect {
            let peer = LoopbackPeer {
                shared: Arc::clone(&self.shared),
            };
            peer.set_ice_state(IceConnectionState::Checking);
            peer.set_ice_state(IceConnectionState::Connected);
            peer.deliver_track(RemoteTrack {
                id: format!("remote-audio-{}", peer.epoch()),
                kind: MediaKind::Audio,
                stream_id: Some("remote".to_string()),
            });
            peer.open_channel();
        }
        Ok(())
    }

    fn senders(&self) -> Vec<RtpSender> {
        lock(&self.shared.tracks)
            .iter()
            .map(|track| RtpSender {
                track: Some(track.clone()),
            })
            .collect()
    }

    fn close(&mut self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(channel) = lock(&self.shared.channel).as_ref() {
            channel.open.store(false, Ordering::SeqCst);
        }
        debug!(epoch = self.shared.sink.epoch(), "loopback peer connection closed");
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct LoopbackChannel {
    label: String,
    open: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl DataChannel for LoopbackChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send_text(&self, text: &str) -> Result<(), VoiceError> {
        if !self.is_open() {
            return Err(VoiceError::ChannelClosed);
        }
        lock(&self.sent).push(text.to_string());
        Ok(())
    }
}

/// Answers every offer locally.
#[derive(Default)]
pub struct LoopbackExchange {
    failure: Mutex<Option<VoiceError>>,
    stalled: AtomicBool,
    offers: Mutex<Vec<String>>,
}

impl LoopbackExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent exchanges fail with `error` (or succeed again with `None`).
    pub fn set_failure(&self, error: Option<VoiceError>) {
        *lock(&self.failure) = error;
    }

    /// While set, exchanges record the offer and then never answer.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn offers(&self) -> Vec<String> {
        lock(&self.offers).clone()
    }
}

#[async_trait]
impl SdpExchange for LoopbackExchange {
    async fn exchange(
        &self,
        offer: &SessionDescription,
        credential: &SessionCredential,
    ) -> Result<SessionDescription, VoiceError> {
        lock(&self.offers).push(offer.sdp.clone());
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(err) = lock(&self.failure).clone() {
            return Err(err);
        }
        debug!(token_len = credential.value().len(), "loopback answering offer");
        Ok(SessionDescription::answer(offer.sdp.replace("o=-", "o=loopback")))
    }
}

/// Mints a fixed local credential without a session backend.
#[derive(Debug, Default)]
pub struct LoopbackCredentials {
    issued: Mutex<u32>,
}

impl LoopbackCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> u32 {
        *lock(&self.issued)
    }
}

#[async_trait]
impl CredentialFetcher for LoopbackCredentials {
    async fn fetch_credential(&self) -> Result<SessionCredential, VoiceError> {
        let mut issued = lock(&self.issued);
        *issued += 1;
        Ok(SessionCredential::new(format!("ek_loopback_{}", *issued), None))
    }
}

/// Records which remote tracks are currently playing.
#[derive(Default)]
pub struct LoopbackPlayback {
    playing: Mutex<Vec<RemoteTrack>>,
    attach_count: Mutex<usize>,
}

impl LoopbackPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing(&self) -> Vec<RemoteTrack> {
        lock(&self.playing).clone()
    }

    /// Total attachments over the sink's lifetime.
    pub fn attach_count(&self) -> usize {
        *lock(&self.attach_count)
    }
}

impl PlaybackSink for LoopbackPlayback {
    fn attach(&self, track: &RemoteTrack) {
        lock(&self.playing).push(track.clone());
        *lock(&self.attach_count) += 1;
    }

    fn detach(&self, track: &RemoteTrack) {
        lock(&self.playing).retain(|playing| playing.id != track.id);
    }
}
