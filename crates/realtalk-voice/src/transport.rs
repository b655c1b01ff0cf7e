use crate::config::{IceServer, RealtimeConfig};
use crate::error::VoiceError;
use crate::media::{
    AudioConstraints, DataChannel, LocalStream, MediaKind, MediaPlatform, PeerConnection,
    PeerEventSink, PlaybackSink, RemoteTrack,
};
use crate::sdp::SdpExchange;
use realtalk_types::SessionCredential;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds a fresh [`Transport`] for each negotiation attempt.
pub struct TransportNegotiator {
    platform: Arc<dyn MediaPlatform>,
    exchange: Arc<dyn SdpExchange>,
    playback: Arc<dyn PlaybackSink>,
    ice_servers: Vec<IceServer>,
    channel_label: String,
    constraints: AudioConstraints,
}

impl TransportNegotiator {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        exchange: Arc<dyn SdpExchange>,
        playback: Arc<dyn PlaybackSink>,
        config: &RealtimeConfig,
    ) -> Self {
        Self {
            platform,
            exchange,
            playback,
            ice_servers: config.ice_servers.clone(),
            channel_label: config.data_channel_label.clone(),
            constraints: AudioConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: AudioConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Requests the microphone from the platform.
    pub async fn capture_microphone(&self) -> Result<LocalStream, VoiceError> {
        let stream = self.platform.capture_microphone(&self.constraints).await?;
        debug!(tracks = stream.tracks().len(), "microphone captured");
        Ok(stream)
    }

    /// Negotiates a new peer connection using `credential`.
    ///
    /// The credential is consumed. On failure the partially built peer
    /// connection is closed and the captured tracks are stopped before the
    /// error is returned.
    pub async fn negotiate(
        &self,
        credential: SessionCredential,
        stream: LocalStream,
        events: PeerEventSink,
    ) -> Result<Transport, VoiceError> {
        let epoch = events.epoch();
        let mut peer = match self.platform.create_peer_connection(&self.ice_servers, events) {
            Ok(peer) => peer,
            Err(e) => {
                stream.stop();
                return Err(e);
            }
        };

        let established = self.establish(peer.as_mut(), &credential, &stream).await;
        match established {
            Ok(channel) => {
                info!(epoch, label = channel.label(), "peer connection negotiated");
                Ok(Transport {
                    epoch,
                    peer,
                    channel,
                    stream,
                    playback: Arc::clone(&self.playback),
                    remote_audio: None,
                    closed: false,
                })
            }
            Err(e) => {
                warn!(epoch, error = %e, "negotiation failed, releasing peer connection");
                peer.close();
                stream.stop();
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        peer: &mut dyn PeerConnection,
        credential: &SessionCredential,
        stream: &LocalStream,
    ) -> Result<Arc<dyn DataChannel>, VoiceError> {
        for track in stream.tracks() {
            peer.add_track(track.clone())?;
            debug!(track_id = track.id(), kind = ?track.kind(), "added local track");
        }

        let channel = peer.create_data_channel(&self.channel_label)?;

        let offer = peer.create_offer().await?;
        peer.set_local_description(offer.clone()).await?;

        let answer = self.exchange.exchange(&offer, credential).await?;
        peer.set_remote_description(answer).await?;

        Ok(channel)
    }
}

/// The live transport of one negotiation epoch.
///
/// Owns the peer connection, the control channel, and the captured
/// microphone. Closing is idempotent and also happens on drop, so a
/// discarded transport never leaves the device or connection open.
pub struct Transport {
    epoch: u64,
    peer: Box<dyn PeerConnection>,
    channel: Arc<dyn DataChannel>,
    stream: LocalStream,
    playback: Arc<dyn PlaybackSink>,
    remote_audio: Option<RemoteTrack>,
    closed: bool,
}

impl Transport {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn channel(&self) -> &dyn DataChannel {
        self.channel.as_ref()
    }

    pub fn is_channel_open(&self) -> bool {
        !self.closed && self.channel.is_open()
    }

    pub fn remote_audio(&self) -> Option<&RemoteTrack> {
        self.remote_audio.as_ref()
    }

    /// Hands an inbound track to the playback sink.
    ///
    /// Only the first audio track of a negotiation is attached; later
    /// ones, and anything that is not audio, are ignored. Returns whether
    /// the track was attached.
    pub fn attach_remote_track(&mut self, track: RemoteTrack) -> bool {
        if self.closed || track.kind != MediaKind::Audio {
            return false;
        }
        if let Some(current) = &self.remote_audio {
            debug!(
                epoch = self.epoch,
                current = %current.id,
                ignored = %track.id,
                "audio track already attached"
            );
            return false;
        }
        self.playback.attach(&track);
        info!(epoch = self.epoch, track_id = %track.id, "attached remote audio track");
        self.remote_audio = Some(track);
        true
    }

    /// Enables or disables the outbound audio track without renegotiating.
    ///
    /// Returns false when the connection has no audio sender.
    pub fn set_muted(&self, muted: bool) -> bool {
        let audio = self
            .peer
            .senders()
            .into_iter()
            .filter_map(|sender| sender.track)
            .find(|track| track.kind() == MediaKind::Audio);

        match audio {
            Some(track) => {
                track.set_enabled(!muted);
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the playback track, the microphone, and the peer connection.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(track) = self.remote_audio.take() {
            self.playback.detach(&track);
        }
        self.stream.stop();
        self.peer.close();
        info!(epoch = self.epoch, "transport closed");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("epoch", &self.epoch)
            .field("channel", &self.channel.label())
            .field("remote_audio", &self.remote_audio)
            .field("closed", &self.closed)
            .finish()
    }
}
