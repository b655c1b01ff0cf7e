//! Voice transport for realtalk.
//!
//! Fetches the short-lived session credential, negotiates the peer
//! connection with the realtime endpoint (offer/answer over HTTP), and owns
//! the resulting [`Transport`]: one peer connection, one control data
//! channel, the captured microphone tracks, and at most one inbound audio
//! track handed to a playback sink.
//!
//! The platform media stack (capture, ICE, codecs, playback) sits behind
//! the [`MediaPlatform`] trait. [`loopback::LoopbackPlatform`] is an
//! in-process implementation for headless runs and tests.

pub mod config;
pub mod credential;
pub mod error;
pub mod loopback;
pub mod media;
pub mod sdp;
pub mod transport;

pub use config::{IceServer, RealtimeConfig};
pub use credential::{CredentialFetcher, HttpCredentialFetcher};
pub use error::VoiceError;
pub use media::{
    AudioConstraints, DataChannel, IceConnectionState, LocalStream, LocalTrack, MediaKind,
    MediaPlatform, PeerConnection, PeerEvent, PeerEventSink, PlaybackSink, RemoteTrack,
    RtpSender, SdpKind, SessionDescription, TransportEvent,
};
pub use sdp::{HttpSdpExchange, SdpExchange};
pub use transport::{Transport, TransportNegotiator};
