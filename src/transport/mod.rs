//! # Real-time Transport
//!
//! The interface the relay needs from a real-time session library, plus a
//! production implementation on top of webrtc-rs.
//!
//! ## What the rest of the crate consumes:
//! - **set_remote_description / create_answer / set_local_description**:
//!   the offer/answer exchange
//! - **add_track**: attach an outbound audio track
//! - **transceivers**: media lines with a mutable negotiated direction
//! - **on_event**: connectivity notifications driving the session lifecycle
//! - **close**: release the peer connection

pub mod sdp;
pub mod peer_connection;

#[cfg(test)]
pub mod fake;

use crate::error::TransportError;
use crate::media::AudioTrack;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use self::peer_connection::WebRtcTransportFactory;

/// Kind of a session description in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Pranswer => "pranswer",
            SdpType::Answer => "answer",
            SdpType::Rollback => "rollback",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An SDP payload and its type. Also the JSON shape of `POST /offer`
/// requests and responses: `{"sdp": "...", "type": "offer"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp: sdp.into(), sdp_type: SdpType::Offer }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp: sdp.into(), sdp_type: SdpType::Answer }
    }
}

/// Negotiated send/receive direction of one media line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
    Unspecified,
}

impl Direction {
    /// The SDP attribute name (`sendrecv`, ...); `None` when unspecified.
    pub fn as_attribute(&self) -> Option<&'static str> {
        match self {
            Direction::SendRecv => Some("sendrecv"),
            Direction::SendOnly => Some("sendonly"),
            Direction::RecvOnly => Some("recvonly"),
            Direction::Inactive => Some("inactive"),
            Direction::Unspecified => None,
        }
    }

    pub fn from_attribute(attribute: &str) -> Option<Self> {
        match attribute {
            "sendrecv" => Some(Direction::SendRecv),
            "sendonly" => Some(Direction::SendOnly),
            "recvonly" => Some(Direction::RecvOnly),
            "inactive" => Some(Direction::Inactive),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_attribute().unwrap_or("unspecified"))
    }
}

/// Aggregate connectivity state reported by the peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            PeerConnectionState::New => "new",
            PeerConnectionState::Connecting => "connecting",
            PeerConnectionState::Connected => "connected",
            PeerConnectionState::Disconnected => "disconnected",
            PeerConnectionState::Failed => "failed",
            PeerConnectionState::Closed => "closed",
        };
        f.write_str(state)
    }
}

/// Notifications delivered by a transport after `on_event` registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    PeerState(PeerConnectionState),
    IceConnectionState(String),
    IceGatheringState(String),
    LocalCandidate(String),
    RemoteTrack { kind: String },
}

pub type EventHandler = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// One negotiated media line.
#[async_trait]
pub trait Transceiver: Send + Sync {
    /// Media kind, e.g. `audio`
    fn kind(&self) -> String;

    fn direction(&self) -> Direction;

    async fn set_direction(&self, direction: Direction);
}

/// The per-peer transport context a session negotiates through.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn set_remote_description(&self, description: &SessionDescription) -> Result<(), TransportError>;

    async fn add_track(&self, track: Arc<AudioTrack>) -> Result<(), TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn transceivers(&self) -> Vec<Arc<dyn Transceiver>>;

    async fn set_local_description(&self, description: &SessionDescription) -> Result<(), TransportError>;

    /// The committed local description, including gathered candidates.
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Registers the single connectivity listener; a later call replaces it.
    fn on_event(&self, handler: EventHandler);

    async fn close(&self) -> Result<(), TransportError>;
}

/// Creates a fresh transport context for every inbound offer.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn PeerTransport>, TransportError>;
}
