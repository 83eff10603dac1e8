//! webrtc-rs backed [`PeerTransport`].
//!
//! One `RTCPeerConnection` per negotiated session. ICE gathering is run to
//! completion before the local description is handed back, so answers carry
//! their candidates and the browser needs no trickle channel.

use super::{
    Direction, EventHandler, PeerConnectionState, PeerTransport, SdpType, SessionDescription,
    Transceiver, TransportEvent, TransportFactory,
};
use crate::config::WebRtcConfig;
use crate::error::TransportError;
use crate::media::AudioTrack;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Builds peer connections sharing one media engine and interceptor set.
pub struct WebRtcTransportFactory {
    api: API,
    ice_servers: Vec<String>,
}

impl WebRtcTransportFactory {
    pub fn new(config: &WebRtcConfig) -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            ice_servers: config.ice_servers.clone(),
        })
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(&self) -> Result<Arc<dyn PeerTransport>, TransportError> {
        let pc = self.api.new_peer_connection(self.rtc_configuration()).await?;
        Ok(Arc::new(WebRtcTransport { pc: Arc::new(pc) }))
    }
}

pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn set_remote_description(&self, description: &SessionDescription) -> Result<(), TransportError> {
        let description = to_rtc_description(description)?;
        self.pc.set_remote_description(description).await?;
        Ok(())
    }

    async fn add_track(&self, track: Arc<AudioTrack>) -> Result<(), TransportError> {
        let local = track.local() as Arc<dyn TrackLocal + Send + Sync>;
        let sender = self.pc.add_track(local).await?;

        // Incoming RTCP must be read for interceptors (NACK, reports) to run.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
            trace!("RTCP reader finished");
        });

        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self.pc.create_answer(None).await?;
        from_rtc_description(&answer)
    }

    async fn transceivers(&self) -> Vec<Arc<dyn Transceiver>> {
        self.pc
            .get_transceivers()
            .await
            .into_iter()
            .map(|t| Arc::new(WebRtcTransceiver(t)) as Arc<dyn Transceiver>)
            .collect()
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<(), TransportError> {
        let description = to_rtc_description(description)?;
        let mut gather_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(description).await?;
        let _ = gather_complete.recv().await;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let description = self.pc.local_description().await?;
        from_rtc_description(&description).ok()
    }

    fn on_event(&self, handler: EventHandler) {
        let on_state = handler.clone();
        self.pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            if let Some(state) = map_peer_state(state) {
                on_state(TransportEvent::PeerState(state));
            }
            Box::pin(async {})
        }));

        let on_ice = handler.clone();
        self.pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            on_ice(TransportEvent::IceConnectionState(state.to_string()));
            Box::pin(async {})
        }));

        let on_gathering = handler.clone();
        self.pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            on_gathering(TransportEvent::IceGatheringState(state.to_string()));
            Box::pin(async {})
        }));

        let on_candidate = handler.clone();
        self.pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(candidate) = candidate {
                if let Ok(init) = candidate.to_json() {
                    on_candidate(TransportEvent::LocalCandidate(init.candidate));
                }
            }
            Box::pin(async {})
        }));

        let on_track = handler;
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
                on_track(TransportEvent::RemoteTrack {
                    kind: track.kind().to_string(),
                });
                Box::pin(async {})
            },
        ));
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc.close().await?;
        Ok(())
    }
}

struct WebRtcTransceiver(Arc<RTCRtpTransceiver>);

#[async_trait]
impl Transceiver for WebRtcTransceiver {
    fn kind(&self) -> String {
        self.0.kind().to_string()
    }

    fn direction(&self) -> Direction {
        match self.0.direction() {
            RTCRtpTransceiverDirection::Sendrecv => Direction::SendRecv,
            RTCRtpTransceiverDirection::Sendonly => Direction::SendOnly,
            RTCRtpTransceiverDirection::Recvonly => Direction::RecvOnly,
            RTCRtpTransceiverDirection::Inactive => Direction::Inactive,
            RTCRtpTransceiverDirection::Unspecified => Direction::Unspecified,
        }
    }

    async fn set_direction(&self, direction: Direction) {
        debug!(kind = %self.kind(), direction = %direction, "Setting transceiver direction");
        let direction = match direction {
            Direction::SendRecv => RTCRtpTransceiverDirection::Sendrecv,
            Direction::SendOnly => RTCRtpTransceiverDirection::Sendonly,
            Direction::RecvOnly => RTCRtpTransceiverDirection::Recvonly,
            Direction::Inactive => RTCRtpTransceiverDirection::Inactive,
            Direction::Unspecified => RTCRtpTransceiverDirection::Unspecified,
        };
        self.0.set_direction(direction).await;
    }
}

fn map_peer_state(state: RTCPeerConnectionState) -> Option<PeerConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(PeerConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(PeerConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(PeerConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(PeerConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(PeerConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(PeerConnectionState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

fn to_rtc_description(description: &SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let sdp = description.sdp.clone();
    let description = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp)?,
        SdpType::Rollback => {
            return Err(TransportError::Rejected(
                "rollback descriptions are not supported".to_string(),
            ))
        }
    };
    Ok(description)
}

fn from_rtc_description(description: &RTCSessionDescription) -> Result<SessionDescription, TransportError> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(TransportError::Rejected(
                "transport produced a description without a type".to_string(),
            ))
        }
    };
    Ok(SessionDescription {
        sdp: description.sdp.clone(),
        sdp_type,
    })
}
