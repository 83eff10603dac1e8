//! # Negotiation Engine
//!
//! Serves `POST /offer`: turns a remote offer into a committed local answer
//! for a fresh session.
//!
//! ## Steps (strictly in this order):
//! 1. Create a transport and a session, register it, enter `Negotiating`
//! 2. Apply the remote offer (before any media, so per-line directions
//!    follow what the peer offered)
//! 3. Open the audio asset and attach one outbound track; a missing or
//!    unreadable asset only means the session runs without audio
//! 4. Create the answer
//! 5. Default every unset direction to `recvonly`, on the transceivers
//!    and in the answer text
//! 6. Commit the answer as the local description
//! 7. Hand the committed description back
//!
//! `Connected` is not set here; the transport reports it later. Any
//! failure after step 1 closes the session before the error is returned.

use crate::error::{NegotiationError, NegotiationStage, TransportError};
use crate::media::MediaSource;
use crate::session::{Session, SessionRegistry, SessionState};
use crate::transport::sdp::default_unset_directions;
use crate::transport::{Direction, SdpType, SessionDescription, TransportFactory};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct NegotiationEngine {
    registry: Arc<SessionRegistry>,
    transports: Arc<dyn TransportFactory>,
    media: MediaSource,
}

impl NegotiationEngine {
    pub fn new(
        registry: Arc<SessionRegistry>,
        transports: Arc<dyn TransportFactory>,
        media: MediaSource,
    ) -> Self {
        Self {
            registry,
            transports,
            media,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn handle_offer(&self, offer: SessionDescription) -> Result<SessionDescription, NegotiationError> {
        if offer.sdp_type != SdpType::Offer {
            return Err(NegotiationError::new(
                NegotiationStage::ValidateOffer,
                TransportError::Rejected(format!("expected an offer, got {}", offer.sdp_type)),
            ));
        }

        let transport = self
            .transports
            .create()
            .await
            .map_err(NegotiationError::at(NegotiationStage::CreateTransport))?;
        let session = self.registry.register(transport);
        session.advance(SessionState::Negotiating);
        info!(session_id = %session.id(), "Negotiating new session");

        match self.negotiate(&session, offer).await {
            Ok(answer) => {
                info!(
                    session_id = %session.id(),
                    tracks = session.track_count(),
                    "Answer committed"
                );
                Ok(answer)
            }
            Err(err) => {
                warn!(session_id = %session.id(), "Negotiation failed: {}", err);
                if let Err(close_err) = session.close().await {
                    warn!(session_id = %session.id(), "Teardown after failed negotiation: {}", close_err);
                }
                Err(err)
            }
        }
    }

    async fn negotiate(
        &self,
        session: &Arc<Session>,
        offer: SessionDescription,
    ) -> Result<SessionDescription, NegotiationError> {
        use NegotiationStage::*;

        session
            .set_remote_description(offer)
            .await
            .map_err(NegotiationError::at(ApplyRemoteDescription))?;

        match self.media.open() {
            Ok(stream) => {
                debug!(session_id = %session.id(), source = %stream.path().display(), "Attaching audio track");
                let track = stream.into_audio_track(&session.id().to_string());
                session
                    .attach_track(track)
                    .await
                    .map_err(NegotiationError::at(AttachTrack))?;
            }
            Err(err) => {
                warn!(session_id = %session.id(), "Continuing without audio: {}", err);
            }
        }

        let answer = session
            .create_answer()
            .await
            .map_err(NegotiationError::at(CreateAnswer))?;

        let transceivers = session
            .transceivers()
            .await
            .map_err(NegotiationError::at(CreateAnswer))?;
        for transceiver in transceivers {
            if transceiver.direction() == Direction::Unspecified {
                transceiver.set_direction(Direction::RecvOnly).await;
            }
        }
        let (sdp, defaulted) = default_unset_directions(&answer.sdp, Direction::RecvOnly);
        if defaulted > 0 {
            debug!(session_id = %session.id(), sections = defaulted, "Defaulted unset directions to recvonly");
        }

        session
            .set_local_description(SessionDescription::answer(sdp))
            .await
            .map_err(NegotiationError::at(ApplyLocalDescription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_support::{short_tone, write_wav};
    use crate::transport::fake::{FakeBehavior, FakeTransportFactory, OFFER_SDP};
    use crate::transport::sdp::media_directions;
    use crate::transport::{PeerConnectionState, TransportEvent};
    use std::path::Path;
    use std::time::Duration;

    fn engine(dir: &Path, factory: Arc<FakeTransportFactory>) -> NegotiationEngine {
        let media = MediaSource::new(
            vec![dir.join("audio.wav"), dir.join("audio.mp3")],
            Duration::from_millis(20),
        );
        NegotiationEngine::new(Arc::new(SessionRegistry::new()), factory, media)
    }

    #[tokio::test]
    async fn test_offer_without_asset_answers_with_no_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(FakeTransportFactory::default());
        let engine = engine(dir.path(), factory.clone());

        let answer = engine.handle_offer(SessionDescription::offer(OFFER_SDP)).await.unwrap();

        assert_eq!(answer.sdp_type, SdpType::Answer);
        assert_eq!(media_directions(&answer.sdp), vec![Direction::RecvOnly]);

        let transport = factory.last().unwrap();
        assert_eq!(transport.track_count(), 0);
        assert_eq!(transport.transceiver_directions(), vec![Direction::RecvOnly]);

        let sessions = engine.registry().snapshot();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].track_count(), 0);
        assert_eq!(sessions[0].state(), SessionState::Negotiating);
        assert!(sessions[0].descriptions().local.is_some());
    }

    #[tokio::test]
    async fn test_offer_with_asset_attaches_one_track() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("audio.wav"), 16000, &short_tone());
        let factory = Arc::new(FakeTransportFactory::default());
        let engine = engine(dir.path(), factory.clone());

        let answer = engine.handle_offer(SessionDescription::offer(OFFER_SDP)).await.unwrap();

        assert_eq!(factory.last().unwrap().track_count(), 1);
        assert_eq!(media_directions(&answer.sdp), vec![Direction::SendRecv]);
        assert_eq!(engine.registry().snapshot()[0].track_count(), 1);

        engine.registry().close_all().await;
    }

    #[tokio::test]
    async fn test_malformed_offer_leaves_no_session_behind() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(FakeTransportFactory::default());
        let engine = engine(dir.path(), factory.clone());

        let err = engine
            .handle_offer(SessionDescription::offer("this is not sdp"))
            .await
            .unwrap_err();

        assert_eq!(err.stage, NegotiationStage::ApplyRemoteDescription);
        assert!(engine.registry().is_empty());
        assert_eq!(factory.last().unwrap().close_calls(), 1);
    }

    #[tokio::test]
    async fn test_answer_failure_tears_down_session() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(FakeTransportFactory::new(FakeBehavior {
            fail_answer: true,
            ..Default::default()
        }));
        let engine = engine(dir.path(), factory.clone());

        let err = engine.handle_offer(SessionDescription::offer(OFFER_SDP)).await.unwrap_err();

        assert_eq!(err.stage, NegotiationStage::CreateAnswer);
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_non_offer_is_rejected_before_any_session_exists() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(FakeTransportFactory::default());
        let engine = engine(dir.path(), factory.clone());

        let err = engine
            .handle_offer(SessionDescription::answer(OFFER_SDP))
            .await
            .unwrap_err();

        assert_eq!(err.stage, NegotiationStage::ValidateOffer);
        assert!(factory.created().is_empty());
    }

    #[tokio::test]
    async fn test_transport_creation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), Arc::new(FakeTransportFactory::failing()));

        let err = engine.handle_offer(SessionDescription::offer(OFFER_SDP)).await.unwrap_err();

        assert_eq!(err.stage, NegotiationStage::CreateTransport);
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_connected_only_after_transport_reports_it() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(FakeTransportFactory::default());
        let engine = engine(dir.path(), factory.clone());

        engine.handle_offer(SessionDescription::offer(OFFER_SDP)).await.unwrap();
        let session = engine.registry().snapshot().remove(0);
        assert_eq!(session.state(), SessionState::Negotiating);

        factory
            .last()
            .unwrap()
            .emit(TransportEvent::PeerState(PeerConnectionState::Connected));
        assert_eq!(session.state(), SessionState::Connected);

        let visited: Vec<SessionState> = session.history().iter().map(|c| c.state).collect();
        assert_eq!(
            visited,
            vec![SessionState::New, SessionState::Negotiating, SessionState::Connected]
        );
    }
}
