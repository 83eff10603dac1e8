//! # Sessions
//!
//! One [`Session`] per negotiating peer. A session owns its transport
//! context, the outbound tracks attached to it and its lifecycle state.
//!
//! ## Ownership:
//! - The [`SessionRegistry`] holds the only long-lived strong reference
//!   from creation until the session closes.
//! - The transport's event listener holds a `Weak` back-reference, so a
//!   dropped session never keeps its peer connection alive.
//! - The session holds a `Weak` reference to its registry and removes itself
//!   on entering `Closed`.
//!
//! ## Closing:
//! `close()` moves the lifecycle to `Closed`, drops the session from the
//! registry, stops its tracks and closes the transport, in that order.
//! Once closed, every transport-facing call fails with
//! [`TransportError::Closed`].

pub mod lifecycle;
pub mod registry;

pub use lifecycle::{Lifecycle, SessionState, StateChange, Transition};
pub use registry::{CloseReport, SessionRegistry};

use crate::error::TransportError;
use crate::media::AudioTrack;
use crate::transport::{EventHandler, PeerTransport, SessionDescription, Transceiver, TransportEvent};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct DescriptionPair {
    pub remote: Option<SessionDescription>,
    pub local: Option<SessionDescription>,
}

pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    lifecycle: Mutex<Lifecycle>,
    descriptions: Mutex<DescriptionPair>,
    tracks: Mutex<Vec<Arc<AudioTrack>>>,
    ice_state: Mutex<Option<String>>,
    transport: Arc<dyn PeerTransport>,
    registry: Weak<SessionRegistry>,
}

/// Point-in-time view of a session for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub ice_state: Option<String>,
    pub tracks: usize,
    pub history: Vec<StateChange>,
}

impl Session {
    /// Creates a session in state `New` and subscribes it to `transport`
    /// notifications. Registration is left to the caller.
    pub fn new(transport: Arc<dyn PeerTransport>, registry: Weak<SessionRegistry>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Session>| {
            let listener = weak.clone();
            let handler: EventHandler = Arc::new(move |event| {
                if let Some(session) = listener.upgrade() {
                    session.handle_transport_event(event);
                }
            });
            transport.on_event(handler);

            Session {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                lifecycle: Mutex::new(Lifecycle::default()),
                descriptions: Mutex::new(DescriptionPair::default()),
                tracks: Mutex::new(Vec::new()),
                ice_state: Mutex::new(None),
                transport,
                registry,
            }
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state()
    }

    pub fn is_closed(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn history(&self) -> Vec<StateChange> {
        self.lifecycle.lock().history().to_vec()
    }

    pub fn descriptions(&self) -> DescriptionPair {
        self.descriptions.lock().clone()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.lock().len()
    }

    /// Latest ICE connection state reported by the transport.
    pub fn ice_state(&self) -> Option<String> {
        self.ice_state.lock().clone()
    }

    pub fn summary(&self) -> SessionSummary {
        let lifecycle = self.lifecycle.lock();
        SessionSummary {
            id: self.id,
            state: lifecycle.state(),
            created_at: self.created_at,
            ice_state: self.ice_state(),
            tracks: self.track_count(),
            history: lifecycle.history().to_vec(),
        }
    }

    /// Moves the lifecycle towards `next`, logging the outcome.
    ///
    /// Entering `Closed` this way skips cleanup; use [`Session::close`].
    pub(crate) fn advance(&self, next: SessionState) -> Transition {
        let transition = self.lifecycle.lock().apply(next);
        match transition {
            Transition::Applied { from, to } => {
                info!(session_id = %self.id, from = %from, to = %to, "Session state changed");
            }
            Transition::Rejected { from, to } => {
                warn!(session_id = %self.id, from = %from, to = %to, "Ignoring invalid session transition");
            }
            Transition::Unchanged => {
                trace!(session_id = %self.id, state = %next, "Session state unchanged");
            }
        }
        transition
    }

    fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::PeerState(peer_state) => {
                info!(session_id = %self.id, state = %peer_state, "Peer connection state changed");
                match SessionState::from_peer_state(peer_state) {
                    Some(SessionState::Closed) => {
                        let session = self.clone();
                        tokio::spawn(async move {
                            if let Err(err) = session.close().await {
                                warn!(session_id = %session.id, "Transport close failed: {}", err);
                            }
                        });
                    }
                    Some(next) => {
                        self.advance(next);
                    }
                    None => {}
                }
            }
            TransportEvent::IceConnectionState(state) => {
                info!(session_id = %self.id, ice_state = %state, "ICE connection state changed");
                *self.ice_state.lock() = Some(state);
            }
            TransportEvent::IceGatheringState(state) => {
                debug!(session_id = %self.id, gathering_state = %state, "ICE gathering state changed");
            }
            TransportEvent::LocalCandidate(candidate) => {
                debug!(session_id = %self.id, candidate = %candidate, "Gathered local ICE candidate");
            }
            TransportEvent::RemoteTrack { kind } => {
                info!(session_id = %self.id, kind = %kind, "Remote track received");
            }
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    pub async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.transport.set_remote_description(&description).await?;
        self.descriptions.lock().remote = Some(description);
        Ok(())
    }

    pub async fn attach_track(&self, track: Arc<AudioTrack>) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.transport.add_track(track.clone()).await?;
        self.tracks.lock().push(track);
        Ok(())
    }

    pub async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        self.transport.create_answer().await
    }

    pub async fn transceivers(&self) -> Result<Vec<Arc<dyn Transceiver>>, TransportError> {
        self.ensure_open()?;
        Ok(self.transport.transceivers().await)
    }

    /// Commits `description` as the local side and returns what the
    /// transport ended up with (candidates included, when it adds them).
    pub async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        self.transport.set_local_description(&description).await?;
        let committed = self
            .transport
            .local_description()
            .await
            .unwrap_or(description);
        self.descriptions.lock().local = Some(committed.clone());
        Ok(committed)
    }

    /// Closes the session. Closing an already closed session is a no-op.
    pub async fn close(&self) -> Result<(), TransportError> {
        if !matches!(self.advance(SessionState::Closed), Transition::Applied { .. }) {
            return Ok(());
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }

        let tracks: Vec<Arc<AudioTrack>> = self.tracks.lock().drain(..).collect();
        for track in &tracks {
            track.stop();
        }

        self.transport.close().await?;
        debug!(session_id = %self.id, tracks = tracks.len(), "Session resources released");
        Ok(())
    }
}
