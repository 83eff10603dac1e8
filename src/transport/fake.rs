//! In-memory transport for tests: no sockets, scripted failures, and a way
//! to push connectivity events at a session.

use super::{
    Direction, EventHandler, PeerTransport, SessionDescription, Transceiver, TransportEvent,
    TransportFactory,
};
use crate::error::TransportError;
use crate::media::AudioTrack;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const OFFER_SDP: &str = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111 0\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
a=sendrecv\r\n";

/// Failures a fake transport should simulate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeBehavior {
    pub reject_remote: bool,
    pub fail_answer: bool,
    pub fail_close: bool,
}

pub struct FakeTransceiver {
    kind: String,
    direction: Mutex<Direction>,
}

#[async_trait]
impl Transceiver for FakeTransceiver {
    fn kind(&self) -> String {
        self.kind.clone()
    }

    fn direction(&self) -> Direction {
        *self.direction.lock()
    }

    async fn set_direction(&self, direction: Direction) {
        *self.direction.lock() = direction;
    }
}

#[derive(Default)]
pub struct FakeTransport {
    behavior: FakeBehavior,
    remote: Mutex<Option<SessionDescription>>,
    local: Mutex<Option<SessionDescription>>,
    tracks: Mutex<Vec<Arc<AudioTrack>>>,
    transceivers: Mutex<Vec<Arc<FakeTransceiver>>>,
    handler: Mutex<Option<EventHandler>>,
    close_calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    /// Delivers an event to the registered listener, if any.
    pub fn emit(&self, event: TransportEvent) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.lock().len()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn transceiver_directions(&self) -> Vec<Direction> {
        self.transceivers.lock().iter().map(|t| t.direction()).collect()
    }

    pub fn has_listener(&self) -> bool {
        self.handler.lock().is_some()
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn set_remote_description(&self, description: &SessionDescription) -> Result<(), TransportError> {
        if self.behavior.reject_remote || !description.sdp.starts_with("v=0") {
            return Err(TransportError::Rejected("malformed session description".to_string()));
        }

        let transceivers = description
            .sdp
            .lines()
            .filter_map(|line| line.strip_prefix("m="))
            .map(|media| {
                Arc::new(FakeTransceiver {
                    kind: media.split_whitespace().next().unwrap_or("audio").to_string(),
                    direction: Mutex::new(Direction::Unspecified),
                })
            })
            .collect();

        *self.transceivers.lock() = transceivers;
        *self.remote.lock() = Some(description.clone());
        Ok(())
    }

    async fn add_track(&self, track: Arc<AudioTrack>) -> Result<(), TransportError> {
        let mut transceivers = self.transceivers.lock();
        match transceivers.iter().find(|t| t.kind == "audio") {
            Some(audio) => *audio.direction.lock() = Direction::SendRecv,
            None => transceivers.push(Arc::new(FakeTransceiver {
                kind: "audio".to_string(),
                direction: Mutex::new(Direction::SendOnly),
            })),
        }
        self.tracks.lock().push(track);
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        if self.behavior.fail_answer {
            return Err(TransportError::Rejected("no codecs in common".to_string()));
        }

        let mut sdp = String::from("v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n");
        for (mid, transceiver) in self.transceivers.lock().iter().enumerate() {
            sdp.push_str(&format!("m={} 9 UDP/TLS/RTP/SAVPF 0\r\n", transceiver.kind));
            sdp.push_str("c=IN IP4 0.0.0.0\r\n");
            sdp.push_str(&format!("a=mid:{}\r\n", mid));
            if let Some(attribute) = transceiver.direction().as_attribute() {
                sdp.push_str(&format!("a={}\r\n", attribute));
            }
        }
        Ok(SessionDescription::answer(sdp))
    }

    async fn transceivers(&self) -> Vec<Arc<dyn Transceiver>> {
        self.transceivers
            .lock()
            .iter()
            .map(|t| t.clone() as Arc<dyn Transceiver>)
            .collect()
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<(), TransportError> {
        if self.close_calls() > 0 {
            return Err(TransportError::Closed);
        }
        *self.local.lock() = Some(description.clone());
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    fn on_event(&self, handler: EventHandler) {
        *self.handler.lock() = Some(handler);
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_close {
            return Err(TransportError::Rejected("close failed".to_string()));
        }
        Ok(())
    }
}

/// Hands out [`FakeTransport`]s and remembers them for later inspection.
#[derive(Default)]
pub struct FakeTransportFactory {
    behavior: FakeBehavior,
    fail_create: bool,
    created: Mutex<Vec<Arc<FakeTransport>>>,
}

impl FakeTransportFactory {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Default::default()
        }
    }

    pub fn created(&self) -> Vec<Arc<FakeTransport>> {
        self.created.lock().clone()
    }

    pub fn last(&self) -> Option<Arc<FakeTransport>> {
        self.created.lock().last().cloned()
    }
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(&self) -> Result<Arc<dyn PeerTransport>, TransportError> {
        if self.fail_create {
            return Err(TransportError::Rejected("peer connection limit reached".to_string()));
        }
        let transport = Arc::new(FakeTransport::new(self.behavior));
        self.created.lock().push(transport.clone());
        Ok(transport)
    }
}
