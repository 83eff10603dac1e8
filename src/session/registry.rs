//! Process-wide set of live sessions.
//!
//! A session is present from registration until it enters `Closed`; it is
//! never present twice. Iteration (`snapshot`, `close_all`) works on a copy
//! taken under the lock, so concurrent removals cannot disturb it.

use super::{Session, SessionState};
use crate::error::TransportError;
use crate::transport::PeerTransport;
use futures_util::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

/// Outcome of [`SessionRegistry::close_all`].
#[derive(Debug, Default)]
pub struct CloseReport {
    pub closed: usize,
    pub failures: Vec<(Uuid, TransportError)>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session over `transport` and registers it.
    pub fn register(self: &Arc<Self>, transport: Arc<dyn PeerTransport>) -> Arc<Session> {
        let session = Session::new(transport, Arc::downgrade(self));
        self.add(session.clone());
        session
    }

    /// Returns false when the session is already present or already closed.
    pub fn add(&self, session: Arc<Session>) -> bool {
        if session.is_closed() {
            return false;
        }
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id()) {
            return false;
        }
        sessions.insert(session.id(), session);
        true
    }

    /// Removing an absent session is a no-op.
    pub fn remove(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Number of live sessions in each state (zero counts included).
    pub fn state_counts(&self) -> HashMap<SessionState, usize> {
        let mut counts: HashMap<SessionState, usize> =
            SessionState::ALL.iter().map(|state| (*state, 0)).collect();
        for session in self.snapshot() {
            *counts.entry(session.state()).or_default() += 1;
        }
        counts
    }

    /// Closes every live session concurrently and waits for all of them.
    ///
    /// A failing close is recorded in the report; the remaining sessions are
    /// still closed.
    pub async fn close_all(&self) -> CloseReport {
        let sessions = self.snapshot();
        info!(count = sessions.len(), "Closing all sessions");

        let results = join_all(sessions.iter().map(|session| async move {
            (session.id(), session.close().await)
        }))
        .await;

        let mut report = CloseReport::default();
        for (id, result) in results {
            report.closed += 1;
            if let Err(err) = result {
                warn!(session_id = %id, "Session did not close cleanly: {}", err);
                report.failures.push((id, err));
            }
        }
        report
    }
}
