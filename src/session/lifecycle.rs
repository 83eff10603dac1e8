//! # Session Lifecycle
//!
//! Explicit state machine for one session's connectivity.
//!
//! ## Transition Table:
//! ```text
//! New          -> Negotiating | Closed
//! Negotiating  -> Connected | Closed
//! Connected    -> Disconnected | Closed
//! Disconnected -> Connected | Closed
//! Closed       -> (terminal)
//! ```
//!
//! Transitions are fed by transport notifications (see
//! [`SessionState::from_peer_state`]) and by explicit `close()` calls.

use crate::transport::PeerConnectionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    New,
    Negotiating,
    Connected,
    Disconnected,
    Closed,
}

impl SessionState {
    pub const ALL: [SessionState; 5] = [
        SessionState::New,
        SessionState::Negotiating,
        SessionState::Connected,
        SessionState::Disconnected,
        SessionState::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::New => "new",
            SessionState::Negotiating => "negotiating",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (New, Negotiating)
                | (Negotiating, Connected)
                | (Connected, Disconnected)
                | (Disconnected, Connected)
                | (New | Negotiating | Connected | Disconnected, Closed)
        )
    }

    /// Lifecycle state implied by a peer connection state.
    ///
    /// `New` and `Connecting` say nothing new about a negotiating session
    /// and map to `None`. A failed transport is as good as closed.
    pub fn from_peer_state(state: PeerConnectionState) -> Option<SessionState> {
        match state {
            PeerConnectionState::New | PeerConnectionState::Connecting => None,
            PeerConnectionState::Connected => Some(SessionState::Connected),
            PeerConnectionState::Disconnected => Some(SessionState::Disconnected),
            PeerConnectionState::Failed | PeerConnectionState::Closed => Some(SessionState::Closed),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of asking the state machine to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: SessionState, to: SessionState },
    /// Already in the requested state.
    Unchanged,
    Rejected { from: SessionState, to: SessionState },
}

#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub state: SessionState,
    pub at: DateTime<Utc>,
}

/// Current state plus every state visited, oldest first.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: SessionState,
    history: Vec<StateChange>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: SessionState::New,
            history: vec![StateChange {
                state: SessionState::New,
                at: Utc::now(),
            }],
        }
    }
}

impl Lifecycle {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    pub fn apply(&mut self, next: SessionState) -> Transition {
        let from = self.state;
        if from == next {
            return Transition::Unchanged;
        }
        if !from.can_transition_to(next) {
            return Transition::Rejected { from, to: next };
        }

        self.state = next;
        self.history.push(StateChange {
            state: next,
            at: Utc::now(),
        });
        Transition::Applied { from, to: next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn test_happy_path_with_reconnect() {
        let mut lifecycle = Lifecycle::default();
        for next in [Negotiating, Connected, Disconnected, Connected, Closed] {
            assert!(matches!(lifecycle.apply(next), Transition::Applied { to, .. } if to == next));
        }

        let visited: Vec<SessionState> = lifecycle.history().iter().map(|c| c.state).collect();
        assert_eq!(visited, vec![New, Negotiating, Connected, Disconnected, Connected, Closed]);
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut lifecycle = Lifecycle::default();
        lifecycle.apply(Closed);

        assert_eq!(lifecycle.apply(Closed), Transition::Unchanged);
        for next in [New, Negotiating, Connected, Disconnected] {
            assert_eq!(
                lifecycle.apply(next),
                Transition::Rejected { from: Closed, to: next }
            );
        }
        assert_eq!(lifecycle.history().len(), 2);
    }

    #[test]
    fn test_skipping_negotiation_is_rejected() {
        let mut lifecycle = Lifecycle::default();
        assert_eq!(
            lifecycle.apply(Connected),
            Transition::Rejected { from: New, to: Connected }
        );

        lifecycle.apply(Negotiating);
        assert_eq!(
            lifecycle.apply(Disconnected),
            Transition::Rejected { from: Negotiating, to: Disconnected }
        );
        assert_eq!(lifecycle.state(), Negotiating);
    }

    #[test]
    fn test_every_state_can_close() {
        for state in [New, Negotiating, Connected, Disconnected] {
            assert!(state.can_transition_to(Closed), "{} should close", state);
        }
        assert!(Closed.is_terminal());
    }

    #[test]
    fn test_peer_state_mapping() {
        assert_eq!(SessionState::from_peer_state(PeerConnectionState::Connecting), None);
        assert_eq!(
            SessionState::from_peer_state(PeerConnectionState::Connected),
            Some(Connected)
        );
        assert_eq!(
            SessionState::from_peer_state(PeerConnectionState::Disconnected),
            Some(Disconnected)
        );
        assert_eq!(SessionState::from_peer_state(PeerConnectionState::Failed), Some(Closed));
        assert_eq!(SessionState::from_peer_state(PeerConnectionState::Closed), Some(Closed));
    }
}
