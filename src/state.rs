//! # Application State
//!
//! Everything HTTP handlers and WebSocket actors share. All fields are
//! `Arc`s, so cloning the state per worker is cheap and every worker sees
//! the same registry and connection set.
//!
//! ## Shared Components:
//! - **registry**: live WebRTC sessions
//! - **connections**: open `/ws` connections fed by the broadcaster
//! - **negotiator**: the offer/answer engine behind `POST /offer`

use crate::broadcast::ConnectionSet;
use crate::config::AppConfig;
use crate::media::MediaSource;
use crate::session::SessionRegistry;
use crate::signaling::NegotiationEngine;
use crate::transport::TransportFactory;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Configuration is read-only once the server is up
    pub config: Arc<AppConfig>,
    pub registry: Arc<SessionRegistry>,
    pub connections: Arc<ConnectionSet>,
    pub negotiator: Arc<NegotiationEngine>,
    /// When the server started
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, transports: Arc<dyn TransportFactory>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let media = MediaSource::from_config(&config.media);
        let negotiator = Arc::new(NegotiationEngine::new(registry.clone(), transports, media));

        Self {
            config: Arc::new(config),
            registry,
            connections: Arc::new(ConnectionSet::new()),
            negotiator,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
