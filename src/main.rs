//! # Audio Relay Server
//!
//! WebRTC signaling endpoint that answers browser offers with a looping
//! audio track, plus a WebSocket timestamp stream.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, config.toml, environment)
//! - **transport**: the peer connection interface and its webrtc-rs backend
//! - **media**: audio asset lookup, decoding and PCMU track pumping
//! - **session**: per-peer lifecycle state machine and the session registry
//! - **signaling**: the offer/answer negotiation engine
//! - **broadcast** / **websocket**: timestamp fan-out to `/ws` clients
//! - **handlers** / **health**: the HTTP surface
//!
//! ## Shutdown:
//! SIGINT/SIGTERM pause the HTTP server, stop the broadcaster, close every
//! live session and wait for all of them, then stop the server.

mod broadcast;
mod config;
mod error;
mod handlers;
mod health;
mod media;
mod session;
mod signaling;
mod state;
mod transport;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use broadcast::Broadcaster;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::WebRtcTransportFactory;

/// Set once SIGINT or SIGTERM arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting audio-relay-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let media_candidates = config.media.candidates();
    if !media_candidates.iter().any(|path| path.is_file()) {
        warn!(
            "No audio asset found at {:?}; sessions will be answered without audio",
            media_candidates
        );
    }

    let transports = Arc::new(WebRtcTransportFactory::new(&config.webrtc)?);
    let app_state = AppState::new(config.clone(), transports);
    let bind_addr = config.bind_addr();

    let broadcaster = Arc::new(Broadcaster::new(app_state.connections.clone(), &config.broadcast));
    let broadcast_task = tokio::spawn(broadcaster.run());

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server_state = app_state.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(server_state.clone()))
            .app_data(handlers::json_config())
            .wrap(cors)
            .wrap(TracingLogger::default())
            .configure(handlers::configure)
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
            broadcast_task.abort();
            close_sessions(&app_state).await;
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            // Sessions run on worker runtimes and must close before the workers stop.
            server_handle.pause().await;
            broadcast_task.abort();
            close_sessions(&app_state).await;
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

async fn close_sessions(state: &AppState) {
    let report = state.registry.close_all().await;
    info!(
        closed = report.closed,
        failed = report.failures.len(),
        "All sessions closed"
    );
}

/// Structured logging; `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_relay_server=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn setup_signal_handlers() {
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
