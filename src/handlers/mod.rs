//! # HTTP Handlers
//!
//! ## Routes:
//! - `GET /`: the client page
//! - `POST /offer`: WebRTC offer in, answer out
//! - `GET /static/{file}`: files next to the client page
//! - `GET /ws`: timestamp stream (WebSocket upgrade)
//! - `GET /health`: liveness and session overview

pub mod pages;
pub mod signaling;

use crate::error::AppError;
use crate::{health, websocket};
use actix_web::web;

/// Offer payloads are a few kilobytes of SDP.
const MAX_JSON_BODY: usize = 256 * 1024;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(pages::index))
        .route("/offer", web::post().to(signaling::offer))
        .route("/static/{file}", web::get().to(pages::static_asset))
        .route("/ws", web::get().to(websocket::ws_index))
        .route("/health", web::get().to(health::health_check));
}

/// JSON extractor settings. The only JSON body is the offer, so an
/// unreadable one fails like any other offer: `500 {"error": ...}`.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_JSON_BODY)
        .error_handler(|err, _req| AppError::InvalidOffer(err.to_string()).into())
}
