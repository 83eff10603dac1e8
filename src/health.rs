//! # Health Check
//!
//! `GET /health` reports liveness plus a snapshot of what the relay is
//! currently serving.
//!
//! ## Response Format:
//! ```json
//! {
//!   "status": "healthy",
//!   "timestamp": "2024-05-01T12:00:00Z",
//!   "uptime_seconds": 3600,
//!   "service": { "name": "audio-relay-server", "version": "0.1.0" },
//!   "sessions": { "total": 2, "by_state": { "connected": 2, ... }, "live": [...] },
//!   "connections": { "open": 1 }
//! }
//! ```

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::{json, Map, Value};

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let by_state: Map<String, Value> = state
        .registry
        .state_counts()
        .into_iter()
        .map(|(session_state, count)| (session_state.as_str().to_string(), json!(count)))
        .collect();
    let live: Vec<Value> = state
        .registry
        .snapshot()
        .iter()
        .map(|session| json!(session.summary()))
        .collect();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": state.config.server.host,
            "port": state.config.server.port
        },
        "sessions": {
            "total": state.registry.len(),
            "by_state": by_state,
            "live": live
        },
        "connections": {
            "open": state.connections.len()
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::transport::fake::FakeTransportFactory;
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_health_reports_sessions_and_connections() {
        let state = AppState::new(AppConfig::default(), Arc::new(FakeTransportFactory::default()));
        state.registry.register(Arc::new(crate::transport::fake::FakeTransport::default()));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"]["name"], "audio-relay-server");
        assert_eq!(body["sessions"]["total"], 1);
        assert_eq!(body["sessions"]["by_state"]["new"], 1);
        assert_eq!(body["sessions"]["by_state"]["closed"], 0);
        assert_eq!(body["connections"]["open"], 0);
    }
}
