//! # WebSocket Timestamp Stream
//!
//! Duplex endpoint at `/ws`. Every open connection joins the broadcaster's
//! connection set and receives timestamp messages until it closes.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: Client connects; the stream starts immediately
//! 2. **Start request**: `{"action": "start_stream"}` is accepted but
//!    changes nothing, since streaming is already running
//! 3. **Timestamps**: Server pushes `{"type": "timestamp", ...}` at the
//!    configured tick interval
//! 4. **Keep-alive**: Server pings every 30 seconds and closes connections
//!    silent for 60 seconds
//!
//! A connection whose mailbox is gone or full is dropped by the
//! broadcaster; the client just sees the socket close.

use crate::broadcast::{ConnectionSet, TickSink};
use crate::error::DeliveryError;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Messages a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    StartStream,
}

/// One broadcast payload for a connection's actor.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendText(pub String);

/// Hands broadcast payloads to a connection actor's mailbox.
pub struct ActorSink(Recipient<SendText>);

impl TickSink for ActorSink {
    fn deliver(&self, payload: String) -> Result<(), DeliveryError> {
        self.0.try_send(SendText(payload)).map_err(|err| match err {
            SendError::Full(_) => DeliveryError::Backpressure,
            SendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// WebSocket actor for one timestamp stream subscriber.
pub struct TickerSocket {
    id: Uuid,
    connections: Arc<ConnectionSet>,
    last_heartbeat: Instant,
}

impl TickerSocket {
    pub fn new(connections: Arc<ConnectionSet>) -> Self {
        Self {
            id: Uuid::new_v4(),
            connections,
            last_heartbeat: Instant::now(),
        }
    }

    fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::StartStream) => {
                debug!(connection_id = %self.id, "Client requested stream start");
            }
            Err(err) => {
                warn!(connection_id = %self.id, "Ignoring unrecognised message: {}", err);
            }
        }
    }
}

impl Actor for TickerSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(connection_id = %self.id, "WebSocket connection started");
        let sink = Arc::new(ActorSink(ctx.address().recipient()));
        self.connections.open(self.id, sink);

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(connection_id = %act.id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.connections.close(&self.id);
        info!(connection_id = %self.id, "WebSocket connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TickerSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text);
            }
            Ok(ws::Message::Binary(data)) => {
                warn!(connection_id = %self.id, bytes = data.len(), "Ignoring binary frame");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(connection_id = %self.id, "WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(connection_id = %self.id, "Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(connection_id = %self.id, "WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<SendText> for TickerSocket {
    type Result = ();

    fn handle(&mut self, msg: SendText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

/// Upgrades `GET /ws` to a timestamp stream.
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    debug!("WebSocket upgrade from {:?}", req.connection_info().peer_addr());
    ws::start(TickerSocket::new(state.connections.clone()), &req, stream)
}
