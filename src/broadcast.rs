//! # Timestamp Fan-out
//!
//! Pushes a timestamp to every open `/ws` connection on a fixed tick.
//!
//! ## Per-tick behaviour:
//! - Nothing happens while the connection set is empty
//! - One timestamp is taken per tick and sent to every connection
//! - Each connection has its own counter, bumped before its send, so
//!   every connection sees `message_count` 1, 2, 3, ... from the moment it
//!   (re)opened
//! - Connections whose send fails are dropped once the tick is done;
//!   the rest of the tick is delivered regardless
//!
//! ## Message Format:
//! ```json
//! {
//!   "type": "timestamp",
//!   "timestamp_iso": "2024-05-01T12:00:00.100Z",
//!   "timestamp_ms": 1714564800100,
//!   "message_count": 3
//! }
//! ```
//!
//! The loop never returns. A failed tick is logged and followed by a
//! longer back-off before normal ticking resumes.

use crate::config::BroadcastConfig;
use crate::error::{DeliveryError, LoopError};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct TimestampMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp_iso: String,
    pub timestamp_ms: i64,
    pub message_count: u64,
}

impl TimestampMessage {
    pub fn new(now: DateTime<Utc>, message_count: u64) -> Self {
        Self {
            kind: "timestamp",
            timestamp_iso: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            timestamp_ms: now.timestamp_millis(),
            message_count,
        }
    }
}

/// Outbound side of one duplex connection.
pub trait TickSink: Send + Sync {
    fn deliver(&self, payload: String) -> Result<(), DeliveryError>;
}

struct Connection {
    sink: Arc<dyn TickSink>,
    sent: u64,
}

/// Open connections and their message counters.
#[derive(Default)]
pub struct ConnectionSet {
    connections: Mutex<HashMap<Uuid, Connection>>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection, or resets its counter if it is already present.
    pub fn open(&self, id: Uuid, sink: Arc<dyn TickSink>) {
        self.connections.lock().insert(id, Connection { sink, sent: 0 });
        debug!(connection_id = %id, "Connection opened");
    }

    pub fn close(&self, id: &Uuid) -> bool {
        let removed = self.connections.lock().remove(id).is_some();
        if removed {
            debug!(connection_id = %id, "Connection closed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.connections.lock().contains_key(id)
    }

    fn snapshot(&self) -> Vec<(Uuid, Arc<dyn TickSink>)> {
        self.connections
            .lock()
            .iter()
            .map(|(id, connection)| (*id, connection.sink.clone()))
            .collect()
    }

    /// Bumps and returns the counter; `None` if the connection went away.
    fn next_count(&self, id: &Uuid) -> Option<u64> {
        self.connections.lock().get_mut(id).map(|connection| {
            connection.sent += 1;
            connection.sent
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub delivered: usize,
    pub dropped: Vec<Uuid>,
}

pub struct Broadcaster {
    connections: Arc<ConnectionSet>,
    tick_interval: Duration,
    backoff: Duration,
}

impl Broadcaster {
    pub fn new(connections: Arc<ConnectionSet>, config: &BroadcastConfig) -> Self {
        Self {
            connections,
            tick_interval: config.tick_interval(),
            backoff: config.error_backoff(),
        }
    }

    /// Delivers one timestamp to every open connection.
    pub fn tick(&self) -> Result<TickReport, LoopError> {
        let targets = self.connections.snapshot();
        let mut report = TickReport::default();
        if targets.is_empty() {
            return Ok(report);
        }

        let now = Utc::now();
        for (id, sink) in targets {
            let Some(count) = self.connections.next_count(&id) else {
                continue;
            };
            let payload = serde_json::to_string(&TimestampMessage::new(now, count))?;
            match sink.deliver(payload) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    debug!(connection_id = %id, "Delivery failed: {}", err);
                    report.dropped.push(id);
                }
            }
        }

        for id in &report.dropped {
            self.connections.close(id);
        }
        Ok(report)
    }

    /// Ticks forever.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_ms = self.tick_interval.as_millis() as u64,
            "Timestamp broadcaster started"
        );
        let this = self.clone();
        self.drive(move || this.tick()).await
    }

    async fn drive<F>(&self, mut tick: F)
    where
        F: FnMut() -> Result<TickReport, LoopError>,
    {
        loop {
            match tick() {
                Ok(report) => {
                    if !report.dropped.is_empty() {
                        info!(dropped = report.dropped.len(), "Dropped unreachable connections");
                    }
                    tokio::time::sleep(self.tick_interval).await;
                }
                Err(err) => {
                    error!("Broadcast tick failed, backing off: {}", err);
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}
