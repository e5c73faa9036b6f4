//! Event values pushed to live viewers.

use std::fmt;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::types::RankedImage;

/// Closed set of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Connected,
    Images,
    Test,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Images => "images",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier handed to a subscriber in its `connected` event.
///
/// Format: `conn_<unix_millis>_<0..10000>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let suffix: u32 = rand::rng().random_range(0..10_000);
        Self(format!("conn_{millis}_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A transient message: a type plus a JSON payload.
///
/// Events are created per trigger and never stored after delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: EventKind,
    payload: Map<String, Value>,
}

impl Event {
    pub fn new(kind: EventKind, payload: Map<String, Value>) -> Self {
        Self { kind, payload }
    }

    /// First event every subscriber receives.
    pub fn connected(connection_id: &ConnectionId) -> Self {
        Self::from_json(
            EventKind::Connected,
            json!({
                "connection_id": connection_id,
                "status": "connected",
                "message": "SSE connection established",
            }),
        )
    }

    /// Search results for viewers.
    pub fn images(images: &[RankedImage], query: &str, source: &str) -> Self {
        Self::from_json(
            EventKind::Images,
            json!({
                "images": images,
                "query": query,
                "total": images.len(),
                "source": source,
                "timestamp": unix_timestamp(),
            }),
        )
    }

    pub fn test(message: &str) -> Self {
        Self::from_json(
            EventKind::Test,
            json!({
                "message": message,
                "timestamp": unix_timestamp(),
            }),
        )
    }

    fn from_json(kind: EventKind, value: Value) -> Self {
        let payload = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { kind, payload }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Payload with `type` folded in, as viewers receive it.
    pub fn to_json(&self) -> Value {
        let mut body = self.payload.clone();
        body.insert("type".to_string(), Value::from(self.kind.as_str()));
        Value::Object(body)
    }

    /// Text/event-stream framing: `event:` line, `data:` line, blank line.
    pub fn sse_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind, self.to_json())
    }
}

/// Seconds since the Unix epoch with millisecond precision.
pub fn unix_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
