//! Event types flowing through the ingestion pipeline
//!
//! An [`Event`] is what producers submit. A [`StoredEvent`] is what comes back
//! out of the durable store, carrying the store's insertion sequence number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A producer-submitted event
///
/// `payload` is opaque: it is stored and returned verbatim and never
/// inspected by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Producer-defined namespace
    pub topic: String,
    /// Producer-supplied identity, unique within `topic`
    #[serde(rename = "eventId", alias = "event_id")]
    pub event_id: String,
    /// Producer-supplied point in time (not checked against the wall clock)
    pub timestamp: DateTime<Utc>,
    /// Free-form origin label
    pub source: String,
    pub payload: Value,
}

impl Event {
    /// Create a new event with the current time as timestamp
    pub fn new(
        topic: impl Into<String>,
        event_id: impl Into<String>,
        source: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            topic: topic.into(),
            event_id: event_id.into(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }

    /// Override the producer timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The deduplication key of this event
    pub fn key(&self) -> EventKey<'_> {
        EventKey {
            topic: &self.topic,
            event_id: &self.event_id,
        }
    }
}

/// Borrowed `(topic, event_id)` deduplication key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey<'a> {
    pub topic: &'a str,
    pub event_id: &'a str,
}

impl std::fmt::Display for EventKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.topic, self.event_id)
    }
}

/// An event as persisted by the durable store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Monotonic insertion sequence assigned by the store
    pub seq: i64,
    pub topic: String,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub payload: Value,
    /// Wall-clock time the event was committed
    pub stored_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Drop the store metadata, returning the event as submitted
    pub fn into_event(self) -> Event {
        Event {
            topic: self.topic,
            event_id: self.event_id,
            timestamp: self.timestamp,
            source: self.source,
            payload: self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_deserializes_wire_names() {
        let event: Event = serde_json::from_value(json!({
            "topic": "system-logs",
            "eventId": "log-abc-123",
            "timestamp": "2025-10-16T11:00:00Z",
            "source": "app-server-1",
            "payload": {"msg": "User login success"}
        }))
        .unwrap();

        assert_eq!(event.topic, "system-logs");
        assert_eq!(event.event_id, "log-abc-123");
        assert_eq!(event.timestamp.to_rfc3339(), "2025-10-16T11:00:00+00:00");
        assert_eq!(event.payload["msg"], "User login success");
    }

    #[test]
    fn test_event_accepts_snake_case_id() {
        let event: Event = serde_json::from_value(json!({
            "topic": "t",
            "event_id": "a",
            "timestamp": "2025-10-16T11:00:00+02:00",
            "source": "s",
            "payload": {}
        }))
        .unwrap();

        assert_eq!(event.event_id, "a");
        // Offsets are normalized to UTC
        assert_eq!(event.timestamp.to_rfc3339(), "2025-10-16T09:00:00+00:00");
    }

    #[test]
    fn test_event_missing_id_is_rejected() {
        let result: Result<Event, _> = serde_json::from_value(json!({
            "topic": "malformed-data",
            "timestamp": "2025-10-16T10:00:00Z",
            "source": "test-suite-bad",
            "payload": {"data": "value1"}
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_event_key_display() {
        let event = Event::new("metrics", "metric-1", "prometheus", json!({"cpu": 0.75}));
        assert_eq!(event.key().to_string(), "metrics/metric-1");
    }

    #[test]
    fn test_stored_event_serializes_snake_case_id() {
        let stored = StoredEvent {
            seq: 7,
            topic: "metrics".to_string(),
            event_id: "metric-1".to_string(),
            timestamp: Utc::now(),
            source: "prometheus".to_string(),
            payload: json!({"cpu": 0.75}),
            stored_at: Utc::now(),
        };

        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["event_id"], "metric-1");
        assert_eq!(value["seq"], 7);
        assert_eq!(stored.into_event().payload, json!({"cpu": 0.75}));
    }
}
