//! Records exchanged with the message bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{ProcessingEventType, APPLICATION_NAME};

/// Raw record from the input topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    pub key: String,
    pub payload: Vec<u8>,
}

impl InboundRecord {
    pub fn new(key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
        }
    }
}

/// Value published on the processing-status topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingEvent {
    #[serde(rename = "type")]
    pub event_type: ProcessingEventType,
}

impl ProcessingEvent {
    pub fn new(event_type: ProcessingEventType) -> Self {
        Self { event_type }
    }
}

/// Timing of one successful remote call, published per key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEvent {
    pub application: String,
    pub action: String,
    /// Epoch milliseconds
    pub start_time: i64,
    pub duration_ms: u64,
}

impl MetricEvent {
    pub fn new(action: impl Into<String>, started_at: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            application: APPLICATION_NAME.to_string(),
            action: action.into(),
            start_time: started_at.timestamp_millis(),
            duration_ms,
        }
    }
}

/// One record written to an outbound topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusRecord {
    pub topic: String,
    pub key: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}
