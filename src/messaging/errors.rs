//! # Messaging Error Types
//!
//! Errors raised while decoding inbound records or publishing to the bus.

use thiserror::Error;

/// An inbound record could not be turned into an archival request
#[derive(Error, Debug)]
pub enum DeserializationError {
    #[error("Record has an empty key")]
    EmptyKey,

    #[error("Invalid payload for {key}: {source}")]
    InvalidPayload {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DeserializationError {
    pub fn invalid_payload(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidPayload {
            key: key.into(),
            source,
        }
    }
}

/// Publishing to an outbound topic failed
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publisher for topic {topic} is closed")]
    ChannelClosed { topic: String },

    #[error("Publishing to {topic} timed out after {timeout_ms}ms")]
    Timeout { topic: String, timeout_ms: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublishError {
    pub fn channel_closed(topic: impl Into<String>) -> Self {
        Self::ChannelClosed {
            topic: topic.into(),
        }
    }

    pub fn timeout(topic: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            topic: topic.into(),
            timeout_ms,
        }
    }
}
