//! # Error Types
//!
//! Structured error handling for the archiving core using thiserror. Each
//! concern owns its own enum; [`ArchiverError`] is the crate-level umbrella
//! that the processor and bootstrap code propagate.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::errors::{DeserializationError, PublishError};
use crate::services::RemoteError;

/// Crate-level error type
#[derive(Error, Debug)]
pub enum ArchiverError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] DeserializationError),

    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Command channel closed: {component}")]
    ChannelClosed { component: String },

    #[error("Invalid state transition: {from} -> {event}")]
    StateTransition { from: String, event: String },

    #[error("Shutdown error: {message}")]
    Shutdown { message: String },
}

impl ArchiverError {
    /// Create a channel closed error
    pub fn channel_closed(component: impl Into<String>) -> Self {
        Self::ChannelClosed {
            component: component.into(),
        }
    }

    /// Create a state transition error
    pub fn state_transition(from: impl ToString, event: impl ToString) -> Self {
        Self::StateTransition {
            from: from.to_string(),
            event: event.to_string(),
        }
    }

    /// Create a shutdown error
    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiverError>;
