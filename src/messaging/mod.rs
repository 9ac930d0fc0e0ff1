//! # Messaging
//!
//! Bus-facing side of the archiver: the inbound consumer and its JSON codec,
//! the outbound status publisher, and the record types exchanged on each
//! topic.

pub mod codec;
pub mod consumer;
pub mod errors;
pub mod message;
pub mod publisher;

pub use codec::{decode_request, encode_request};
pub use consumer::{InboundConsumer, InboundOutcome};
pub use errors::{DeserializationError, PublishError};
pub use message::{BusRecord, InboundRecord, MetricEvent, ProcessingEvent};
pub use publisher::{BusStatusPublisher, StatusPublisher};
