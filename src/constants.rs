//! # System Constants
//!
//! Event vocabulary and wire-level strings shared by the orchestrator, the
//! inbound consumer and anything that reads the outbound topics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle values published on the processing-status topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingEventType {
    /// Event decoded and accepted from the input topic
    Received,
    /// An archiving attempt began executing
    Started,
    /// The journal service holds the application
    Archived,
    /// Workflow completed; the key is no longer in flight
    Finished,
    /// Retry ladder exhausted; the task was abandoned
    Failure,
}

impl ProcessingEventType {
    /// Check if this event ends the workflow for its key
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failure)
    }
}

impl fmt::Display for ProcessingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "RECEIVED"),
            Self::Started => write!(f, "STARTED"),
            Self::Archived => write!(f, "ARCHIVED"),
            Self::Finished => write!(f, "FINISHED"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

impl std::str::FromStr for ProcessingEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RECEIVED" => Ok(Self::Received),
            "STARTED" => Ok(Self::Started),
            "ARCHIVED" => Ok(Self::Archived),
            "FINISHED" => Ok(Self::Finished),
            "FAILURE" => Ok(Self::Failure),
            _ => Err(format!("Invalid processing event type: {s}")),
        }
    }
}

/// Prefixes of free-text trace messages; consumers match on these
pub mod messages {
    pub const OK: &str = "ok";
    pub const EXCEPTION: &str = "Exception";

    pub fn exception(summary: impl std::fmt::Display) -> String {
        format!("{EXCEPTION}: {summary}")
    }
}

/// Action names used in per-key metric events
pub mod metric_actions {
    pub const GET_FILES: &str = "get files from filestorage";
    pub const SEND_TO_ARCHIVE: &str = "send files to archive";
    pub const DELETE_FILES: &str = "delete files from filestorage";
}

/// Identifies this application in published metric events
pub const APPLICATION_NAME: &str = "archiver-core";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trips_through_display() {
        for event in [
            ProcessingEventType::Received,
            ProcessingEventType::Started,
            ProcessingEventType::Archived,
            ProcessingEventType::Finished,
            ProcessingEventType::Failure,
        ] {
            assert_eq!(event.to_string().parse::<ProcessingEventType>(), Ok(event));
        }
        assert!("bogus".parse::<ProcessingEventType>().is_err());
    }

    #[test]
    fn test_exception_message_has_contract_prefix() {
        let message = messages::exception("file storage unavailable");
        assert!(message.starts_with(messages::EXCEPTION));
    }
}
