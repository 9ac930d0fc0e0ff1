//! # Archiving State Machine
//!
//! Per-attempt lifecycle of one key's workflow. The orchestrator drives an
//! [`ArchivingStateMachine`] through every step of an attempt so that an
//! out-of-order step surfaces as [`ArchiverError::StateTransition`] instead
//! of a silent double submission.
//!
//! ```text
//! Received  --start-------------> Fetching
//! Failed    --redrive-----------> Fetching
//! Fetching  --files_fetched-----> Archiving
//! Fetching  --files_deleted-----> AlreadyArchived
//! Fetching  --fetch_failed------> Failed
//! Archiving --archived----------> Deleting
//! Archiving --already_archived--> AlreadyArchived
//! Archiving --archive_failed----> Failed
//! AlreadyArchived | Deleting --deletion_done--> Finished
//! Failed    --give_up-----------> Abandoned
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ArchiverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchivingState {
    /// Inbound event accepted, no attempt run yet
    Received,
    /// Retrieving files from file storage
    Fetching,
    /// Submitting to the journal service
    Archiving,
    /// Journal already holds the application
    AlreadyArchived,
    /// Best-effort removal of source files
    Deleting,
    Finished,
    /// Attempt failed; waiting for a redrive or giving up
    Failed,
    /// Retry ladder exhausted
    Abandoned,
}

impl ArchivingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Abandoned)
    }

    /// Check if a remote call is in progress in this state
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Fetching | Self::Archiving | Self::Deleting)
    }
}

impl fmt::Display for ArchivingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Fetching => write!(f, "fetching"),
            Self::Archiving => write!(f, "archiving"),
            Self::AlreadyArchived => write!(f, "already_archived"),
            Self::Deleting => write!(f, "deleting"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl std::str::FromStr for ArchivingState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "fetching" => Ok(Self::Fetching),
            "archiving" => Ok(Self::Archiving),
            "already_archived" => Ok(Self::AlreadyArchived),
            "deleting" => Ok(Self::Deleting),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("Invalid archiving state: {s}")),
        }
    }
}

/// Events that move an attempt between states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchivingEvent {
    /// First attempt begins
    Start,
    /// Later attempt begins after a backoff delay
    Redrive,
    FilesFetched,
    /// Every file was already deleted from storage
    FilesDeleted,
    FetchFailed,
    Archived,
    AlreadyArchived,
    ArchiveFailed,
    /// Deletion step completed, successfully or not
    DeletionDone,
    GiveUp,
}

impl ArchivingEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Redrive => "redrive",
            Self::FilesFetched => "files_fetched",
            Self::FilesDeleted => "files_deleted",
            Self::FetchFailed => "fetch_failed",
            Self::Archived => "archived",
            Self::AlreadyArchived => "already_archived",
            Self::ArchiveFailed => "archive_failed",
            Self::DeletionDone => "deletion_done",
            Self::GiveUp => "give_up",
        }
    }
}

impl fmt::Display for ArchivingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

/// Tracks the state of one attempt
#[derive(Debug, Clone)]
pub struct ArchivingStateMachine {
    state: ArchivingState,
    visited_already_archived: bool,
}

impl ArchivingStateMachine {
    /// Attempt 0 starts from `Received`, later attempts from `Failed`
    pub fn for_attempt(attempt: u32) -> Self {
        let state = if attempt == 0 {
            ArchivingState::Received
        } else {
            ArchivingState::Failed
        };
        Self {
            state,
            visited_already_archived: false,
        }
    }

    pub fn current_state(&self) -> ArchivingState {
        self.state
    }

    /// Whether the journal reported (or storage implied) a prior archival
    pub fn was_already_archived(&self) -> bool {
        self.visited_already_archived
    }

    pub fn transition(&mut self, event: ArchivingEvent) -> Result<ArchivingState> {
        use ArchivingEvent as E;
        use ArchivingState as S;

        let target = match (self.state, event) {
            (S::Received, E::Start) => S::Fetching,
            (S::Failed, E::Redrive) => S::Fetching,

            (S::Fetching, E::FilesFetched) => S::Archiving,
            (S::Fetching, E::FilesDeleted) => S::AlreadyArchived,
            (S::Fetching, E::FetchFailed) => S::Failed,

            (S::Archiving, E::Archived) => S::Deleting,
            (S::Archiving, E::AlreadyArchived) => S::AlreadyArchived,
            (S::Archiving, E::ArchiveFailed) => S::Failed,

            (S::AlreadyArchived, E::DeletionDone) => S::Finished,
            (S::Deleting, E::DeletionDone) => S::Finished,

            (S::Failed, E::GiveUp) => S::Abandoned,

            (from, event) => return Err(ArchiverError::state_transition(from, event)),
        };

        if target == S::AlreadyArchived {
            self.visited_already_archived = true;
        }
        self.state = target;
        Ok(target)
    }
}
