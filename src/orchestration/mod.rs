//! # Orchestration
//!
//! The retry/orchestration core: task registry, backoff scheduler, fetch
//! merge, per-attempt state machine, the orchestrator that runs attempts and
//! the command processor that dispatches them.
//!
//! ## Control flow
//!
//! ```text
//! inbound event ──▶ Archive ──▶ registry.add_or_update ──▶ scheduler.schedule(0)
//!                                                              │ timer
//!        ┌─────────────────────────────────────────────────────┘
//!        ▼
//!     Execute ──▶ registry.try_claim ──▶ orchestrator.run_attempt
//!                                            │ failed
//!                                            ▼
//!                               scheduler.schedule(attempt + 1)
//! ```

pub mod archiver;
pub mod backoff;
pub mod bootstrap;
pub mod command_processor;
pub mod merge;
pub mod recovery;
pub mod state;
pub mod task_registry;

pub use archiver::{ArchivingOrchestrator, AttemptOutcome, Collaborators};
pub use backoff::{BackoffScheduler, RedriveTimer, RetryLadder, Schedule};
pub use bootstrap::{ArchiverSystem, SystemDependencies};
pub use command_processor::{
    ArchivingCommand, ArchivingHandle, ArchivingProcessingStats, ArchivingProcessor,
    ShutdownReport,
};
pub use merge::{merge, FetchOutcome};
pub use recovery::RecoveryPlanner;
pub use state::{ArchivingEvent, ArchivingState, ArchivingStateMachine};
pub use task_registry::{Completion, Registration, TaskRegistry, TaskSnapshot};

use std::time::Duration;

/// Whole milliseconds, saturating at `u64::MAX`
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
