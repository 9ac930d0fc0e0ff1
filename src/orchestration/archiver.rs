//! # Archiving Orchestrator
//!
//! Runs one claimed attempt of a key's workflow: fetch, merge, submit,
//! best-effort delete, status events. Failed attempts are handed back to the
//! [`BackoffScheduler`]; exhausted ones are abandoned.
//!
//! Attempts are only ever started through [`TaskRegistry::try_claim`], so for
//! one key no two attempts run concurrently, while different keys run fully
//! independently on their own tokio tasks.
//!
//! A successful attempt whose payload was replaced mid-flight does not finish
//! the task: the newer payload is re-driven on the same rung of the ladder.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::backoff::{BackoffScheduler, Schedule};
use super::duration_ms;
use super::merge::FetchOutcome;
use super::state::{ArchivingEvent, ArchivingStateMachine};
use super::task_registry::{Claim, Completion, Registration, TaskRegistry};
use crate::config::TimeoutsConfig;
use crate::constants::{messages, metric_actions, ProcessingEventType};
use crate::error::ArchiverError;
use crate::logging::log_task_operation;
use crate::messaging::errors::PublishError;
use crate::messaging::message::MetricEvent;
use crate::messaging::publisher::StatusPublisher;
use crate::metrics::{LatencyKind, MetricsSink};
use crate::models::{ArchivalRequest, FileData, FileStatus};
use crate::services::{ArchiveClient, ArchiveError, FileService, JournalEntry, RemoteError};

/// How a claimed attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Archived (or found already archived) and removed from the registry
    Finished { already_archived: bool },
    /// Failed; the next attempt is armed
    Retrying { next_attempt: u32 },
    /// Failed on the last rung of the ladder
    Abandoned,
    /// Succeeded, but a newer payload arrived meanwhile and is re-driven
    Superseded,
    /// Not run to completion because the processor is stopping
    Interrupted,
}

/// Why an attempt failed
#[derive(Error, Debug)]
enum AttemptError {
    #[error("Files not found in file storage: {0:?}")]
    FilesNotFound(Vec<String>),

    #[error("Failed to get files from file storage: {0}")]
    Fetch(String),

    #[error("Failed to send files to archive: {0}")]
    Archive(RemoteError),

    #[error(transparent)]
    State(#[from] ArchiverError),
}

/// Remote collaborators of the orchestrator
#[derive(Clone)]
pub struct Collaborators {
    pub files: Arc<dyn FileService>,
    pub archive: Arc<dyn ArchiveClient>,
    pub publisher: Arc<dyn StatusPublisher>,
}

/// Counts attempts in progress so shutdown can wait for them
#[derive(Debug, Default)]
pub struct ActivityTracker {
    busy: AtomicUsize,
    idle: Notify,
}

/// Held for the duration of one attempt
#[derive(Debug)]
pub struct ActivityGuard {
    tracker: Arc<ActivityTracker>,
}

impl ActivityTracker {
    pub fn enter(self: &Arc<Self>) -> ActivityGuard {
        self.busy.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    /// Wait until no attempt is in progress; `false` if `grace` ran out first
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let notified = self.idle.notified();
            if self.busy() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.busy() == 0;
            }
        }
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if self.tracker.busy.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

pub struct ArchivingOrchestrator {
    registry: Arc<TaskRegistry>,
    scheduler: BackoffScheduler,
    collaborators: Collaborators,
    metrics: Arc<dyn MetricsSink>,
    archive_timeout: Duration,
    publish_timeout: Duration,
    stopping: AtomicBool,
    activity: Arc<ActivityTracker>,
}

impl std::fmt::Debug for ArchivingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivingOrchestrator")
            .field("registry", &self.registry)
            .field("scheduler", &self.scheduler)
            .field("stopping", &self.is_stopping())
            .field("busy", &self.activity.busy())
            .finish()
    }
}

impl ArchivingOrchestrator {
    pub fn new(
        registry: Arc<TaskRegistry>,
        scheduler: BackoffScheduler,
        collaborators: Collaborators,
        metrics: Arc<dyn MetricsSink>,
        timeouts: &TimeoutsConfig,
    ) -> Self {
        Self {
            registry,
            scheduler,
            collaborators,
            metrics,
            archive_timeout: timeouts.archive(),
            publish_timeout: timeouts.publish(),
            stopping: AtomicBool::new(false),
            activity: Arc::new(ActivityTracker::default()),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn activity(&self) -> &Arc<ActivityTracker> {
        &self.activity
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Register an inbound request and arm its first attempt.
    ///
    /// A duplicate for a registered key only replaces the payload. A pending
    /// redrive picks it up; an executing attempt re-drives it after success.
    pub fn accept(self: &Arc<Self>, key: &str, request: ArchivalRequest) -> Registration {
        let registration = self.registry.add_or_update(key, request, 0);
        if registration == Registration::Updated {
            debug!(key = %key, "Duplicate event for registered task, payload replaced");
            return registration;
        }
        if self.is_stopping() {
            info!(key = %key, "Stopping, task registered without scheduling");
            return registration;
        }

        match self.scheduler.schedule(key, 0) {
            Schedule::Armed(timer) => {
                self.registry.arm_redrive(key, timer);
            }
            Schedule::Exhausted => {
                let orchestrator = Arc::clone(self);
                let key = key.to_string();
                tokio::spawn(async move {
                    orchestrator.emit_event(&key, ProcessingEventType::Failure).await;
                    orchestrator.registry.finish(&key);
                });
            }
        }
        registration
    }

    pub fn claim(&self, key: &str, attempt: u32) -> Option<Claim> {
        self.registry.try_claim(key, attempt)
    }

    /// Stop starting new attempts and cancel pending redrives
    pub fn begin_shutdown(&self) -> usize {
        self.stopping.store(true, Ordering::SeqCst);
        self.registry.cancel_pending()
    }

    /// Run one claimed attempt to its outcome
    pub async fn run_attempt(&self, key: &str, claim: Claim) -> AttemptOutcome {
        self.emit_event(key, ProcessingEventType::Started).await;

        if self.is_stopping() {
            info!(key = %key, attempt = claim.attempt, "Stopping, attempt not executed");
            self.registry.release(key);
            return AttemptOutcome::Interrupted;
        }

        let mut machine = ArchivingStateMachine::for_attempt(claim.attempt);
        match self.execute(key, &claim, &mut machine).await {
            Ok(()) => {
                if self.registry.complete_attempt(key) == Completion::Superseded {
                    return self.redrive_newer_payload(key, &claim).await;
                }
                self.emit_event(key, ProcessingEventType::Finished).await;
                self.emit_message(key, messages::OK).await;
                self.metrics
                    .observe_latency(LatencyKind::Archiving, claim.registered_at.elapsed());
                let already_archived = machine.was_already_archived();
                log_task_operation(
                    "archive",
                    key,
                    claim.attempt,
                    "finished",
                    already_archived.then_some("already archived"),
                );
                AttemptOutcome::Finished { already_archived }
            }
            Err(failure) => self.handle_failure(key, &claim, &mut machine, failure).await,
        }
    }

    async fn execute(
        &self,
        key: &str,
        claim: &Claim,
        machine: &mut ArchivingStateMachine,
    ) -> Result<(), AttemptError> {
        let start = if claim.attempt == 0 {
            ArchivingEvent::Start
        } else {
            ArchivingEvent::Redrive
        };
        machine.transition(start)?;
        debug!(key = %key, attempt = claim.attempt, state = %machine.current_state(), "Attempt started");

        let started = Timing::now();
        match self.collaborators.files.fetch_files(key, &claim.request).await {
            FetchOutcome::Ok(files) => {
                self.emit_metric(key, metric_actions::GET_FILES, started).await;
                machine.transition(ArchivingEvent::FilesFetched)?;
                self.submit(key, &claim.request, &files, machine).await?;
            }
            FetchOutcome::Deleted => {
                self.emit_metric(key, metric_actions::GET_FILES, started).await;
                machine.transition(ArchivingEvent::FilesDeleted)?;
                info!(key = %key, "Files already deleted, application was archived by a prior attempt");
            }
            FetchOutcome::NotFound(files) => {
                machine.transition(ArchivingEvent::FetchFailed)?;
                let missing = files
                    .iter()
                    .filter(|f| f.status != FileStatus::Ok)
                    .map(|f| f.id.clone())
                    .collect();
                return Err(AttemptError::FilesNotFound(missing));
            }
            FetchOutcome::Error(message) => {
                machine.transition(ArchivingEvent::FetchFailed)?;
                return Err(AttemptError::Fetch(message));
            }
        }

        self.emit_event(key, ProcessingEventType::Archived).await;
        self.delete(key, &claim.request).await;
        machine.transition(ArchivingEvent::DeletionDone)?;
        Ok(())
    }

    async fn submit(
        &self,
        key: &str,
        request: &ArchivalRequest,
        files: &[FileData],
        machine: &mut ArchivingStateMachine,
    ) -> Result<(), AttemptError> {
        let entry = match JournalEntry::build(request, files) {
            Ok(entry) => entry,
            Err(err) => {
                machine.transition(ArchivingEvent::ArchiveFailed)?;
                return Err(AttemptError::Archive(err));
            }
        };

        let started = Timing::now();
        let submission = self.collaborators.archive.submit(key, &entry);
        let result = match tokio::time::timeout(self.archive_timeout, submission).await {
            Ok(result) => result,
            Err(_) => Err(ArchiveError::Transient(RemoteError::timeout(
                "archive",
                duration_ms(self.archive_timeout),
            ))),
        };
        self.metrics
            .observe_latency(LatencyKind::Archive, started.instant.elapsed());

        match result {
            Ok(archive_id) => {
                self.metrics.archive_succeeded();
                info!(key = %key, archive_id = %archive_id, variants = entry.variant_count(), "Saved to archive");
                self.emit_metric(key, metric_actions::SEND_TO_ARCHIVE, started).await;
                machine.transition(ArchivingEvent::Archived)?;
                Ok(())
            }
            Err(ArchiveError::AlreadyArchived { .. }) => {
                info!(key = %key, "Application already archived, finalizing without resubmitting");
                machine.transition(ArchivingEvent::AlreadyArchived)?;
                Ok(())
            }
            Err(ArchiveError::Transient(err)) => {
                self.metrics.archive_failed();
                error!(key = %key, error = %err, "Error sending to archive");
                machine.transition(ArchivingEvent::ArchiveFailed)?;
                Err(AttemptError::Archive(err))
            }
        }
    }

    /// Best effort: a failure is logged and counted but never fails the task
    async fn delete(&self, key: &str, request: &ArchivalRequest) {
        let started = Timing::now();
        if let Err(err) = self.collaborators.files.delete_files(key, request).await {
            warn!(
                key = %key,
                file_ids = ?request.file_ids(),
                error = %err,
                "Failed to delete files from file storage. Everything is archived, so the error is ignored"
            );
        }
        self.emit_metric(key, metric_actions::DELETE_FILES, started).await;
    }

    /// The claimed payload is archived, but the registry holds a newer one
    async fn redrive_newer_payload(&self, key: &str, claim: &Claim) -> AttemptOutcome {
        info!(key = %key, attempt = claim.attempt, "Payload replaced during attempt, archiving the newer payload");
        self.emit_message(key, messages::OK).await;

        if self.is_stopping() {
            self.registry.release(key);
            return AttemptOutcome::Interrupted;
        }

        match self.scheduler.schedule(key, claim.attempt) {
            Schedule::Armed(timer) => {
                self.registry.arm_redrive(key, timer);
                AttemptOutcome::Superseded
            }
            Schedule::Exhausted => {
                self.emit_event(key, ProcessingEventType::Finished).await;
                self.complete(key, claim);
                AttemptOutcome::Finished {
                    already_archived: false,
                }
            }
        }
    }

    async fn handle_failure(
        &self,
        key: &str,
        claim: &Claim,
        machine: &mut ArchivingStateMachine,
        failure: AttemptError,
    ) -> AttemptOutcome {
        warn!(key = %key, attempt = claim.attempt, error = %failure, "Archiving attempt failed");
        self.emit_message(key, &messages::exception(&failure)).await;

        if self.is_stopping() {
            self.registry.release(key);
            return AttemptOutcome::Interrupted;
        }

        let next_attempt = claim.attempt + 1;
        match self.scheduler.schedule(key, next_attempt) {
            Schedule::Armed(timer) => {
                debug!(key = %key, next_attempt, delay_ms = duration_ms(timer.delay()), "Redrive armed");
                self.registry.arm_redrive(key, timer);
                AttemptOutcome::Retrying { next_attempt }
            }
            Schedule::Exhausted => {
                if let Err(err) = machine.transition(ArchivingEvent::GiveUp) {
                    warn!(key = %key, error = %err, "Unexpected state when abandoning task");
                }
                self.emit_event(key, ProcessingEventType::Failure).await;
                self.complete(key, claim);
                let summary = failure.to_string();
                log_task_operation("archive", key, claim.attempt, "abandoned", Some(summary.as_str()));
                AttemptOutcome::Abandoned
            }
        }
    }

    fn complete(&self, key: &str, claim: &Claim) {
        self.registry.finish(key);
        self.metrics
            .observe_latency(LatencyKind::Archiving, claim.registered_at.elapsed());
    }

    async fn emit_event(&self, key: &str, event_type: ProcessingEventType) {
        let publish = self
            .collaborators
            .publisher
            .publish_processing_event(key, event_type);
        self.published(key, "processing event", publish).await;
    }

    async fn emit_message(&self, key: &str, message: &str) {
        let publish = self.collaborators.publisher.publish_message(key, message);
        self.published(key, "message", publish).await;
    }

    async fn emit_metric(&self, key: &str, action: &str, started: Timing) {
        let metric = MetricEvent::new(action, started.at, duration_ms(started.instant.elapsed()));
        let publish = self.collaborators.publisher.publish_metric(key, &metric);
        self.published(key, "metric", publish).await;
    }

    /// Publishing never fails a task; errors and timeouts are logged
    async fn published<F>(&self, key: &str, what: &str, publish: F)
    where
        F: std::future::Future<Output = Result<(), PublishError>>,
    {
        let result = match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::timeout(what, duration_ms(self.publish_timeout))),
        };
        if let Err(err) = result {
            warn!(key = %key, error = %err, "Failed to publish {what}");
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    at: DateTime<Utc>,
    instant: Instant,
}

impl Timing {
    fn now() -> Self {
        Self {
            at: Utc::now(),
            instant: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_idle_returns_once_guards_drop() {
        let tracker = Arc::new(ActivityTracker::default());
        let guard = tracker.enter();
        assert_eq!(tracker.busy(), 1);

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        drop(guard);

        assert!(waiter.await.unwrap());
        assert_eq!(tracker.busy(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle_gives_up_after_grace() {
        let tracker = Arc::new(ActivityTracker::default());
        let _guard = tracker.enter();

        assert!(!tracker.wait_idle(Duration::from_millis(50)).await);
    }

    #[test]
    fn test_attempt_error_summaries() {
        let err = AttemptError::FilesNotFound(vec!["f2".to_string()]);
        assert!(messages::exception(&err).starts_with("Exception: Files not found"));

        let err = AttemptError::Archive(RemoteError::timeout("archive", 100));
        assert!(err.to_string().contains("timed out"));
    }
}
