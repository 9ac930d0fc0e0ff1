//! # Task Registry
//!
//! In-memory map from task key to the current payload and attempt number.
//! A key present in the registry means its workflow is either executing an
//! attempt or waiting on a redrive timer.
//!
//! Every mutation of one key happens while holding that key's map entry, so
//! mutation is serialized per key (per shard) without a global lock. The
//! entry also records whether an attempt is currently executing and the
//! abort handle of the pending redrive, which lets [`TaskRegistry::try_claim`]
//! drop stale or redundant triggers instead of running two attempts at once.
//!
//! A different payload arriving while an attempt executes marks the entry
//! superseded. [`TaskRegistry::complete_attempt`] then keeps the entry so the
//! newer payload gets an attempt of its own.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::AbortHandle;
use tracing::debug;

use super::backoff::RedriveTimer;
use crate::metrics::MetricsSink;
use crate::models::ArchivalRequest;

struct TaskEntry {
    request: Arc<ArchivalRequest>,
    attempt: u32,
    registered_at: Instant,
    executing: bool,
    superseded: bool,
    pending_redrive: Option<AbortHandle>,
}

impl TaskEntry {
    fn cancel_redrive(&mut self) {
        if let Some(handle) = self.pending_redrive.take() {
            handle.abort();
        }
    }
}

/// Whether `add_or_update` created the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    New,
    Updated,
}

/// Result of [`TaskRegistry::complete_attempt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Removed, or already absent
    Finished,
    /// Kept: the payload changed while the attempt executed
    Superseded,
}

/// Read-only view of one registered task
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub key: String,
    pub request: Arc<ArchivalRequest>,
    pub attempt: u32,
    pub executing: bool,
}

/// Granted by [`TaskRegistry::try_claim`]; the holder runs the attempt
#[derive(Debug, Clone)]
pub struct Claim {
    pub request: Arc<ArchivalRequest>,
    pub attempt: u32,
    pub registered_at: Instant,
}

pub struct TaskRegistry {
    tasks: DashMap<String, TaskEntry>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            tasks: DashMap::new(),
            metrics,
        }
    }

    /// Insert a task, or replace the payload of an existing one.
    ///
    /// Payload is last-write-wins. The attempt number of an existing entry
    /// never moves backwards: it becomes `max(current, attempt)`.
    pub fn add_or_update(&self, key: &str, request: ArchivalRequest, attempt: u32) -> Registration {
        match self.tasks.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.executing && *entry.request != request {
                    entry.superseded = true;
                }
                entry.request = Arc::new(request);
                entry.attempt = entry.attempt.max(attempt);
                debug!(key = %key, attempt = entry.attempt, "Updated payload of registered task");
                Registration::Updated
            }
            Entry::Vacant(vacant) => {
                vacant.insert(TaskEntry {
                    request: Arc::new(request),
                    attempt,
                    registered_at: Instant::now(),
                    executing: false,
                    superseded: false,
                    pending_redrive: None,
                });
                self.metrics.task_added();
                debug!(key = %key, attempt, "Registered task");
                Registration::New
            }
        }
    }

    /// Start `timer` for the entry and record its handle.
    ///
    /// Sets the attempt to the timer's attempt and clears the executing flag
    /// before the timer is spawned, so even a zero-delay redrive finds the
    /// entry ready to claim. Returns `false` if the key is not registered.
    pub fn arm_redrive(&self, key: &str, timer: RedriveTimer) -> bool {
        match self.tasks.get_mut(key) {
            Some(mut entry) => {
                entry.cancel_redrive();
                entry.attempt = timer.attempt();
                entry.executing = false;
                entry.superseded = false;
                entry.pending_redrive = Some(timer.start());
                true
            }
            None => false,
        }
    }

    /// Claim the right to execute `attempt` for `key`.
    ///
    /// Returns `None` when the key is gone, when `attempt` is not the
    /// entry's current attempt (a stale redrive) or when another attempt is
    /// already executing.
    pub fn try_claim(&self, key: &str, attempt: u32) -> Option<Claim> {
        let mut entry = self.tasks.get_mut(key)?;
        if entry.attempt != attempt || entry.executing {
            return None;
        }
        entry.executing = true;
        entry.superseded = false;
        entry.pending_redrive = None;
        Some(Claim {
            request: entry.request.clone(),
            attempt,
            registered_at: entry.registered_at,
        })
    }

    /// Give up a claim without arming anything; the task stays registered
    pub fn release(&self, key: &str) {
        if let Some(mut entry) = self.tasks.get_mut(key) {
            entry.executing = false;
        }
    }

    /// Remove the task. No-op if absent; returns whether anything was removed.
    pub fn finish(&self, key: &str) -> bool {
        match self.tasks.remove(key) {
            Some((_, mut entry)) => {
                entry.cancel_redrive();
                self.metrics.task_removed();
                true
            }
            None => false,
        }
    }

    /// Remove the task after a successful attempt, unless its payload was
    /// replaced while the attempt executed. A superseded entry stays
    /// registered and claimed; the caller arms or releases it.
    pub fn complete_attempt(&self, key: &str) -> Completion {
        match self.tasks.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().superseded {
                    occupied.get_mut().superseded = false;
                    debug!(key = %key, "Payload replaced during attempt, task kept");
                    return Completion::Superseded;
                }
                let mut entry = occupied.remove();
                entry.cancel_redrive();
                self.metrics.task_removed();
                Completion::Finished
            }
            Entry::Vacant(_) => Completion::Finished,
        }
    }

    /// Snapshot of every registered task, ordered by key
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let mut tasks: Vec<TaskSnapshot> = self
            .tasks
            .iter()
            .map(|entry| TaskSnapshot {
                key: entry.key().clone(),
                request: entry.request.clone(),
                attempt: entry.attempt,
                executing: entry.executing,
            })
            .collect();
        tasks.sort_by(|a, b| a.key.cmp(&b.key));
        tasks
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn attempt(&self, key: &str) -> Option<u32> {
        self.tasks.get(key).map(|entry| entry.attempt)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Abort every pending redrive timer; returns how many were cancelled
    pub fn cancel_pending(&self) -> usize {
        let mut cancelled = 0;
        for mut entry in self.tasks.iter_mut() {
            if entry.pending_redrive.is_some() {
                entry.cancel_redrive();
                cancelled += 1;
            }
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ArchivingMetrics;
    use crate::orchestration::backoff::{BackoffScheduler, RetryLadder, Schedule};
    use crate::testing::sample_request;
    use tokio::sync::mpsc;

    fn registry() -> (TaskRegistry, Arc<ArchivingMetrics>) {
        let metrics = Arc::new(ArchivingMetrics::new());
        (TaskRegistry::new(metrics.clone()), metrics)
    }

    #[test]
    fn test_add_or_update_is_last_write_wins() {
        let (registry, metrics) = registry();

        assert_eq!(
            registry.add_or_update("k", sample_request("k", &["a"]), 0),
            Registration::New
        );
        assert_eq!(
            registry.add_or_update("k", sample_request("k", &["b", "c"]), 0),
            Registration::Updated
        );

        let tasks = registry.list();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].request.file_ids(), vec!["b", "c"]);
        assert_eq!(metrics.snapshot().tasks_in_flight, 1);
    }

    #[test]
    fn test_attempt_never_moves_backwards() {
        let (registry, _) = registry();
        registry.add_or_update("k", sample_request("k", &["a"]), 3);
        registry.add_or_update("k", sample_request("k", &["a"]), 0);
        assert_eq!(registry.attempt("k"), Some(3));
    }

    #[test]
    fn test_finish_is_noop_when_absent() {
        let (registry, metrics) = registry();
        registry.add_or_update("k", sample_request("k", &["a"]), 0);

        assert!(registry.finish("k"));
        assert!(!registry.finish("k"));
        assert!(!registry.contains("k"));
        assert_eq!(metrics.snapshot().tasks_in_flight, 0);
    }

    #[test]
    fn test_claim_is_exclusive_and_attempt_checked() {
        let (registry, _) = registry();
        registry.add_or_update("k", sample_request("k", &["a"]), 0);

        assert!(registry.try_claim("k", 1).is_none(), "stale attempt");
        let claim = registry.try_claim("k", 0).expect("first claim");
        assert_eq!(claim.attempt, 0);
        assert!(registry.try_claim("k", 0).is_none(), "already executing");

        registry.release("k");
        assert!(registry.try_claim("k", 0).is_some());
        assert!(registry.try_claim("missing", 0).is_none());
    }

    #[tokio::test]
    async fn test_arm_redrive_makes_next_attempt_claimable() {
        let (registry, metrics) = registry();
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = BackoffScheduler::new(RetryLadder::from_seconds(&[0, 0]), tx, metrics);

        registry.add_or_update("k", sample_request("k", &["a"]), 0);
        registry.try_claim("k", 0).expect("claim");

        let Schedule::Armed(timer) = scheduler.schedule("k", 1) else {
            panic!("expected armed");
        };
        assert!(registry.arm_redrive("k", timer));
        assert_eq!(registry.attempt("k"), Some(1));

        assert!(rx.recv().await.is_some());
        assert!(registry.try_claim("k", 1).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_cancels_pending_redrive() {
        let (registry, metrics) = registry();
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = BackoffScheduler::new(RetryLadder::from_seconds(&[5]), tx, metrics);

        registry.add_or_update("k", sample_request("k", &["a"]), 0);
        let Schedule::Armed(timer) = scheduler.schedule("k", 0) else {
            panic!("expected armed");
        };
        registry.arm_redrive("k", timer);
        registry.finish("k");

        tokio::time::sleep(std::time::Duration::from_secs(6)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_payload_replaced_mid_attempt_keeps_task() {
        let (registry, metrics) = registry();
        registry.add_or_update("k", sample_request("k", &["a"]), 0);
        registry.try_claim("k", 0).expect("claim");

        registry.add_or_update("k", sample_request("k", &["b"]), 0);

        assert_eq!(registry.complete_attempt("k"), Completion::Superseded);
        assert!(registry.contains("k"));
        assert_eq!(registry.list()[0].request.file_ids(), vec!["b"]);
        assert_eq!(metrics.snapshot().tasks_in_flight, 1);

        registry.release("k");
        let claim = registry.try_claim("k", 0).expect("claim newer payload");
        assert_eq!(claim.request.file_ids(), vec!["b"]);
        assert_eq!(registry.complete_attempt("k"), Completion::Finished);
        assert!(!registry.contains("k"));
    }

    #[test]
    fn test_identical_or_idle_duplicate_does_not_supersede() {
        let (registry, _) = registry();
        registry.add_or_update("k", sample_request("k", &["a"]), 0);
        registry.add_or_update("k", sample_request("k", &["b"]), 0);
        registry.try_claim("k", 0).expect("claim");

        registry.add_or_update("k", sample_request("k", &["b"]), 0);

        assert_eq!(registry.complete_attempt("k"), Completion::Finished);
        assert_eq!(registry.complete_attempt("k"), Completion::Finished);
    }
}
