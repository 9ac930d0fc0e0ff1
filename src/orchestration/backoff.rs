//! # Backoff Scheduler
//!
//! Owns the retry ladder and decides, for a given attempt number, whether the
//! attempt is armed (and after which delay) or whether the task has exhausted
//! its retries. Armed attempts are driven by a [`RedriveTimer`] which, once
//! its delay elapses, posts [`ArchivingCommand::Execute`] onto the processor's
//! command channel. Timers never touch the registry themselves.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use super::command_processor::ArchivingCommand;
use super::duration_ms;
use crate::metrics::MetricsSink;

/// Ordered, immutable backoff delays. Its length is the number of attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryLadder {
    delays: Arc<[Duration]>,
}

impl RetryLadder {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self {
            delays: delays.into(),
        }
    }

    pub fn from_seconds(seconds: &[u64]) -> Self {
        Self::new(seconds.iter().copied().map(Duration::from_secs).collect())
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// Delay before attempt `attempt`, or `None` once the ladder is exhausted
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        self.delays.get(attempt as usize).copied()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

/// Decision for one attempt number
#[derive(Debug)]
pub enum Schedule {
    Armed(RedriveTimer),
    /// Ladder exhausted; the caller must finalize the task as abandoned
    Exhausted,
}

/// One-shot timer that re-submits an attempt through the command channel
#[derive(Debug)]
pub struct RedriveTimer {
    key: String,
    attempt: u32,
    delay: Duration,
    commands: mpsc::Sender<ArchivingCommand>,
}

impl RedriveTimer {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Spawn the timer. Aborting the returned handle cancels the redrive.
    pub fn start(self) -> AbortHandle {
        let Self {
            key,
            attempt,
            delay,
            commands,
        } = self;

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let command = ArchivingCommand::Execute {
                key: key.clone(),
                attempt,
            };
            if commands.send(command).await.is_err() {
                debug!(key = %key, attempt, "Command channel closed, dropping redrive");
            }
        })
        .abort_handle()
    }
}

pub struct BackoffScheduler {
    ladder: RetryLadder,
    commands: mpsc::Sender<ArchivingCommand>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for BackoffScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffScheduler")
            .field("ladder", &self.ladder)
            .finish()
    }
}

impl BackoffScheduler {
    pub fn new(
        ladder: RetryLadder,
        commands: mpsc::Sender<ArchivingCommand>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            ladder,
            commands,
            metrics,
        }
    }

    pub fn ladder(&self) -> &RetryLadder {
        &self.ladder
    }

    /// Arm `attempt` for `key`, or report exhaustion and count the give-up
    pub fn schedule(&self, key: &str, attempt: u32) -> Schedule {
        match self.ladder.delay(attempt) {
            Some(delay) => {
                debug!(key = %key, attempt, delay_ms = duration_ms(delay), "Scheduling attempt");
                Schedule::Armed(RedriveTimer {
                    key: key.to_string(),
                    attempt,
                    delay,
                    commands: self.commands.clone(),
                })
            }
            None => {
                warn!(
                    key = %key,
                    attempts = self.ladder.len(),
                    "Retry ladder exhausted, giving up on task"
                );
                self.metrics.task_given_up();
                Schedule::Exhausted
            }
        }
    }
}
