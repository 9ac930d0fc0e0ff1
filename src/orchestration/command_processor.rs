//! # Archiving Command Processor
//!
//! Single dispatch path for everything that moves a task forward. Inbound
//! events arrive as [`ArchivingCommand::Archive`]; redrive timers post
//! [`ArchivingCommand::Execute`]. The processor loop itself never awaits a
//! remote call: claimed attempts are spawned onto their own tokio tasks so
//! a slow key never blocks unrelated keys.
//!
//! Queries (`ListTasks`, `GetStats`) and `Shutdown` answer over a oneshot
//! channel.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::archiver::{ArchivingOrchestrator, AttemptOutcome};
use super::duration_ms;
use super::task_registry::TaskSnapshot;
use crate::config::DispatchConfig;
use crate::error::{ArchiverError, Result};
use crate::models::ArchivalRequest;

/// Type alias for command response channels
pub type CommandResponder<T> = oneshot::Sender<Result<T>>;

#[derive(Debug)]
pub enum ArchivingCommand {
    /// Decoded inbound event
    Archive {
        key: String,
        request: ArchivalRequest,
    },
    /// Run `attempt` for `key` if it is still current
    Execute { key: String, attempt: u32 },
    ListTasks {
        resp: CommandResponder<Vec<TaskSnapshot>>,
    },
    GetStats {
        resp: CommandResponder<ArchivingProcessingStats>,
    },
    /// Stop starting attempts and wait for running ones
    Shutdown { resp: CommandResponder<ShutdownReport> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivingProcessingStats {
    pub inbound_accepted: u64,
    pub deserialization_failures: u64,
    pub attempts_started: u64,
    /// Stale or redundant triggers ignored by the registry
    pub attempts_dropped: u64,
    pub tasks_finished: u64,
    pub tasks_abandoned: u64,
    pub tasks_in_flight: usize,
    pub attempts_executing: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub cancelled_redrives: usize,
    /// Whether every running attempt completed within the grace period
    pub drained: bool,
    /// Tasks still registered, left for replay
    pub pending_tasks: usize,
}

/// Counters shared by the processor and the inbound consumer
#[derive(Debug, Default)]
pub struct ProcessingCounters {
    inbound_accepted: AtomicU64,
    deserialization_failures: AtomicU64,
    attempts_started: AtomicU64,
    attempts_dropped: AtomicU64,
    tasks_finished: AtomicU64,
    tasks_abandoned: AtomicU64,
}

impl ProcessingCounters {
    pub fn record_deserialization_failure(&self) {
        self.deserialization_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, outcome: AttemptOutcome) {
        match outcome {
            AttemptOutcome::Finished { .. } => {
                self.tasks_finished.fetch_add(1, Ordering::Relaxed);
            }
            AttemptOutcome::Abandoned => {
                self.tasks_abandoned.fetch_add(1, Ordering::Relaxed);
            }
            AttemptOutcome::Retrying { .. }
            | AttemptOutcome::Superseded
            | AttemptOutcome::Interrupted => {}
        }
    }

    fn snapshot(&self, orchestrator: &ArchivingOrchestrator) -> ArchivingProcessingStats {
        ArchivingProcessingStats {
            inbound_accepted: self.inbound_accepted.load(Ordering::Relaxed),
            deserialization_failures: self.deserialization_failures.load(Ordering::Relaxed),
            attempts_started: self.attempts_started.load(Ordering::Relaxed),
            attempts_dropped: self.attempts_dropped.load(Ordering::Relaxed),
            tasks_finished: self.tasks_finished.load(Ordering::Relaxed),
            tasks_abandoned: self.tasks_abandoned.load(Ordering::Relaxed),
            tasks_in_flight: orchestrator.registry().len(),
            attempts_executing: orchestrator.activity().busy(),
        }
    }
}

pub struct ArchivingProcessor {
    orchestrator: Arc<ArchivingOrchestrator>,
    counters: Arc<ProcessingCounters>,
    command_rx: Option<mpsc::Receiver<ArchivingCommand>>,
    task_handle: Option<JoinHandle<()>>,
    shutdown_grace: Duration,
}

impl std::fmt::Debug for ArchivingProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivingProcessor")
            .field("orchestrator", &self.orchestrator)
            .field("started", &self.task_handle.is_some())
            .finish()
    }
}

impl ArchivingProcessor {
    pub fn new(
        orchestrator: Arc<ArchivingOrchestrator>,
        counters: Arc<ProcessingCounters>,
        command_rx: mpsc::Receiver<ArchivingCommand>,
        dispatch: &DispatchConfig,
    ) -> Self {
        Self {
            orchestrator,
            counters,
            command_rx: Some(command_rx),
            task_handle: None,
            shutdown_grace: dispatch.shutdown_grace(),
        }
    }

    /// Start the command processing loop
    pub fn start(&mut self) -> Result<()> {
        let orchestrator = self.orchestrator.clone();
        let counters = self.counters.clone();
        let grace = self.shutdown_grace;
        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| ArchiverError::shutdown("Processor already started"))?;

        let handle = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let stop = matches!(command, ArchivingCommand::Shutdown { .. });
                Self::process_command(&orchestrator, &counters, grace, command).await;
                if stop {
                    break;
                }
            }
            debug!("Archiving processor loop exited");
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Wait for the processing loop to exit
    pub async fn join(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Archiving processor loop ended abnormally");
            }
        }
    }

    async fn process_command(
        orchestrator: &Arc<ArchivingOrchestrator>,
        counters: &Arc<ProcessingCounters>,
        grace: Duration,
        command: ArchivingCommand,
    ) {
        match command {
            ArchivingCommand::Archive { key, request } => {
                counters.inbound_accepted.fetch_add(1, Ordering::Relaxed);
                orchestrator.accept(&key, request);
            }
            ArchivingCommand::Execute { key, attempt } => {
                Self::handle_execute(orchestrator, counters, key, attempt);
            }
            ArchivingCommand::ListTasks { resp } => {
                let _ = resp.send(Ok(orchestrator.registry().list()));
            }
            ArchivingCommand::GetStats { resp } => {
                let _ = resp.send(Ok(counters.snapshot(orchestrator)));
            }
            ArchivingCommand::Shutdown { resp } => {
                let report = Self::handle_shutdown(orchestrator, grace).await;
                let _ = resp.send(Ok(report));
            }
        }
    }

    fn handle_execute(
        orchestrator: &Arc<ArchivingOrchestrator>,
        counters: &Arc<ProcessingCounters>,
        key: String,
        attempt: u32,
    ) {
        let Some(claim) = orchestrator.claim(&key, attempt) else {
            counters.attempts_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, attempt, "Ignoring stale or redundant trigger");
            return;
        };

        counters.attempts_started.fetch_add(1, Ordering::Relaxed);
        let guard = orchestrator.activity().enter();
        let orchestrator = orchestrator.clone();
        let counters = counters.clone();
        let span = info_span!("archiving_attempt", key = %key, attempt, attempt_id = %Uuid::new_v4());
        tokio::spawn(
            async move {
                let outcome = orchestrator.run_attempt(&key, claim).await;
                debug!(outcome = ?outcome, "Attempt completed");
                counters.record_outcome(outcome);
                drop(guard);
            }
            .instrument(span),
        );
    }

    async fn handle_shutdown(orchestrator: &Arc<ArchivingOrchestrator>, grace: Duration) -> ShutdownReport {
        let cancelled_redrives = orchestrator.begin_shutdown();
        info!(
            cancelled_redrives,
            executing = orchestrator.activity().busy(),
            "Shutting down archiving processor"
        );

        let drained = orchestrator.activity().wait_idle(grace).await;
        if !drained {
            warn!(
                executing = orchestrator.activity().busy(),
                grace_ms = duration_ms(grace),
                "Attempts still running after shutdown grace period"
            );
        }

        ShutdownReport {
            cancelled_redrives,
            drained,
            pending_tasks: orchestrator.registry().len(),
        }
    }
}

/// Cloneable front end to a running [`ArchivingProcessor`]
#[derive(Debug, Clone)]
pub struct ArchivingHandle {
    commands: mpsc::Sender<ArchivingCommand>,
}

impl ArchivingHandle {
    pub fn new(commands: mpsc::Sender<ArchivingCommand>) -> Self {
        Self { commands }
    }

    pub fn sender(&self) -> mpsc::Sender<ArchivingCommand> {
        self.commands.clone()
    }

    pub async fn archive(&self, key: impl Into<String>, request: ArchivalRequest) -> Result<()> {
        self.send(ArchivingCommand::Archive {
            key: key.into(),
            request,
        })
        .await
    }

    pub async fn list_tasks(&self) -> Result<Vec<TaskSnapshot>> {
        let (resp, rx) = oneshot::channel();
        self.send(ArchivingCommand::ListTasks { resp }).await?;
        Self::receive(rx).await
    }

    pub async fn stats(&self) -> Result<ArchivingProcessingStats> {
        let (resp, rx) = oneshot::channel();
        self.send(ArchivingCommand::GetStats { resp }).await?;
        Self::receive(rx).await
    }

    pub async fn shutdown(&self) -> Result<ShutdownReport> {
        let (resp, rx) = oneshot::channel();
        self.send(ArchivingCommand::Shutdown { resp }).await?;
        Self::receive(rx).await
    }

    async fn send(&self, command: ArchivingCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ArchiverError::channel_closed("archiving_processor"))
    }

    async fn receive<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        rx.await
            .map_err(|_| ArchiverError::channel_closed("archiving_processor"))?
    }
}
