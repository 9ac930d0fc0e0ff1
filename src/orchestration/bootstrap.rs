//! # Archiver Bootstrap
//!
//! Wires the registry, scheduler, orchestrator, command processor and inbound
//! consumer together from an [`ArchiverConfig`] and the remote collaborators,
//! and exposes start, replay and shutdown for the assembled system.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use super::archiver::{ArchivingOrchestrator, Collaborators};
use super::backoff::BackoffScheduler;
use super::command_processor::{
    ArchivingHandle, ArchivingProcessingStats, ArchivingProcessor, ProcessingCounters,
    ShutdownReport,
};
use super::recovery::RecoveryPlanner;
use super::task_registry::TaskRegistry;
use crate::config::{ArchiverConfig, ConfigManager};
use crate::error::Result;
use crate::messaging::consumer::{InboundConsumer, InboundOutcome};
use crate::messaging::message::{BusRecord, InboundRecord};
use crate::messaging::publisher::StatusPublisher;
use crate::metrics::MetricsSink;
use crate::services::{ArchiveClient, FileRetrievalService, FileStorageClient};

/// External dependencies of the archiving system
#[derive(Clone)]
pub struct SystemDependencies {
    pub file_storage: Arc<dyn FileStorageClient>,
    /// Asked for files that file storage reports as not found
    pub fallback_storage: Option<Arc<dyn FileStorageClient>>,
    pub archive: Arc<dyn ArchiveClient>,
    pub publisher: Arc<dyn StatusPublisher>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// Running archiving system
pub struct ArchiverSystem {
    config: Arc<ConfigManager>,
    handle: ArchivingHandle,
    consumer: InboundConsumer,
    processor: ArchivingProcessor,
    registry: Arc<TaskRegistry>,
}

impl std::fmt::Debug for ArchiverSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiverSystem")
            .field("environment", &self.config.environment())
            .field("processor", &self.processor)
            .finish()
    }
}

impl ArchiverSystem {
    /// Assemble the system and start its command processor
    pub fn start(config: Arc<ConfigManager>, dependencies: SystemDependencies) -> Result<Self> {
        let settings: &ArchiverConfig = config.config();
        settings.validate()?;

        let (command_tx, command_rx) = mpsc::channel(settings.dispatch.command_buffer_size);
        let metrics = dependencies.metrics.clone();

        let registry = Arc::new(TaskRegistry::new(metrics.clone()));
        let scheduler = BackoffScheduler::new(settings.retry.ladder(), command_tx.clone(), metrics.clone());
        let mut files = FileRetrievalService::new(
            dependencies.file_storage,
            metrics.clone(),
            &settings.timeouts,
        );
        if let Some(fallback) = dependencies.fallback_storage {
            files = files.with_fallback(fallback);
        }
        let collaborators = Collaborators {
            files: Arc::new(files),
            archive: dependencies.archive,
            publisher: dependencies.publisher.clone(),
        };
        let orchestrator = Arc::new(ArchivingOrchestrator::new(
            registry.clone(),
            scheduler,
            collaborators,
            metrics,
            &settings.timeouts,
        ));

        let counters = Arc::new(ProcessingCounters::default());
        let mut processor =
            ArchivingProcessor::new(orchestrator, counters.clone(), command_rx, &settings.dispatch);
        processor.start()?;

        let consumer = InboundConsumer::new(command_tx.clone(), dependencies.publisher, counters);

        info!(
            service = %settings.telemetry.service_name,
            environment = %config.environment(),
            attempts = settings.retry.delays_seconds.len(),
            input_topic = %settings.topics.input,
            "Archiving system started"
        );

        Ok(Self {
            config,
            handle: ArchivingHandle::new(command_tx),
            consumer,
            processor,
            registry,
        })
    }

    pub fn config(&self) -> &ArchiverConfig {
        self.config.config()
    }

    pub fn handle(&self) -> ArchivingHandle {
        self.handle.clone()
    }

    pub fn consumer(&self) -> &InboundConsumer {
        &self.consumer
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Feed one input-topic record through the consumer
    pub async fn submit(&self, record: InboundRecord) -> Result<InboundOutcome> {
        self.consumer.handle(record).await
    }

    /// Re-submit every input record whose key never reached a terminal
    /// processing event. Returns the number of records re-submitted.
    pub async fn replay<I, P>(&self, inputs: I, processing_log: P) -> Result<usize>
    where
        I: IntoIterator<Item = InboundRecord>,
        P: IntoIterator<Item = BusRecord>,
    {
        let mut planner = RecoveryPlanner::new();
        for record in processing_log {
            planner.observe_record(&record);
        }

        let planned = planner.plan(inputs);
        let count = planned.len();
        for record in planned {
            self.consumer.handle(record).await?;
        }
        Ok(count)
    }

    pub async fn stats(&self) -> Result<ArchivingProcessingStats> {
        self.handle.stats().await
    }

    /// Stop the processor, waiting for running attempts within the grace period
    pub async fn shutdown(mut self) -> Result<ShutdownReport> {
        let report = self.handle.shutdown().await?;
        self.processor.join().await;
        info!(
            drained = report.drained,
            pending_tasks = report.pending_tasks,
            "Archiving system stopped"
        );
        Ok(report)
    }
}
