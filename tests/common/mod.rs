//! Shared harness for archiving integration tests.

#![allow(dead_code)]

use archiver_core::config::{ArchiverConfig, ConfigManager};
use archiver_core::constants::ProcessingEventType;
use archiver_core::messaging::{encode_request, InboundRecord};
use archiver_core::metrics::{ArchivingMetrics, MetricsSnapshot};
use archiver_core::models::ArchivalRequest;
use archiver_core::orchestration::{ArchiverSystem, SystemDependencies};
use archiver_core::services::FileStorageClient;
use archiver_core::testing::{wait_until, MockArchive, MockFileStorage, RecordingPublisher};
use std::sync::Arc;
use std::time::Duration;

pub use archiver_core::testing::sample_request;

/// Generous bound for zero-delay ladders
pub const SETTLE: Duration = Duration::from_secs(5);

pub struct Harness {
    pub system: ArchiverSystem,
    pub storage: MockFileStorage,
    pub archive: MockArchive,
    pub publisher: RecordingPublisher,
    pub metrics: Arc<ArchivingMetrics>,
}

impl Harness {
    /// Start with the test configuration (all-zero ladder of production length)
    pub fn start(storage: MockFileStorage, archive: MockArchive) -> Self {
        Self::start_with(ConfigManager::for_testing(), storage, archive)
    }

    pub fn start_with_delays(delays: &[u64], storage: MockFileStorage, archive: MockArchive) -> Self {
        let mut config = ArchiverConfig::for_environment("test");
        config.retry.delays_seconds = delays.to_vec();
        let manager = ConfigManager::from_config(config).expect("valid test config");
        Self::start_with(manager, storage, archive)
    }

    pub fn start_with(config: Arc<ConfigManager>, storage: MockFileStorage, archive: MockArchive) -> Self {
        Self::assemble(config, storage, None, archive)
    }

    /// Start with a fallback file source behind file storage
    pub fn start_with_fallback(
        storage: MockFileStorage,
        fallback: MockFileStorage,
        archive: MockArchive,
    ) -> Self {
        Self::assemble(ConfigManager::for_testing(), storage, Some(fallback), archive)
    }

    fn assemble(
        config: Arc<ConfigManager>,
        storage: MockFileStorage,
        fallback: Option<MockFileStorage>,
        archive: MockArchive,
    ) -> Self {
        let publisher = RecordingPublisher::new();
        let metrics = Arc::new(ArchivingMetrics::new());
        let system = ArchiverSystem::start(
            config,
            SystemDependencies {
                file_storage: Arc::new(storage.clone()),
                fallback_storage: fallback
                    .map(|source| Arc::new(source) as Arc<dyn FileStorageClient>),
                archive: Arc::new(archive.clone()),
                publisher: Arc::new(publisher.clone()),
                metrics: metrics.clone(),
            },
        )
        .expect("system starts");

        Self {
            system,
            storage,
            archive,
            publisher,
            metrics,
        }
    }

    pub async fn submit(&self, key: &str, request: &ArchivalRequest) {
        let record = encode_request(key, request).expect("encodable request");
        self.system.submit(record).await.expect("processor running");
    }

    pub async fn submit_raw(&self, key: &str, payload: &[u8]) {
        self.system
            .submit(InboundRecord::new(key, payload.to_vec()))
            .await
            .expect("processor running");
    }

    /// Wait for a terminal event and for the key to leave the registry
    pub async fn wait_for_terminal(&self, key: &str) -> bool {
        self.wait_for_terminal_within(key, SETTLE).await
    }

    pub async fn wait_for_terminal_within(&self, key: &str, timeout: Duration) -> bool {
        wait_until(timeout, || {
            let terminal = self
                .publisher
                .events_for(key)
                .iter()
                .any(ProcessingEventType::is_terminal);
            terminal && !self.system.registry().contains(key)
        })
        .await
    }

    pub fn events(&self, key: &str) -> Vec<ProcessingEventType> {
        self.publisher.events_for(key)
    }

    pub fn count(&self, key: &str, event_type: ProcessingEventType) -> usize {
        self.publisher.count_events(key, event_type)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
