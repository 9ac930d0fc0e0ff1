#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Archiver Core
//!
//! Archiving orchestrator for submitted applications. It consumes
//! "application submitted" events from the message bus, retrieves the
//! referenced files from file storage, submits them to the journal service,
//! deletes the source files and reports progress back onto the bus.
//!
//! ## Architecture
//!
//! The retry/orchestration core is built from a few small pieces:
//!
//! - [`orchestration::TaskRegistry`] tracks every key in flight and serializes
//!   mutation per key
//! - [`orchestration::BackoffScheduler`] walks the retry ladder and re-drives
//!   failed attempts through the command channel
//! - [`orchestration::ArchivingOrchestrator`] runs one attempt: fetch, merge,
//!   submit, best-effort delete, status events
//! - [`orchestration::ArchivingProcessor`] is the single dispatch loop for
//!   inbound events, redrives, queries and shutdown
//!
//! Transport to the file storage service, the journal service and the broker
//! sits behind the traits in [`services`] and [`messaging`].
//!
//! ## Module Organization
//!
//! - [`config`] - Layered configuration (defaults, YAML, environment)
//! - [`constants`] - Processing event vocabulary and trace message prefixes
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//! - [`messaging`] - Inbound consumer, codec and status publisher
//! - [`metrics`] - Metrics sink trait and OpenTelemetry-backed implementation
//! - [`models`] - Archival request and file data types
//! - [`orchestration`] - Registry, scheduler, orchestrator and processor
//! - [`services`] - Remote collaborator traits
//! - [`testing`] - In-memory collaborator doubles
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use archiver_core::config::ConfigManager;
//! use archiver_core::messaging::InboundRecord;
//! use archiver_core::metrics::ArchivingMetrics;
//! use archiver_core::orchestration::{ArchiverSystem, SystemDependencies};
//! use archiver_core::testing::{MockArchive, MockFileStorage, RecordingPublisher};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let system = ArchiverSystem::start(
//!     ConfigManager::load()?,
//!     SystemDependencies {
//!         file_storage: Arc::new(MockFileStorage::new()),
//!         fallback_storage: None,
//!         archive: Arc::new(MockArchive::new()),
//!         publisher: Arc::new(RecordingPublisher::new()),
//!         metrics: Arc::new(ArchivingMetrics::new()),
//!     },
//! )?;
//!
//! system
//!     .submit(InboundRecord::new("key-1", br#"{"case_id": "..."}"#.to_vec()))
//!     .await?;
//!
//! let report = system.shutdown().await?;
//! println!("{} tasks left for replay", report.pending_tasks);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod services;
pub mod testing;

pub use config::{ArchiverConfig, ConfigManager, ConfigurationError};
pub use constants::ProcessingEventType;
pub use error::{ArchiverError, Result};
pub use metrics::{ArchivingMetrics, MetricsSink};
pub use models::{ArchivalRequest, FileData, FileStatus};
pub use orchestration::{ArchiverSystem, SystemDependencies};
