//! # Archiving Metrics
//!
//! The core records counters, gauges and latencies through the
//! [`MetricsSink`] trait so that it never depends on a global registry.
//! [`ArchivingMetrics`] is the production sink: it keeps readable atomic
//! counters and mirrors every update onto OpenTelemetry instruments obtained
//! from the global meter provider.
//!
//! ## Usage
//!
//! ```rust
//! use archiver_core::metrics::{ArchivingMetrics, LatencyKind, MetricsSink};
//! use std::time::Duration;
//!
//! let metrics = ArchivingMetrics::new();
//! metrics.fetch_succeeded();
//! metrics.observe_latency(LatencyKind::Fetch, Duration::from_millis(12));
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.fetch_successes, 1);
//! ```

pub mod archiving;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TelemetryConfig;

pub use archiving::{ArchivingMetrics, LatencySummary, MetricsSnapshot};

/// Remote call categories (plus the end-to-end workflow) that get latency
/// observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatencyKind {
    Fetch,
    Delete,
    Archive,
    /// Task registration to terminal outcome
    Archiving,
}

impl LatencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "filestorage_get",
            Self::Delete => "filestorage_del",
            Self::Archive => "journal",
            Self::Archiving => "archiving",
        }
    }
}

impl fmt::Display for LatencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread-safe metrics contract consumed by the orchestration core
pub trait MetricsSink: Send + Sync {
    fn fetch_succeeded(&self);
    fn fetch_failed(&self);
    fn delete_succeeded(&self);
    fn delete_failed(&self);
    fn archive_succeeded(&self);
    fn archive_failed(&self);
    /// A new key entered the task registry
    fn task_added(&self);
    /// A key left the task registry
    fn task_removed(&self);
    /// The retry ladder was exhausted for a task
    fn task_given_up(&self);
    fn observe_latency(&self, kind: LatencyKind, elapsed: Duration);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn fetch_succeeded(&self) {}
    fn fetch_failed(&self) {}
    fn delete_succeeded(&self) {}
    fn delete_failed(&self) {}
    fn archive_succeeded(&self) {}
    fn archive_failed(&self) {}
    fn task_added(&self) {}
    fn task_removed(&self) {}
    fn task_given_up(&self) {}
    fn observe_latency(&self, _kind: LatencyKind, _elapsed: Duration) {}
}

/// Pick the sink for a configuration: [`ArchivingMetrics`] when telemetry is
/// enabled, [`NoopMetrics`] otherwise
pub fn sink_for(telemetry: &TelemetryConfig) -> Arc<dyn MetricsSink> {
    if telemetry.enabled {
        Arc::new(ArchivingMetrics::new())
    } else {
        Arc::new(NoopMetrics)
    }
}
