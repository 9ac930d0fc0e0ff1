//! Production metrics sink.
//!
//! Instrument names follow the Prometheus names the archiver has always
//! exported, under an `archiver.` prefix. Counters are also kept locally so
//! callers (and tests) can read them back through [`ArchivingMetrics::snapshot`].

use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use super::{LatencyKind, MetricsSink};
use crate::constants::APPLICATION_NAME;

/// Aggregated latency observations for one category
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl LatencySummary {
    pub fn mean(&self) -> Option<Duration> {
        (self.count > 0).then(|| self.total / self.count as u32)
    }
}

/// Point-in-time view of every metric
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub fetch_successes: u64,
    pub fetch_errors: u64,
    pub delete_successes: u64,
    pub delete_errors: u64,
    pub archive_successes: u64,
    pub archive_errors: u64,
    pub tasks_in_flight: i64,
    pub tasks_given_up: u64,
    pub latencies: HashMap<LatencyKind, LatencySummary>,
}

impl MetricsSnapshot {
    pub fn latency(&self, kind: LatencyKind) -> LatencySummary {
        self.latencies.get(&kind).copied().unwrap_or_default()
    }
}

struct Instruments {
    fetch_success: Counter<u64>,
    fetch_error: Counter<u64>,
    delete_success: Counter<u64>,
    delete_error: Counter<u64>,
    archive_success: Counter<u64>,
    archive_error: Counter<u64>,
    tasks: UpDownCounter<i64>,
    tasks_given_up: Counter<u64>,
    latency: Histogram<f64>,
}

impl Instruments {
    fn new(meter: &Meter) -> Self {
        Self {
            fetch_success: meter
                .u64_counter("archiver.filestorage.get.success")
                .with_description("Number of successful file retrievals from file storage")
                .build(),
            fetch_error: meter
                .u64_counter("archiver.filestorage.get.error")
                .with_description("Number of failing file retrievals from file storage")
                .build(),
            delete_success: meter
                .u64_counter("archiver.filestorage.del.success")
                .with_description("Number of successful file deletions from file storage")
                .build(),
            delete_error: meter
                .u64_counter("archiver.filestorage.del.error")
                .with_description("Number of failing file deletions from file storage")
                .build(),
            archive_success: meter
                .u64_counter("archiver.journal.success")
                .with_description("Number of successes when sending to the journal service")
                .build(),
            archive_error: meter
                .u64_counter("archiver.journal.error")
                .with_description("Number of errors when sending to the journal service")
                .build(),
            tasks: meter
                .i64_up_down_counter("archiver.tasks")
                .with_description("Number of tasks in progress")
                .build(),
            tasks_given_up: meter
                .u64_counter("archiver.tasks.given_up")
                .with_description("Number of tasks given up on")
                .build(),
            latency: meter
                .f64_histogram("archiver.latency")
                .with_description("Latency of archiving operations in milliseconds")
                .with_unit("ms")
                .build(),
        }
    }
}

/// Atomic counters mirrored onto OpenTelemetry instruments
pub struct ArchivingMetrics {
    fetch_successes: AtomicU64,
    fetch_errors: AtomicU64,
    delete_successes: AtomicU64,
    delete_errors: AtomicU64,
    archive_successes: AtomicU64,
    archive_errors: AtomicU64,
    tasks_in_flight: AtomicI64,
    tasks_given_up: AtomicU64,
    latencies: Mutex<HashMap<LatencyKind, LatencySummary>>,
    instruments: Instruments,
    labels: [KeyValue; 1],
}

impl std::fmt::Debug for ArchivingMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivingMetrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl Default for ArchivingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchivingMetrics {
    /// Create a sink bound to the global meter provider
    pub fn new() -> Self {
        Self::with_meter(&opentelemetry::global::meter("archiver-core"))
    }

    pub fn with_meter(meter: &Meter) -> Self {
        Self {
            fetch_successes: AtomicU64::new(0),
            fetch_errors: AtomicU64::new(0),
            delete_successes: AtomicU64::new(0),
            delete_errors: AtomicU64::new(0),
            archive_successes: AtomicU64::new(0),
            archive_errors: AtomicU64::new(0),
            tasks_in_flight: AtomicI64::new(0),
            tasks_given_up: AtomicU64::new(0),
            latencies: Mutex::new(HashMap::new()),
            instruments: Instruments::new(meter),
            labels: [KeyValue::new("app", APPLICATION_NAME)],
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetch_successes: self.fetch_successes.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            delete_successes: self.delete_successes.load(Ordering::Relaxed),
            delete_errors: self.delete_errors.load(Ordering::Relaxed),
            archive_successes: self.archive_successes.load(Ordering::Relaxed),
            archive_errors: self.archive_errors.load(Ordering::Relaxed),
            tasks_in_flight: self.tasks_in_flight.load(Ordering::Relaxed),
            tasks_given_up: self.tasks_given_up.load(Ordering::Relaxed),
            latencies: self.latencies.lock().clone(),
        }
    }

    fn bump(&self, local: &AtomicU64, exported: &Counter<u64>) {
        local.fetch_add(1, Ordering::Relaxed);
        exported.add(1, &self.labels);
    }
}

impl MetricsSink for ArchivingMetrics {
    fn fetch_succeeded(&self) {
        self.bump(&self.fetch_successes, &self.instruments.fetch_success);
    }

    fn fetch_failed(&self) {
        self.bump(&self.fetch_errors, &self.instruments.fetch_error);
    }

    fn delete_succeeded(&self) {
        self.bump(&self.delete_successes, &self.instruments.delete_success);
    }

    fn delete_failed(&self) {
        self.bump(&self.delete_errors, &self.instruments.delete_error);
    }

    fn archive_succeeded(&self) {
        self.bump(&self.archive_successes, &self.instruments.archive_success);
    }

    fn archive_failed(&self) {
        self.bump(&self.archive_errors, &self.instruments.archive_error);
    }

    fn task_added(&self) {
        self.tasks_in_flight.fetch_add(1, Ordering::Relaxed);
        self.instruments.tasks.add(1, &self.labels);
    }

    fn task_removed(&self) {
        self.tasks_in_flight.fetch_sub(1, Ordering::Relaxed);
        self.instruments.tasks.add(-1, &self.labels);
    }

    fn task_given_up(&self) {
        self.bump(&self.tasks_given_up, &self.instruments.tasks_given_up);
    }

    fn observe_latency(&self, kind: LatencyKind, elapsed: Duration) {
        {
            let mut latencies = self.latencies.lock();
            let summary = latencies.entry(kind).or_default();
            summary.count += 1;
            summary.total += elapsed;
            summary.max = summary.max.max(elapsed);
        }

        self.instruments.latency.record(
            elapsed.as_secs_f64() * 1000.0,
            &[
                self.labels[0].clone(),
                KeyValue::new("operation", kind.as_str()),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_independently() {
        let metrics = ArchivingMetrics::new();

        metrics.fetch_succeeded();
        metrics.fetch_succeeded();
        metrics.fetch_failed();
        metrics.archive_failed();
        metrics.delete_succeeded();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fetch_successes, 2);
        assert_eq!(snapshot.fetch_errors, 1);
        assert_eq!(snapshot.archive_errors, 1);
        assert_eq!(snapshot.archive_successes, 0);
        assert_eq!(snapshot.delete_successes, 1);
        assert_eq!(snapshot.delete_errors, 0);
    }

    #[test]
    fn test_task_gauge_goes_up_and_down() {
        let metrics = ArchivingMetrics::new();

        metrics.task_added();
        metrics.task_added();
        metrics.task_removed();
        metrics.task_given_up();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_in_flight, 1);
        assert_eq!(snapshot.tasks_given_up, 1);
    }

    #[test]
    fn test_latency_summary_tracks_count_and_max() {
        let metrics = ArchivingMetrics::new();

        metrics.observe_latency(LatencyKind::Archive, Duration::from_millis(10));
        metrics.observe_latency(LatencyKind::Archive, Duration::from_millis(30));

        let summary = metrics.snapshot().latency(LatencyKind::Archive);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.max, Duration::from_millis(30));
        assert_eq!(summary.mean(), Some(Duration::from_millis(20)));
        assert_eq!(
            metrics.snapshot().latency(LatencyKind::Delete),
            LatencySummary::default()
        );
    }
}
