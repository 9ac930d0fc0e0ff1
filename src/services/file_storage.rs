//! File storage adapter.
//!
//! [`FileStorageClient`] is the raw transport seam (one lookup call, one
//! delete call). [`FileRetrievalService`] layers the archiving semantics on
//! top: one lookup per variant, concurrent, each under the fetch timeout,
//! merged into a single [`FetchOutcome`], with metrics recorded on the way.
//!
//! When file storage reports files as not found, an optional fallback source
//! (the submission service's own file API) is asked for the same variants.
//! The attempt only fails as not-found when both sources come up empty.
//! Deletion always targets file storage.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{with_timeout, RemoteError};
use crate::config::TimeoutsConfig;
use crate::metrics::{LatencyKind, MetricsSink};
use crate::models::{ArchivalRequest, FileData, FileStatus};
use crate::orchestration::merge::{merge, FetchOutcome};

/// Transport-level access to a file source
#[async_trait]
pub trait FileStorageClient: Send + Sync {
    /// Look up files by id, including content
    async fn find_files(&self, key: &str, file_ids: &[String]) -> Result<Vec<FileData>, RemoteError>;

    async fn delete_files(&self, key: &str, file_ids: &[String]) -> Result<(), RemoteError>;
}

/// File operations as the orchestrator consumes them
#[async_trait]
pub trait FileService: Send + Sync {
    /// Retrieve every variant of the request and merge the per-file results
    async fn fetch_files(&self, key: &str, request: &ArchivalRequest) -> FetchOutcome;

    /// Delete every variant of the request. Callers treat failure as non-fatal.
    async fn delete_files(&self, key: &str, request: &ArchivalRequest) -> Result<(), RemoteError>;
}

pub struct FileRetrievalService {
    client: Arc<dyn FileStorageClient>,
    fallback: Option<Arc<dyn FileStorageClient>>,
    metrics: Arc<dyn MetricsSink>,
    fetch_timeout: Duration,
    delete_timeout: Duration,
}

impl std::fmt::Debug for FileRetrievalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRetrievalService")
            .field("has_fallback", &self.fallback.is_some())
            .field("fetch_timeout", &self.fetch_timeout)
            .field("delete_timeout", &self.delete_timeout)
            .finish()
    }
}

impl FileRetrievalService {
    pub fn new(
        client: Arc<dyn FileStorageClient>,
        metrics: Arc<dyn MetricsSink>,
        timeouts: &TimeoutsConfig,
    ) -> Self {
        Self {
            client,
            fallback: None,
            metrics,
            fetch_timeout: timeouts.fetch(),
            delete_timeout: timeouts.delete(),
        }
    }

    /// Source asked when file storage reports files as not found
    pub fn with_fallback(mut self, fallback: Arc<dyn FileStorageClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    async fn fetch_from(&self, source: &dyn FileStorageClient, key: &str, file_ids: &[String]) -> FetchOutcome {
        let calls = file_ids
            .iter()
            .map(|id| self.fetch_one(source, key, id.clone()));
        merge(join_all(calls).await)
    }

    async fn fetch_one(&self, source: &dyn FileStorageClient, key: &str, file_id: String) -> FetchOutcome {
        let ids = [file_id];
        let call = with_timeout("fetch", self.fetch_timeout, source.find_files(key, &ids));

        match call.await {
            Ok(files) => classify(files),
            Err(err) => FetchOutcome::Error(err.to_string()),
        }
    }
}

/// Outcome of a single lookup call. An empty answer counts as deleted.
fn classify(files: Vec<FileData>) -> FetchOutcome {
    if files.iter().all(|f| f.status == FileStatus::Deleted) {
        return FetchOutcome::Deleted;
    }
    if files.iter().any(|f| f.status != FileStatus::Ok) {
        return FetchOutcome::NotFound(files);
    }
    FetchOutcome::Ok(files)
}

#[async_trait]
impl FileService for FileRetrievalService {
    async fn fetch_files(&self, key: &str, request: &ArchivalRequest) -> FetchOutcome {
        let started = Instant::now();
        let file_ids = request.file_ids();
        info!(key = %key, file_ids = ?file_ids, "Getting files from file storage");

        let mut merged = self.fetch_from(self.client.as_ref(), key, &file_ids).await;
        if let (FetchOutcome::NotFound(_), Some(fallback)) = (&merged, &self.fallback) {
            info!(key = %key, "Files not found in file storage, asking fallback source");
            merged = self.fetch_from(fallback.as_ref(), key, &file_ids).await;
        }

        self.metrics
            .observe_latency(LatencyKind::Fetch, started.elapsed());
        match &merged {
            FetchOutcome::Ok(files) => {
                self.metrics.fetch_succeeded();
                info!(
                    key = %key,
                    files = files.len(),
                    bytes = files.iter().map(FileData::size).sum::<usize>(),
                    "Received files"
                );
            }
            FetchOutcome::Deleted => {
                self.metrics.fetch_succeeded();
                info!(key = %key, "All files already deleted");
            }
            FetchOutcome::NotFound(files) => {
                self.metrics.fetch_failed();
                let missing: Vec<&str> = files
                    .iter()
                    .filter(|f| f.status != FileStatus::Ok)
                    .map(|f| f.id.as_str())
                    .collect();
                warn!(key = %key, missing = ?missing, "Files not found");
            }
            FetchOutcome::Error(message) => {
                self.metrics.fetch_failed();
                warn!(key = %key, error = %message, "Failed to get files");
            }
        }
        merged
    }

    async fn delete_files(&self, key: &str, request: &ArchivalRequest) -> Result<(), RemoteError> {
        let started = Instant::now();
        let file_ids = request.file_ids();
        debug!(key = %key, file_ids = ?file_ids, "Deleting files from file storage");

        let result = with_timeout(
            "delete",
            self.delete_timeout,
            self.client.delete_files(key, &file_ids),
        )
        .await;

        self.metrics
            .observe_latency(LatencyKind::Delete, started.elapsed());
        match &result {
            Ok(()) => {
                self.metrics.delete_succeeded();
                info!(key = %key, file_ids = ?file_ids, "Deleted files from file storage");
            }
            Err(_) => self.metrics.delete_failed(),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ArchivingMetrics;
    use crate::testing::{sample_request, MockFileStorage};

    fn service(storage: MockFileStorage) -> (FileRetrievalService, Arc<ArchivingMetrics>) {
        let metrics = Arc::new(ArchivingMetrics::new());
        let service = FileRetrievalService::new(
            Arc::new(storage),
            metrics.clone(),
            &TimeoutsConfig::default(),
        );
        (service, metrics)
    }

    fn service_with_fallback(
        storage: MockFileStorage,
        fallback: MockFileStorage,
    ) -> (FileRetrievalService, Arc<ArchivingMetrics>) {
        let (service, metrics) = service(storage);
        (service.with_fallback(Arc::new(fallback)), metrics)
    }

    #[test]
    fn test_classify_single_call() {
        assert_eq!(classify(vec![]), FetchOutcome::Deleted);
        assert_eq!(
            classify(vec![FileData::deleted("a"), FileData::deleted("b")]),
            FetchOutcome::Deleted
        );
        assert!(matches!(
            classify(vec![FileData::ok("a", b"x".to_vec()), FileData::deleted("b")]),
            FetchOutcome::NotFound(_)
        ));
        assert!(matches!(
            classify(vec![FileData::ok("a", b"x".to_vec())]),
            FetchOutcome::Ok(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_merges_each_variant() {
        let request = sample_request("key-1", &["f1", "f2"]);
        let (service, metrics) = service(MockFileStorage::new());

        let outcome = service.fetch_files("key-1", &request).await;

        match outcome {
            FetchOutcome::Ok(files) => {
                let ids: Vec<_> = files.iter().map(|f| f.id.as_str()).collect();
                assert_eq!(ids, vec!["f1", "f2"]);
            }
            other => panic!("expected ok, got {other:?}"),
        }
        assert_eq!(metrics.snapshot().fetch_successes, 1);
    }

    #[tokio::test]
    async fn test_fetch_counts_not_found_as_error() {
        let request = sample_request("key-2", &["f1", "f2"]);
        let storage = MockFileStorage::new().with_missing("f2");
        let (service, metrics) = service(storage);

        let outcome = service.fetch_files("key-2", &request).await;

        assert!(matches!(outcome, FetchOutcome::NotFound(_)));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fetch_errors, 1);
        assert_eq!(snapshot.fetch_successes, 0);
    }

    #[tokio::test]
    async fn test_delete_failure_is_counted_and_returned() {
        let request = sample_request("key-3", &["f1"]);
        let storage = MockFileStorage::new().with_failing_deletes();
        let (service, metrics) = service(storage);

        assert!(service.delete_files("key-3", &request).await.is_err());
        assert_eq!(metrics.snapshot().delete_errors, 1);
    }

    #[tokio::test]
    async fn test_empty_answer_counts_as_deleted() {
        let request = sample_request("key-4", &["f1"]);
        let (service, metrics) = service(MockFileStorage::new().with_empty_answers());

        assert_eq!(service.fetch_files("key-4", &request).await, FetchOutcome::Deleted);
        assert_eq!(metrics.snapshot().fetch_successes, 1);
    }

    #[tokio::test]
    async fn test_fallback_supplies_files_missing_from_storage() {
        let request = sample_request("key-5", &["f1", "f2"]);
        let storage = MockFileStorage::new().with_missing("f2");
        let fallback = MockFileStorage::new();
        let (service, metrics) = service_with_fallback(storage.clone(), fallback.clone());

        let outcome = service.fetch_files("key-5", &request).await;

        assert!(matches!(outcome, FetchOutcome::Ok(ref files) if files.len() == 2));
        assert_eq!(storage.fetch_count(), 2);
        assert_eq!(fallback.fetch_count(), 2);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fetch_successes, 1);
        assert_eq!(snapshot.fetch_errors, 0);
    }

    #[tokio::test]
    async fn test_not_found_in_both_sources() {
        let request = sample_request("key-6", &["f1"]);
        let storage = MockFileStorage::new().with_missing("f1");
        let fallback = MockFileStorage::new().with_missing("f1");
        let (service, metrics) = service_with_fallback(storage, fallback.clone());

        let outcome = service.fetch_files("key-6", &request).await;

        assert!(matches!(outcome, FetchOutcome::NotFound(_)));
        assert_eq!(fallback.fetch_count(), 1);
        assert_eq!(metrics.snapshot().fetch_errors, 1);
    }

    #[tokio::test]
    async fn test_fallback_error_fails_the_fetch() {
        let request = sample_request("key-7", &["f1"]);
        let storage = MockFileStorage::new().with_missing("f1");
        let fallback = MockFileStorage::new().with_failing_fetches();
        let (service, metrics) = service_with_fallback(storage, fallback);

        let outcome = service.fetch_files("key-7", &request).await;

        assert!(matches!(outcome, FetchOutcome::Error(_)));
        assert_eq!(metrics.snapshot().fetch_errors, 1);
    }

    #[tokio::test]
    async fn test_fallback_not_asked_unless_storage_reports_not_found() {
        let request = sample_request("key-8", &["f1"]);
        let fallback = MockFileStorage::new();

        let (found, _) = service_with_fallback(MockFileStorage::new(), fallback.clone());
        assert!(matches!(found.fetch_files("key-8", &request).await, FetchOutcome::Ok(_)));

        let (failing, _) = service_with_fallback(MockFileStorage::new().with_failing_fetches(), fallback.clone());
        assert!(matches!(failing.fetch_files("key-8", &request).await, FetchOutcome::Error(_)));

        let (deleted, _) = service_with_fallback(MockFileStorage::new().with_deleted("f1"), fallback.clone());
        assert_eq!(deleted.fetch_files("key-8", &request).await, FetchOutcome::Deleted);

        assert_eq!(fallback.fetch_count(), 0);
    }
}
