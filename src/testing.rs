//! In-memory doubles for the remote collaborators.
//!
//! Each double keeps its state behind `Arc<Mutex<..>>` so a clone can be
//! handed to the system while the test keeps another for assertions through
//! `get_state()`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::ProcessingEventType;
use crate::messaging::errors::PublishError;
use crate::messaging::message::MetricEvent;
use crate::messaging::publisher::StatusPublisher;
use crate::models::{ArchivalRequest, Document, FileData, Variant};
use crate::services::{ArchiveClient, ArchiveError, FileStorageClient, JournalEntry, RemoteError};

/// Request with one document holding one variant per file id
pub fn sample_request(key: &str, file_ids: &[&str]) -> ArchivalRequest {
    ArchivalRequest {
        case_id: format!("case-{key}"),
        subject_id: "12345678901".to_string(),
        submitted_at: 1_600_000_000,
        archive_theme: "BIL".to_string(),
        documents: vec![Document {
            title: "Application".to_string(),
            form_number: "NAV 10-07.40".to_string(),
            is_main_form: true,
            variants: file_ids
                .iter()
                .map(|id| Variant {
                    file_id: (*id).to_string(),
                    mime_type: "application/pdf".to_string(),
                    file_name: format!("{id}.pdf"),
                    variant_format: "ARKIV".to_string(),
                })
                .collect(),
        }],
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockFileStorageState {
    /// File ids requested, one entry per lookup call
    pub fetch_calls: Vec<Vec<String>>,
    /// File ids deleted, one entry per delete call
    pub delete_calls: Vec<Vec<String>>,
    pub missing: HashSet<String>,
    pub deleted: HashSet<String>,
    /// Lookup calls that fail before lookups start succeeding
    pub fetch_failures_remaining: u32,
    pub always_fail_fetch: bool,
    /// Answer every lookup with an empty list
    pub empty_answers: bool,
    pub fail_deletes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockFileStorage {
    state: Arc<Mutex<MockFileStorageState>>,
    fetch_delay: Option<Duration>,
}

impl MockFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `file_id` as not found
    pub fn with_missing(self, file_id: &str) -> Self {
        self.state.lock().missing.insert(file_id.to_string());
        self
    }

    /// Report `file_id` as already deleted
    pub fn with_deleted(self, file_id: &str) -> Self {
        self.state.lock().deleted.insert(file_id.to_string());
        self
    }

    pub fn with_fetch_failures(self, count: u32) -> Self {
        self.state.lock().fetch_failures_remaining = count;
        self
    }

    pub fn with_failing_fetches(self) -> Self {
        self.state.lock().always_fail_fetch = true;
        self
    }

    pub fn with_empty_answers(self) -> Self {
        self.state.lock().empty_answers = true;
        self
    }

    pub fn with_failing_deletes(self) -> Self {
        self.state.lock().fail_deletes = true;
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Make previously missing files available
    pub fn make_available(&self, file_id: &str) {
        self.state.lock().missing.remove(file_id);
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetch_calls.len()
    }

    pub fn delete_count(&self) -> usize {
        self.state.lock().delete_calls.len()
    }

    pub fn get_state(&self) -> MockFileStorageState {
        self.state.lock().clone()
    }
}

#[async_trait]
impl FileStorageClient for MockFileStorage {
    async fn find_files(&self, _key: &str, file_ids: &[String]) -> Result<Vec<FileData>, RemoteError> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.fetch_calls.push(file_ids.to_vec());
        if state.always_fail_fetch {
            return Err(RemoteError::unavailable("fetch", "file storage unavailable"));
        }
        if state.fetch_failures_remaining > 0 {
            state.fetch_failures_remaining -= 1;
            return Err(RemoteError::unavailable("fetch", "file storage unavailable"));
        }
        if state.empty_answers {
            return Ok(Vec::new());
        }

        Ok(file_ids
            .iter()
            .map(|id| {
                if state.missing.contains(id) {
                    FileData::not_found(id.as_str())
                } else if state.deleted.contains(id) {
                    FileData::deleted(id.as_str())
                } else {
                    FileData::ok(id.as_str(), format!("content of {id}").into_bytes())
                }
            })
            .collect())
    }

    async fn delete_files(&self, _key: &str, file_ids: &[String]) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.delete_calls.push(file_ids.to_vec());
        if state.fail_deletes {
            return Err(RemoteError::unavailable("delete", "file storage unavailable"));
        }
        for id in file_ids {
            state.deleted.insert(id.clone());
        }
        Ok(())
    }
}

/// Scripted journal answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveResponse {
    Success,
    AlreadyArchived,
    Transient,
}

#[derive(Debug, Default, Clone)]
pub struct MockArchiveState {
    pub submissions: Vec<(String, JournalEntry)>,
    /// Answers consumed in order; once empty, `fallback` is used
    pub script: VecDeque<ArchiveResponse>,
    pub fallback: Option<ArchiveResponse>,
}

#[derive(Debug, Clone, Default)]
pub struct MockArchive {
    state: Arc<Mutex<MockArchiveState>>,
}

impl MockArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `count` submissions transiently
    pub fn failing_times(self, count: usize) -> Self {
        self.state
            .lock()
            .script
            .extend(std::iter::repeat(ArchiveResponse::Transient).take(count));
        self
    }

    pub fn always_failing(self) -> Self {
        self.state.lock().fallback = Some(ArchiveResponse::Transient);
        self
    }

    /// Answer every submission with "already archived"
    pub fn already_archived(self) -> Self {
        self.state.lock().fallback = Some(ArchiveResponse::AlreadyArchived);
        self
    }

    pub fn then(self, response: ArchiveResponse) -> Self {
        self.state.lock().script.push_back(response);
        self
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions.len()
    }

    pub fn get_state(&self) -> MockArchiveState {
        self.state.lock().clone()
    }
}

#[async_trait]
impl ArchiveClient for MockArchive {
    async fn submit(&self, key: &str, entry: &JournalEntry) -> Result<String, ArchiveError> {
        let mut state = self.state.lock();
        state.submissions.push((key.to_string(), entry.clone()));
        let response = state
            .script
            .pop_front()
            .or_else(|| state.fallback.clone())
            .unwrap_or(ArchiveResponse::Success);

        match response {
            ArchiveResponse::Success => Ok(format!("journal-{}", state.submissions.len())),
            ArchiveResponse::AlreadyArchived => Err(ArchiveError::already_archived(key)),
            ArchiveResponse::Transient => Err(ArchiveError::Transient(RemoteError::unavailable(
                "archive",
                "journal service unavailable",
            ))),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingPublisherState {
    pub events: Vec<(String, ProcessingEventType)>,
    pub messages: Vec<(String, String)>,
    pub metrics: Vec<(String, MetricEvent)>,
}

/// Publisher that records everything in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    state: Arc<Mutex<RecordingPublisherState>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_for(&self, key: &str) -> Vec<ProcessingEventType> {
        self.state
            .lock()
            .events
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, event)| *event)
            .collect()
    }

    pub fn count_events(&self, key: &str, event_type: ProcessingEventType) -> usize {
        self.events_for(key)
            .into_iter()
            .filter(|event| *event == event_type)
            .count()
    }

    pub fn messages_for(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .messages
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn metric_actions_for(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .metrics
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, metric)| metric.action.clone())
            .collect()
    }

    pub fn get_state(&self) -> RecordingPublisherState {
        self.state.lock().clone()
    }
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish_processing_event(
        &self,
        key: &str,
        event_type: ProcessingEventType,
    ) -> Result<(), PublishError> {
        self.state.lock().events.push((key.to_string(), event_type));
        Ok(())
    }

    async fn publish_message(&self, key: &str, message: &str) -> Result<(), PublishError> {
        self.state
            .lock()
            .messages
            .push((key.to_string(), message.to_string()));
        Ok(())
    }

    async fn publish_metric(&self, key: &str, metric: &MetricEvent) -> Result<(), PublishError> {
        self.state
            .lock()
            .metrics
            .push((key.to_string(), metric.clone()));
        Ok(())
    }
}
