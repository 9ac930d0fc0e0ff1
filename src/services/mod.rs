//! # Remote Service Adapters
//!
//! Boundary traits for the collaborators the archiving core talks to: the
//! file storage service (fetch and delete), the fallback file source consulted
//! when file storage has nothing, and the journal service (submit).
//! Transport concerns live behind these traits; the core only sees typed
//! outcomes and [`RemoteError`].

pub mod archive;
pub mod file_storage;

use thiserror::Error;

use crate::orchestration::duration_ms;

pub use archive::{ArchiveClient, ArchiveError, JournalDocument, JournalEntry, JournalVariant};
pub use file_storage::{FileRetrievalService, FileService, FileStorageClient};

/// A collaborator call failed in a retry-eligible way
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{operation} unavailable: {message}")]
    Unavailable { operation: String, message: String },

    #[error("{operation} returned an invalid response: {message}")]
    InvalidResponse { operation: String, message: String },
}

impl RemoteError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an unavailable error
    pub fn unavailable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            Self::Timeout { operation, .. }
            | Self::Unavailable { operation, .. }
            | Self::InvalidResponse { operation, .. } => operation,
        }
    }
}

/// Run a remote call under a deadline, mapping expiry to [`RemoteError::Timeout`]
pub(crate) async fn with_timeout<T, F>(
    operation: &str,
    timeout: std::time::Duration,
    call: F,
) -> Result<T, RemoteError>
where
    F: std::future::Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::timeout(operation, duration_ms(timeout))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_with_timeout_maps_expiry() {
        let result: Result<(), RemoteError> =
            with_timeout("fetch", Duration::from_millis(5), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(RemoteError::timeout("fetch", 5)));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through_inner_error() {
        let result: Result<(), RemoteError> =
            with_timeout("delete", Duration::from_secs(1), async {
                Err(RemoteError::unavailable("delete", "connection refused"))
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.operation(), "delete");
        assert!(err.to_string().contains("connection refused"));
    }
}
