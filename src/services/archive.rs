//! Journal (archive) service adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::RemoteError;
use crate::models::{ArchivalRequest, FileData};

/// Result of a submission that did not produce an archive id
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    /// A prior attempt already archived this key upstream
    #[error("Application {key} is already archived")]
    AlreadyArchived { key: String },

    #[error(transparent)]
    Transient(#[from] RemoteError),
}

impl ArchiveError {
    pub fn already_archived(key: impl Into<String>) -> Self {
        Self::AlreadyArchived { key: key.into() }
    }

    pub fn is_already_archived(&self) -> bool {
        matches!(self, Self::AlreadyArchived { .. })
    }
}

/// Submission to the journal service
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Create a journal entry and return its archive id
    async fn submit(&self, key: &str, entry: &JournalEntry) -> Result<String, ArchiveError>;
}

/// Body of a journal submission: request metadata joined with file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub case_id: String,
    pub subject_id: String,
    pub archive_theme: String,
    pub title: String,
    pub submitted_at: i64,
    pub documents: Vec<JournalDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDocument {
    pub title: String,
    pub form_number: String,
    pub variants: Vec<JournalVariant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalVariant {
    pub file_name: String,
    pub mime_type: String,
    pub variant_format: String,
    pub content: Vec<u8>,
}

impl JournalEntry {
    /// Pair each variant with its fetched content.
    ///
    /// The main form is placed first. A variant without content is an
    /// invalid fetch result and fails the attempt.
    pub fn build(request: &ArchivalRequest, files: &[FileData]) -> Result<Self, RemoteError> {
        let contents: HashMap<&str, &[u8]> = files
            .iter()
            .filter_map(|f| f.content.as_deref().map(|c| (f.id.as_str(), c)))
            .collect();

        let mut ordered: Vec<_> = request.documents.iter().collect();
        ordered.sort_by_key(|d| !d.is_main_form);

        let documents = ordered
            .into_iter()
            .map(|document| {
                let variants = document
                    .variants
                    .iter()
                    .map(|variant| {
                        let content = contents.get(variant.file_id.as_str()).ok_or_else(|| {
                            RemoteError::invalid_response(
                                "fetch",
                                format!("no content for file {}", variant.file_id),
                            )
                        })?;
                        Ok(JournalVariant {
                            file_name: variant.file_name.clone(),
                            mime_type: variant.mime_type.clone(),
                            variant_format: variant.variant_format.clone(),
                            content: content.to_vec(),
                        })
                    })
                    .collect::<Result<Vec<_>, RemoteError>>()?;

                Ok(JournalDocument {
                    title: document.title.clone(),
                    form_number: document.form_number.clone(),
                    variants,
                })
            })
            .collect::<Result<Vec<_>, RemoteError>>()?;

        Ok(Self {
            case_id: request.case_id.clone(),
            subject_id: request.subject_id.clone(),
            archive_theme: request.archive_theme.clone(),
            title: request.main_title().unwrap_or_default().to_string(),
            submitted_at: request.submitted_at,
            documents,
        })
    }

    pub fn variant_count(&self) -> usize {
        self.documents.iter().map(|d| d.variants.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Variant};

    fn variant(file_id: &str) -> Variant {
        Variant {
            file_id: file_id.to_string(),
            mime_type: "application/pdf".to_string(),
            file_name: format!("{file_id}.pdf"),
            variant_format: "ARKIV".to_string(),
        }
    }

    fn request() -> ArchivalRequest {
        ArchivalRequest {
            case_id: "case-9".to_string(),
            subject_id: "12345678901".to_string(),
            submitted_at: 1_600_000_000,
            archive_theme: "BIL".to_string(),
            documents: vec![
                Document {
                    title: "Attachment".to_string(),
                    form_number: "N6".to_string(),
                    is_main_form: false,
                    variants: vec![variant("b")],
                },
                Document {
                    title: "Main".to_string(),
                    form_number: "NAV 10-07.40".to_string(),
                    is_main_form: true,
                    variants: vec![variant("a")],
                },
            ],
        }
    }

    #[test]
    fn test_build_places_main_form_first() {
        let files = vec![FileData::ok("a", b"main".to_vec()), FileData::ok("b", b"att".to_vec())];

        let entry = JournalEntry::build(&request(), &files).unwrap();

        assert_eq!(entry.title, "Main");
        assert_eq!(entry.documents[0].title, "Main");
        assert_eq!(entry.documents[0].variants[0].content, b"main".to_vec());
        assert_eq!(entry.variant_count(), 2);
    }

    #[test]
    fn test_build_rejects_missing_content() {
        let files = vec![FileData::ok("a", b"main".to_vec())];

        let err = JournalEntry::build(&request(), &files).unwrap_err();
        assert!(err.to_string().contains("no content for file b"));
    }

    #[test]
    fn test_already_archived_is_distinguishable() {
        assert!(ArchiveError::already_archived("k").is_already_archived());
        let transient: ArchiveError = RemoteError::timeout("archive", 10).into();
        assert!(!transient.is_already_archived());
    }
}
