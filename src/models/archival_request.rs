//! # Archival Request
//!
//! The payload carried by an "application submitted" event: subject metadata
//! plus one or more logical documents, each with one or more file variants
//! that reference content held by the file storage service.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One submitted application, as received from the input topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalRequest {
    /// Case identifier assigned by the submitting system
    pub case_id: String,
    /// Identifier of the person the application concerns
    pub subject_id: String,
    /// Submission time, seconds since the Unix epoch
    pub submitted_at: i64,
    /// Archive category the journal entry is filed under
    pub archive_theme: String,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub form_number: String,
    #[serde(default)]
    pub is_main_form: bool,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// File-content id in file storage
    pub file_id: String,
    pub mime_type: String,
    pub file_name: String,
    pub variant_format: String,
}

impl ArchivalRequest {
    /// File ids of every variant, flattened in document order
    pub fn file_ids(&self) -> Vec<String> {
        self.documents
            .iter()
            .flat_map(|document| document.variants.iter().map(|v| v.file_id.clone()))
            .collect()
    }

    pub fn submitted_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.submitted_at, 0).single()
    }

    /// Title of the main form, falling back to the first document
    pub fn main_title(&self) -> Option<&str> {
        self.documents
            .iter()
            .find(|d| d.is_main_form)
            .or_else(|| self.documents.first())
            .map(|d| d.title.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn variant(file_id: &str) -> Variant {
        Variant {
            file_id: file_id.to_string(),
            mime_type: "application/pdf".to_string(),
            file_name: format!("{file_id}.pdf"),
            variant_format: "ARKIV".to_string(),
        }
    }

    #[test]
    fn test_file_ids_flatten_in_document_order() {
        let request = ArchivalRequest {
            case_id: "case-1".to_string(),
            subject_id: "12345678901".to_string(),
            submitted_at: 1_600_000_000,
            archive_theme: "BIL".to_string(),
            documents: vec![
                Document {
                    title: "Main".to_string(),
                    form_number: "NAV 10-07.40".to_string(),
                    is_main_form: true,
                    variants: vec![variant("a"), variant("b")],
                },
                Document {
                    title: "Attachment".to_string(),
                    form_number: "N6".to_string(),
                    is_main_form: false,
                    variants: vec![variant("c")],
                },
            ],
        };

        assert_eq!(request.file_ids(), vec!["a", "b", "c"]);
        assert_eq!(request.main_title(), Some("Main"));
        assert!(request.submitted_at_utc().is_some());
    }

    #[test]
    fn test_deserializes_without_main_form_flag() {
        let value = json!({
            "case_id": "case-2",
            "subject_id": "10987654321",
            "submitted_at": 1_600_000_000,
            "archive_theme": "TSO",
            "documents": [{
                "title": "Application",
                "form_number": "NAV 11-12.10",
                "variants": [{
                    "file_id": "f-1",
                    "mime_type": "application/pdf",
                    "file_name": "application.pdf",
                    "variant_format": "ARKIV"
                }]
            }]
        });

        let request: ArchivalRequest = serde_json::from_value(value).unwrap();
        assert!(!request.documents[0].is_main_form);
        assert_eq!(request.main_title(), Some("Application"));
    }
}
