use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage-side status of a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    Ok,
    NotFound,
    Deleted,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::NotFound => write!(f, "not-found"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// One file as returned by file storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    pub id: String,
    pub content: Option<Vec<u8>>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: FileStatus,
}

impl FileData {
    pub fn ok(id: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            content: Some(content.into()),
            created_at: Some(Utc::now()),
            status: FileStatus::Ok,
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: None,
            created_at: None,
            status: FileStatus::NotFound,
        }
    }

    pub fn deleted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: None,
            created_at: None,
            status: FileStatus::Deleted,
        }
    }

    pub fn size(&self) -> usize {
        self.content.as_ref().map_or(0, Vec::len)
    }
}
