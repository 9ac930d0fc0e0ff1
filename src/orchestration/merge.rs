//! # Fetch Merge
//!
//! Combines the per-variant lookup results of one attempt into a single
//! [`FetchOutcome`]. Precedence is fixed:
//!
//! 1. no results → `Ok` with no files
//! 2. any `Error` → `Error` (first message wins)
//! 3. all `Deleted` → `Deleted`
//! 4. any non-`Ok` → `NotFound`, carrying whatever files were returned
//! 5. otherwise `Ok` with the files concatenated in input order

use crate::models::FileData;

/// Result of retrieving the files for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Every variant retrieved with content
    Ok(Vec<FileData>),
    /// At least one variant missing or not ready
    NotFound(Vec<FileData>),
    /// Every variant already deleted, i.e. a prior attempt archived them
    Deleted,
    /// The retrieval call failed
    Error(String),
}

impl FetchOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Ok(_) => "ok",
            Self::NotFound(_) => "not-found",
            Self::Deleted => "deleted",
            Self::Error(_) => "error",
        }
    }

    /// Whether file storage answered meaningfully (ok or deleted)
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok(_) | Self::Deleted)
    }

    fn into_files(self) -> Vec<FileData> {
        match self {
            Self::Ok(files) | Self::NotFound(files) => files,
            Self::Deleted | Self::Error(_) => Vec::new(),
        }
    }
}

pub fn merge(outcomes: Vec<FetchOutcome>) -> FetchOutcome {
    if outcomes.is_empty() {
        return FetchOutcome::Ok(Vec::new());
    }

    if let Some(message) = outcomes.iter().find_map(|o| match o {
        FetchOutcome::Error(message) => Some(message.clone()),
        _ => None,
    }) {
        return FetchOutcome::Error(message);
    }

    if outcomes.iter().all(|o| matches!(o, FetchOutcome::Deleted)) {
        return FetchOutcome::Deleted;
    }

    let all_ok = outcomes.iter().all(|o| matches!(o, FetchOutcome::Ok(_)));
    let files: Vec<FileData> = outcomes
        .into_iter()
        .flat_map(FetchOutcome::into_files)
        .collect();

    if all_ok {
        FetchOutcome::Ok(files)
    } else {
        FetchOutcome::NotFound(files)
    }
}
