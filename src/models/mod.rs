pub mod archival_request;
pub mod file_data;

// Re-export core models for easy access
pub use archival_request::{ArchivalRequest, Document, Variant};
pub use file_data::{FileData, FileStatus};
