//! Data models for the content store
//!
//! File records and their typed payloads, the access log, and the request/response
//! shapes of the upload pipeline.

mod access;
mod file;
mod upload;
mod variant;

pub use access::{AccessRecord, AccessType};
pub use file::{stored_name_for, FileRecord, FileUpdate, ProcessingStatus, Thumbnail};
pub use upload::{
    BulkFile, BulkMode, BulkOptions, BulkUploadFailure, BulkUploadResult, FileUrls,
    StreamedContent, UploadMetadata, UploadOutcome,
};
pub use variant::{
    ArchiveProperties, AudioProperties, DocumentProperties, FileKind, FileVariant,
    ImageProperties, VideoProperties,
};
