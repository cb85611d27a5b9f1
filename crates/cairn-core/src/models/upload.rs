use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::file::FileRecord;

/// Caller-supplied description of an upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub original_name: String,
    pub content_type: String,
    pub folder_id: Option<Uuid>,
    pub is_public: bool,
    pub tags: BTreeMap<String, String>,
    pub uploaded_by: Option<Uuid>,
}

impl UploadMetadata {
    pub fn new(original_name: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            content_type: content_type.into(),
            ..Default::default()
        }
    }

    pub fn with_folder(mut self, folder_id: Uuid) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    pub fn with_user(mut self, user: Uuid) -> Self {
        self.uploaded_by = Some(user);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Result of a successful upload.
///
/// `Duplicate` means identical content was already stored; the existing record is
/// returned unchanged and nothing new was written.
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Created(FileRecord),
    Duplicate(FileRecord),
}

impl UploadOutcome {
    pub fn record(&self) -> &FileRecord {
        match self {
            UploadOutcome::Created(record) | UploadOutcome::Duplicate(record) => record,
        }
    }

    pub fn into_record(self) -> FileRecord {
        match self {
            UploadOutcome::Created(record) | UploadOutcome::Duplicate(record) => record,
        }
    }

    pub fn id(&self) -> Uuid {
        self.record().id
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, UploadOutcome::Duplicate(_))
    }
}

/// One file of a bulk upload.
#[derive(Debug, Clone)]
pub struct BulkFile {
    pub data: Bytes,
    pub metadata: UploadMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Default)]
pub struct BulkOptions {
    pub mode: BulkMode,
    /// Overrides the configured bulk concurrency for this call
    pub concurrency: Option<usize>,
}

impl BulkOptions {
    pub fn parallel() -> Self {
        Self {
            mode: BulkMode::Parallel,
            concurrency: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkUploadFailure {
    /// Position of the file in the submitted batch
    pub index: usize,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BulkUploadResult {
    pub succeeded: Vec<UploadOutcome>,
    pub failed: Vec<BulkUploadFailure>,
}

impl BulkUploadResult {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Content handed back to a reader.
#[derive(Debug, Clone)]
pub struct StreamedContent {
    pub bytes: Bytes,
    pub content_type: String,
    pub name: String,
}

/// Public URLs for a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUrls {
    pub download: String,
    pub thumbnail: Option<String>,
}
