use async_trait::async_trait;
use bytes::Bytes;
use cairn_core::models::{AccessRecord, FileRecord};
use cairn_core::AppError;
use uuid::Uuid;

/// Result of persisting a new upload.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(FileRecord),
    /// A live upload with the same digest already exists; nothing was written.
    DigestConflict(FileRecord),
}

/// Persistence for file records and their content.
///
/// Deleted records are invisible to every read. Digest lookups and the digest
/// uniqueness rule only consider upload-originated records (`copied_from` unset).
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Store metadata and content in one transaction.
    ///
    /// The stored content length is read back before commit; a mismatch rolls the
    /// transaction back and returns `AppError::Integrity`.
    async fn insert_with_content(
        &self,
        record: &FileRecord,
        content: &[u8],
    ) -> Result<InsertOutcome, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError>;

    async fn find_by_digest(&self, digest: &str) -> Result<Option<FileRecord>, AppError>;

    async fn read_content(&self, id: Uuid) -> Result<Option<Bytes>, AppError>;

    /// Overwrite the mutable metadata of a live record. Content is never touched.
    async fn update(&self, record: &FileRecord) -> Result<FileRecord, AppError>;

    /// Write only the post-processing fields (variant, thumbnail, processing status),
    /// leaving concurrent metadata edits intact. `None` when the record is gone.
    async fn update_processing(&self, record: &FileRecord) -> Result<Option<FileRecord>, AppError>;

    /// Returns false when the record is missing or already deleted.
    async fn soft_delete(&self, id: Uuid, deleted_by: Option<Uuid>) -> Result<bool, AppError>;

    async fn record_access(&self, access: &AccessRecord) -> Result<(), AppError>;

    async fn list_access(&self, file_id: Uuid) -> Result<Vec<AccessRecord>, AppError>;

    /// Live records in a folder, oldest first. `None` lists the root.
    async fn list_in_folder(&self, folder_id: Option<Uuid>) -> Result<Vec<FileRecord>, AppError>;
}
