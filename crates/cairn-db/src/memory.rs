//! In-memory file repository.
//!
//! Same contract as the Postgres repository, including transactional inserts with a
//! length read-back and the digest uniqueness rule. Used for tests and for running the
//! store without a database.

use async_trait::async_trait;
use bytes::Bytes;
use cairn_core::models::{AccessRecord, FileRecord};
use cairn_core::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repository::{FileRepository, InsertOutcome};

#[derive(Debug, Clone)]
struct StoredFile {
    record: FileRecord,
    content: Bytes,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<Uuid, StoredFile>,
    access_log: Vec<AccessRecord>,
}

impl MemoryState {
    fn live_upload_with_digest(&self, digest: &str) -> Option<&FileRecord> {
        self.files
            .values()
            .map(|stored| &stored.record)
            .find(|r| r.digest == digest && !r.is_deleted() && r.copied_from.is_none())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryFileRepository {
    state: Arc<RwLock<MemoryState>>,
    truncate_writes: Arc<AtomicBool>,
    insert_calls: Arc<AtomicUsize>,
}

impl InMemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a short write: stored content loses its last byte.
    pub fn set_truncate_writes(&self, enabled: bool) {
        self.truncate_writes.store(enabled, Ordering::SeqCst);
    }

    /// Number of `insert_with_content` calls that reached the store.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Count of stored rows, deleted ones included.
    pub async fn row_count(&self) -> usize {
        self.state.read().await.files.len()
    }
}

#[async_trait]
impl FileRepository for InMemoryFileRepository {
    async fn insert_with_content(
        &self,
        record: &FileRecord,
        content: &[u8],
    ) -> Result<InsertOutcome, AppError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;

        if record.copied_from.is_none() {
            if let Some(existing) = state.live_upload_with_digest(&record.digest) {
                return Ok(InsertOutcome::DigestConflict(existing.clone()));
            }
        }
        if state.files.contains_key(&record.id) {
            return Err(AppError::Internal(format!(
                "File {} already exists",
                record.id
            )));
        }

        let staged = if self.truncate_writes.load(Ordering::SeqCst) && !content.is_empty() {
            Bytes::copy_from_slice(&content[..content.len() - 1])
        } else {
            Bytes::copy_from_slice(content)
        };

        let stored = staged.len() as i64;
        if stored != content.len() as i64 || stored != record.size_bytes {
            tracing::error!(
                file_id = %record.id,
                expected = record.size_bytes,
                actual = stored,
                "Stored content length does not match upload, rolled back"
            );
            return Err(AppError::Integrity {
                expected: record.size_bytes,
                actual: stored,
            });
        }

        state.files.insert(
            record.id,
            StoredFile {
                record: record.clone(),
                content: staged,
            },
        );
        Ok(InsertOutcome::Inserted(record.clone()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .files
            .get(&id)
            .filter(|stored| !stored.record.is_deleted())
            .map(|stored| stored.record.clone()))
    }

    async fn find_by_digest(&self, digest: &str) -> Result<Option<FileRecord>, AppError> {
        let state = self.state.read().await;
        Ok(state.live_upload_with_digest(digest).cloned())
    }

    async fn read_content(&self, id: Uuid) -> Result<Option<Bytes>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .files
            .get(&id)
            .filter(|stored| !stored.record.is_deleted())
            .map(|stored| stored.content.clone()))
    }

    async fn update(&self, record: &FileRecord) -> Result<FileRecord, AppError> {
        let mut state = self.state.write().await;
        let stored = state
            .files
            .get_mut(&record.id)
            .filter(|stored| !stored.record.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", record.id)))?;

        // Identity, content facts, and audit-creation fields are immutable.
        let current = &stored.record;
        let updated = FileRecord {
            id: current.id,
            content_type: current.content_type.clone(),
            extension: current.extension.clone(),
            size_bytes: current.size_bytes,
            digest: current.digest.clone(),
            copied_from: current.copied_from,
            created_at: current.created_at,
            created_by: current.created_by,
            deleted_at: current.deleted_at,
            deleted_by: current.deleted_by,
            ..record.clone()
        };
        stored.record = updated.clone();
        Ok(updated)
    }

    async fn update_processing(
        &self,
        record: &FileRecord,
    ) -> Result<Option<FileRecord>, AppError> {
        let mut state = self.state.write().await;
        let Some(stored) = state
            .files
            .get_mut(&record.id)
            .filter(|stored| !stored.record.is_deleted())
        else {
            return Ok(None);
        };

        stored.record.variant = record.variant.clone();
        stored.record.thumbnail = record.thumbnail.clone();
        stored.record.processing_status = record.processing_status;
        stored.record.is_processed = record.is_processed;
        Ok(Some(stored.record.clone()))
    }

    async fn soft_delete(&self, id: Uuid, deleted_by: Option<Uuid>) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.files.get_mut(&id) {
            Some(stored) if !stored.record.is_deleted() => {
                stored.record.deleted_at = Some(chrono::Utc::now());
                stored.record.deleted_by = deleted_by;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_access(&self, access: &AccessRecord) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if !state.files.contains_key(&access.file_id) {
            return Err(AppError::NotFound(format!(
                "File {} not found",
                access.file_id
            )));
        }
        state.access_log.push(access.clone());
        Ok(())
    }

    async fn list_access(&self, file_id: Uuid) -> Result<Vec<AccessRecord>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .access_log
            .iter()
            .filter(|a| a.file_id == file_id)
            .cloned()
            .collect())
    }

    async fn list_in_folder(&self, folder_id: Option<Uuid>) -> Result<Vec<FileRecord>, AppError> {
        let state = self.state.read().await;
        let mut records: Vec<FileRecord> = state
            .files
            .values()
            .map(|stored| &stored.record)
            .filter(|r| r.folder_id == folder_id && !r.is_deleted())
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::models::{AccessType, FileVariant};
    use std::collections::BTreeMap;

    fn record(content: &[u8], digest: &str) -> FileRecord {
        FileRecord::new_upload(
            "notes.txt".to_string(),
            "text/plain".to_string(),
            "txt".to_string(),
            content.len() as i64,
            digest.to_string(),
            FileVariant::Other,
            None,
            false,
            BTreeMap::new(),
            None,
        )
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let repo = InMemoryFileRepository::new();
        let rec = record(b"hello", "d1");
        let outcome = repo.insert_with_content(&rec, b"hello").await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));

        assert_eq!(repo.get(rec.id).await.unwrap().unwrap().id, rec.id);
        assert_eq!(
            repo.read_content(rec.id).await.unwrap().unwrap(),
            Bytes::from_static(b"hello")
        );
        assert_eq!(repo.find_by_digest("d1").await.unwrap().unwrap().id, rec.id);
    }

    #[tokio::test]
    async fn test_digest_conflict_returns_existing() {
        let repo = InMemoryFileRepository::new();
        let first = record(b"same", "d1");
        repo.insert_with_content(&first, b"same").await.unwrap();

        let second = record(b"same", "d1");
        match repo.insert_with_content(&second, b"same").await.unwrap() {
            InsertOutcome::DigestConflict(existing) => assert_eq!(existing.id, first.id),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(repo.row_count().await, 1);
    }

    #[tokio::test]
    async fn test_copies_do_not_conflict_on_digest() {
        let repo = InMemoryFileRepository::new();
        let source = record(b"same", "d1");
        repo.insert_with_content(&source, b"same").await.unwrap();

        let copy = source.duplicate(None, None);
        let outcome = repo.insert_with_content(&copy, b"same").await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));
        assert_eq!(repo.find_by_digest("d1").await.unwrap().unwrap().id, source.id);
    }

    #[tokio::test]
    async fn test_truncated_write_is_integrity_error() {
        let repo = InMemoryFileRepository::new();
        repo.set_truncate_writes(true);
        let rec = record(b"hello", "d1");

        let err = repo.insert_with_content(&rec, b"hello").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Integrity {
                expected: 5,
                actual: 4
            }
        ));
        assert_eq!(repo.row_count().await, 0);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_record_and_frees_digest() {
        let repo = InMemoryFileRepository::new();
        let rec = record(b"x", "d1");
        repo.insert_with_content(&rec, b"x").await.unwrap();

        assert!(repo.soft_delete(rec.id, None).await.unwrap());
        assert!(!repo.soft_delete(rec.id, None).await.unwrap());
        assert!(repo.get(rec.id).await.unwrap().is_none());
        assert!(repo.read_content(rec.id).await.unwrap().is_none());
        assert!(repo.find_by_digest("d1").await.unwrap().is_none());

        let again = record(b"x", "d1");
        let outcome = repo.insert_with_content(&again, b"x").await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_immutable_fields() {
        let repo = InMemoryFileRepository::new();
        let rec = record(b"abc", "d1");
        repo.insert_with_content(&rec, b"abc").await.unwrap();

        let mut edited = rec.clone();
        edited.original_name = "renamed.txt".to_string();
        edited.digest = "tampered".to_string();
        let updated = repo.update(&edited).await.unwrap();

        assert_eq!(updated.original_name, "renamed.txt");
        assert_eq!(updated.digest, "d1");
    }

    #[tokio::test]
    async fn test_update_processing_keeps_concurrent_edits() {
        let repo = InMemoryFileRepository::new();
        let rec = record(b"abc", "d1");
        repo.insert_with_content(&rec, b"abc").await.unwrap();

        let mut renamed = rec.clone();
        renamed.original_name = "renamed.txt".to_string();
        repo.update(&renamed).await.unwrap();

        let mut processed = rec.clone();
        processed.mark_completed();
        let stored = repo.update_processing(&processed).await.unwrap().unwrap();
        assert_eq!(stored.original_name, "renamed.txt");
        assert!(stored.is_processed);

        repo.soft_delete(rec.id, None).await.unwrap();
        assert!(repo.update_processing(&processed).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_access_log_is_append_only() {
        let repo = InMemoryFileRepository::new();
        let rec = record(b"abc", "d1");
        repo.insert_with_content(&rec, b"abc").await.unwrap();

        repo.record_access(&AccessRecord::now(rec.id, None, AccessType::Download))
            .await
            .unwrap();
        repo.record_access(&AccessRecord::now(rec.id, None, AccessType::Thumbnail))
            .await
            .unwrap();

        let log = repo.list_access(rec.id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].access_type, AccessType::Download);
        assert!(repo
            .record_access(&AccessRecord::now(Uuid::new_v4(), None, AccessType::Stream))
            .await
            .is_err());
    }
}
