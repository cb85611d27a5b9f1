use bytes::Bytes;
use cairn_cache::CacheKey;
use cairn_core::models::{
    AccessRecord, AccessType, FileKind, FileRecord, FileUpdate, FileUrls, StreamedContent,
};
use cairn_core::{AppError, AppResult};
use cairn_db::InsertOutcome;
use cairn_processing::{sanitize_filename, ContentDigest, ContentHasher};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use super::service::FileStore;

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("File {} not found", id))
}

impl FileStore {
    /// Metadata for a live file.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn get(&self, id: Uuid) -> AppResult<FileRecord> {
        self.load_record(id).await?.ok_or_else(|| not_found(id))
    }

    /// Like `get`, and records a metadata access.
    pub async fn describe(&self, id: Uuid, accessor: Option<Uuid>) -> AppResult<FileRecord> {
        let record = self.get(id).await?;
        self.log_access(id, accessor, AccessType::Metadata).await;
        Ok(record)
    }

    /// Content for inline display.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn stream(&self, id: Uuid, accessor: Option<Uuid>) -> AppResult<StreamedContent> {
        let content = self.read(id).await?;
        self.log_access(id, accessor, AccessType::Stream).await;
        Ok(content)
    }

    /// Content as an attachment.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn download(&self, id: Uuid, accessor: Option<Uuid>) -> AppResult<StreamedContent> {
        let content = self.read(id).await?;
        self.log_access(id, accessor, AccessType::Download).await;
        Ok(content)
    }

    async fn read(&self, id: Uuid) -> AppResult<StreamedContent> {
        let record = self.get(id).await?;

        let bytes = match self.cache.get(&CacheKey::content(id)) {
            Some(bytes) => bytes,
            None => {
                let bytes = self
                    .repository
                    .read_content(id)
                    .await?
                    .ok_or_else(|| not_found(id))?;
                self.cache_content(id, &bytes);
                bytes
            }
        };

        Ok(StreamedContent {
            bytes,
            content_type: record.content_type,
            name: record.original_name,
        })
    }

    /// Thumbnail image. `NotFound` when the file has none.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn thumbnail(&self, id: Uuid) -> AppResult<StreamedContent> {
        let record = self.get(id).await?;
        let thumbnail = record
            .thumbnail
            .ok_or_else(|| AppError::NotFound(format!("File {} has no thumbnail", id)))?;

        let bytes = self
            .cache
            .get(&CacheKey::thumbnail(id))
            .unwrap_or_else(|| Bytes::from(thumbnail.data));
        self.log_access(id, None, AccessType::Thumbnail).await;

        Ok(StreamedContent {
            bytes,
            content_type: thumbnail.content_type,
            name: format!("{}-thumbnail", record.original_name),
        })
    }

    pub async fn urls(&self, id: Uuid) -> AppResult<FileUrls> {
        let record = self.get(id).await?;
        Ok(FileUrls {
            download: self.urls.download_url(&record),
            thumbnail: self.urls.thumbnail_url(&record),
        })
    }

    /// Live upload holding `digest`, if any. Copies are never returned.
    #[tracing::instrument(skip(self), fields(digest = %digest))]
    pub async fn find_by_digest(&self, digest: &ContentDigest) -> AppResult<Option<FileRecord>> {
        self.find_duplicate(digest.as_str()).await
    }

    pub async fn list_folder(&self, folder_id: Option<Uuid>) -> AppResult<Vec<FileRecord>> {
        self.repository.list_in_folder(folder_id).await
    }

    pub async fn access_log(&self, id: Uuid) -> AppResult<Vec<AccessRecord>> {
        self.repository.list_access(id).await
    }

    /// Soft delete. Returns false when the file was missing or already deleted.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn delete(&self, id: Uuid, user: Option<Uuid>) -> AppResult<bool> {
        let deleted = self.repository.soft_delete(id, user).await?;
        self.cache.invalidate_file(id);
        if deleted {
            tracing::info!(file_id = %id, deleted_by = ?user, "File deleted");
        }
        Ok(deleted)
    }

    /// Re-read stored content and compare its length and digest with the record.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn verify_integrity(&self, id: Uuid) -> AppResult<bool> {
        let record = self.fresh_record(id).await?;
        let content = self
            .repository
            .read_content(id)
            .await?
            .ok_or_else(|| not_found(id))?;

        let length_ok = content.len() as i64 == record.size_bytes;
        let digest_ok = ContentHasher::digest(&content).as_str() == record.digest;
        if !(length_ok && digest_ok) {
            tracing::warn!(
                file_id = %id,
                expected_bytes = record.size_bytes,
                actual_bytes = content.len(),
                digest_ok = digest_ok,
                "Stored content failed integrity check"
            );
        }
        Ok(length_ok && digest_ok)
    }

    #[tracing::instrument(skip(self, update), fields(file_id = %id))]
    pub async fn update_metadata(
        &self,
        id: Uuid,
        mut update: FileUpdate,
        user: Option<Uuid>,
    ) -> AppResult<FileRecord> {
        let mut record = self.fresh_record(id).await?;
        if update.is_empty() {
            return Ok(record);
        }
        if let Some(name) = update.original_name.take() {
            update.original_name = Some(checked_rename(&record, &name)?);
        }
        update.apply_to(&mut record).map_err(AppError::InvalidInput)?;
        self.save(record, user).await
    }

    /// Change the display name. The extension must stay the same.
    pub async fn rename(
        &self,
        id: Uuid,
        new_name: &str,
        user: Option<Uuid>,
    ) -> AppResult<FileRecord> {
        let update = FileUpdate {
            original_name: Some(new_name.to_string()),
            ..Default::default()
        };
        self.update_metadata(id, update, user).await
    }

    /// Change placement only. `None` moves the file to the root.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn move_to_folder(
        &self,
        id: Uuid,
        folder_id: Option<Uuid>,
        user: Option<Uuid>,
    ) -> AppResult<FileRecord> {
        let mut record = self.fresh_record(id).await?;
        record.folder_id = folder_id;
        self.save(record, user).await
    }

    /// Independent copy with its own id and content bytes. Copies never take part in dedup.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn copy(
        &self,
        id: Uuid,
        target_folder: Option<Uuid>,
        user: Option<Uuid>,
    ) -> AppResult<FileRecord> {
        let _permit = self.admission.admit().await?;
        let source = self.fresh_record(id).await?;
        let content = self
            .repository
            .read_content(id)
            .await?
            .ok_or_else(|| not_found(id))?;

        let copy = source.duplicate(target_folder, user);
        match self.repository.insert_with_content(&copy, &content).await? {
            InsertOutcome::Inserted(record) => {
                tracing::info!(file_id = %record.id, source_id = %id, "File copied");
                self.cache_record(&record);
                Ok(record)
            }
            InsertOutcome::DigestConflict(existing) => Err(AppError::Internal(format!(
                "Copy of {} collided with upload {}",
                id, existing.id
            ))),
        }
    }

    /// Merge `tags` into every listed file. Missing files are skipped; returns how many
    /// files were updated.
    #[tracing::instrument(skip(self, ids, tags), fields(batch.size = ids.len()))]
    pub async fn bulk_update_tags(
        &self,
        ids: &[Uuid],
        tags: &BTreeMap<String, String>,
        user: Option<Uuid>,
    ) -> AppResult<usize> {
        let mut updated = 0;
        for &id in ids {
            let mut record = match self.fresh_record(id).await {
                Ok(record) => record,
                Err(AppError::NotFound(_)) => {
                    tracing::warn!(file_id = %id, "Skipping missing file in bulk tag update");
                    continue;
                }
                Err(e) => return Err(e),
            };
            record
                .tags
                .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            self.save(record, user).await?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Move every listed file. Missing files are skipped; returns how many moved.
    #[tracing::instrument(skip(self, ids), fields(batch.size = ids.len()))]
    pub async fn bulk_move(
        &self,
        ids: &[Uuid],
        folder_id: Option<Uuid>,
        user: Option<Uuid>,
    ) -> AppResult<usize> {
        let mut moved = 0;
        for &id in ids {
            match self.move_to_folder(id, folder_id, user).await {
                Ok(_) => moved += 1,
                Err(AppError::NotFound(_)) => {
                    tracing::warn!(file_id = %id, "Skipping missing file in bulk move");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(moved)
    }

    /// Run image post-processing again on stored content.
    #[tracing::instrument(skip(self), fields(file_id = %id))]
    pub async fn regenerate_thumbnail(&self, id: Uuid) -> AppResult<FileRecord> {
        let mut record = self.fresh_record(id).await?;
        if record.kind() != FileKind::Image {
            return Err(AppError::InvalidInput(format!(
                "File {} is a {}, not an image",
                id,
                record.kind()
            )));
        }
        if self.thumbnailer.is_none() {
            return Err(AppError::Processing(
                "Image processing is disabled".to_string(),
            ));
        }

        let content = self
            .repository
            .read_content(id)
            .await?
            .ok_or_else(|| not_found(id))?;
        self.post_process(&mut record, &content).await;
        let updated = self
            .repository
            .update_processing(&record)
            .await?
            .ok_or_else(|| not_found(id))?;
        self.cache.invalidate_file(id);

        tracing::info!(
            file_id = %id,
            status = %updated.processing_status,
            has_thumbnail = updated.thumbnail.is_some(),
            "Thumbnail regenerated"
        );
        Ok(updated)
    }

    /// Record straight from the repository; mutations never start from cached metadata.
    async fn fresh_record(&self, id: Uuid) -> AppResult<FileRecord> {
        self.repository.get(id).await?.ok_or_else(|| not_found(id))
    }

    async fn save(&self, mut record: FileRecord, user: Option<Uuid>) -> AppResult<FileRecord> {
        record.touch(user);
        let updated = self.repository.update(&record).await?;
        self.cache.invalidate_file(updated.id);
        Ok(updated)
    }

    async fn log_access(&self, file_id: Uuid, accessor: Option<Uuid>, access_type: AccessType) {
        let access = AccessRecord::now(file_id, accessor, access_type);
        if let Err(e) = self.repository.record_access(&access).await {
            tracing::warn!(file_id = %file_id, error = %e, "Failed to record file access");
        }
    }
}

/// Sanitize a new display name and require it to keep the record's extension.
fn checked_rename(record: &FileRecord, name: &str) -> AppResult<String> {
    let safe = sanitize_filename(name)?;
    let extension = Path::new(&safe)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != record.extension.to_lowercase() {
        return Err(AppError::InvalidInput(format!(
            "Renaming cannot change the extension (.{} -> .{})",
            record.extension, extension
        )));
    }
    Ok(safe)
}
