//! Postgres-backed file repository.
//!
//! Content is stored in the same row as the metadata, so one transaction covers both.

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use cairn_core::models::{
    AccessRecord, AccessType, FileRecord, FileVariant, ProcessingStatus, Thumbnail,
};
use cairn_core::{AppError, Config};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::repository::{FileRepository, InsertOutcome};
use crate::transaction::TransactionGuard;

const FILE_COLUMNS: &str = "id, original_name, stored_name, content_type, extension, size_bytes, \
    digest, variant, processing_status, is_processed, is_public, folder_id, tags, \
    thumbnail, thumbnail_content_type, thumbnail_width, thumbnail_height, copied_from, \
    created_at, updated_at, created_by, updated_by, deleted_at, deleted_by";

/// Open a pool sized from configuration and apply pending migrations.
pub async fn connect(config: &Config, database_url: &str) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(config.db_timeout())
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");
    Ok(())
}

#[derive(Debug, FromRow)]
struct FileRow {
    id: Uuid,
    original_name: String,
    stored_name: String,
    content_type: String,
    extension: String,
    size_bytes: i64,
    digest: String,
    variant: Json<FileVariant>,
    processing_status: String,
    is_processed: bool,
    is_public: bool,
    folder_id: Option<Uuid>,
    tags: Json<BTreeMap<String, String>>,
    thumbnail: Option<Vec<u8>>,
    thumbnail_content_type: Option<String>,
    thumbnail_width: Option<i32>,
    thumbnail_height: Option<i32>,
    copied_from: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_by: Option<Uuid>,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = AppError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let processing_status = row
            .processing_status
            .parse::<ProcessingStatus>()
            .map_err(AppError::Internal)?;

        let thumbnail = match (row.thumbnail, row.thumbnail_content_type) {
            (Some(data), Some(content_type)) => Some(Thumbnail {
                data,
                content_type,
                width: row.thumbnail_width.unwrap_or(0).max(0) as u32,
                height: row.thumbnail_height.unwrap_or(0).max(0) as u32,
            }),
            _ => None,
        };

        Ok(FileRecord {
            id: row.id,
            original_name: row.original_name,
            stored_name: row.stored_name,
            content_type: row.content_type,
            extension: row.extension,
            size_bytes: row.size_bytes,
            digest: row.digest,
            processing_status,
            is_processed: row.is_processed,
            is_public: row.is_public,
            folder_id: row.folder_id,
            tags: row.tags.0,
            variant: row.variant.0,
            thumbnail,
            copied_from: row.copied_from,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: row.created_by,
            updated_by: row.updated_by,
            deleted_at: row.deleted_at,
            deleted_by: row.deleted_by,
        })
    }
}

#[derive(Clone)]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    #[tracing::instrument(
        skip(self, record, content),
        fields(db.table = "files", db.operation = "insert", db.record_id = %record.id, size_bytes = content.len())
    )]
    async fn insert_with_content(
        &self,
        record: &FileRecord,
        content: &[u8],
    ) -> Result<InsertOutcome, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        let thumbnail = record.thumbnail.as_ref();
        let inserted = sqlx::query::<Postgres>(
            r#"
            INSERT INTO files (
                id, original_name, stored_name, content_type, extension, size_bytes,
                digest, kind, variant, processing_status, is_processed, is_public,
                folder_id, tags, thumbnail, thumbnail_content_type, thumbnail_width,
                thumbnail_height, copied_from, content, created_at, updated_at,
                created_by, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(record.id)
        .bind(&record.original_name)
        .bind(&record.stored_name)
        .bind(&record.content_type)
        .bind(&record.extension)
        .bind(record.size_bytes)
        .bind(&record.digest)
        .bind(record.kind().as_str())
        .bind(Json(&record.variant))
        .bind(record.processing_status.as_str())
        .bind(record.is_processed)
        .bind(record.is_public)
        .bind(record.folder_id)
        .bind(Json(&record.tags))
        .bind(thumbnail.map(|t| t.data.as_slice()))
        .bind(thumbnail.map(|t| t.content_type.as_str()))
        .bind(thumbnail.map(|t| t.width as i32))
        .bind(thumbnail.map(|t| t.height as i32))
        .bind(record.copied_from)
        .bind(content)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.created_by)
        .bind(record.updated_by)
        .execute(tx.conn()?)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await?;
                tracing::debug!(digest = %record.digest, "Digest already stored, resolving to existing record");
                let existing = self.find_by_digest(&record.digest).await?.ok_or_else(|| {
                    AppError::Internal(format!(
                        "Digest {} conflicted but no live record holds it",
                        record.digest
                    ))
                })?;
                return Ok(InsertOutcome::DigestConflict(existing));
            }
            Err(e) => {
                tx.rollback().await.ok();
                return Err(e.into());
            }
        }

        let stored: Option<i64> =
            sqlx::query_scalar("SELECT octet_length(content)::BIGINT FROM files WHERE id = $1")
                .bind(record.id)
                .fetch_one(tx.conn()?)
                .await?;
        let stored = stored.unwrap_or(0);

        if stored != content.len() as i64 || stored != record.size_bytes {
            tx.rollback().await?;
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

        tx.commit().await?;
        Ok(InsertOutcome::Inserted(record.clone()))
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let row: Option<FileRow> = sqlx::query_as::<Postgres, FileRow>(&format!(
            "SELECT {} FROM files WHERE id = $1 AND deleted_at IS NULL",
            FILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FileRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn find_by_digest(&self, digest: &str) -> Result<Option<FileRecord>, AppError> {
        let row: Option<FileRow> = sqlx::query_as::<Postgres, FileRow>(&format!(
            "SELECT {} FROM files \
             WHERE digest = $1 AND deleted_at IS NULL AND copied_from IS NULL",
            FILE_COLUMNS
        ))
        .bind(digest)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FileRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select", db.record_id = %id))]
    async fn read_content(&self, id: Uuid) -> Result<Option<Bytes>, AppError> {
        let content: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT content FROM files WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(content.map(Bytes::from))
    }

    #[tracing::instrument(skip(self, record), fields(db.table = "files", db.operation = "update", db.record_id = %record.id))]
    async fn update(&self, record: &FileRecord) -> Result<FileRecord, AppError> {
        let thumbnail = record.thumbnail.as_ref();
        let row: Option<FileRow> = sqlx::query_as::<Postgres, FileRow>(&format!(
            r#"
            UPDATE files SET
                original_name = $2,
                stored_name = $3,
                variant = $4,
                processing_status = $5,
                is_processed = $6,
                is_public = $7,
                folder_id = $8,
                tags = $9,
                thumbnail = $10,
                thumbnail_content_type = $11,
                thumbnail_width = $12,
                thumbnail_height = $13,
                updated_at = $14,
                updated_by = $15
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {}
            "#,
            FILE_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.original_name)
        .bind(&record.stored_name)
        .bind(Json(&record.variant))
        .bind(record.processing_status.as_str())
        .bind(record.is_processed)
        .bind(record.is_public)
        .bind(record.folder_id)
        .bind(Json(&record.tags))
        .bind(thumbnail.map(|t| t.data.as_slice()))
        .bind(thumbnail.map(|t| t.content_type.as_str()))
        .bind(thumbnail.map(|t| t.width as i32))
        .bind(thumbnail.map(|t| t.height as i32))
        .bind(record.updated_at)
        .bind(record.updated_by)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => FileRecord::try_from(row),
            None => Err(AppError::NotFound(format!("File {} not found", record.id))),
        }
    }

    #[tracing::instrument(skip(self, record), fields(db.table = "files", db.operation = "update", db.record_id = %record.id))]
    async fn update_processing(
        &self,
        record: &FileRecord,
    ) -> Result<Option<FileRecord>, AppError> {
        let thumbnail = record.thumbnail.as_ref();
        let row: Option<FileRow> = sqlx::query_as::<Postgres, FileRow>(&format!(
            r#"
            UPDATE files SET
                variant = $2,
                processing_status = $3,
                is_processed = $4,
                thumbnail = $5,
                thumbnail_content_type = $6,
                thumbnail_width = $7,
                thumbnail_height = $8
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {}
            "#,
            FILE_COLUMNS
        ))
        .bind(record.id)
        .bind(Json(&record.variant))
        .bind(record.processing_status.as_str())
        .bind(record.is_processed)
        .bind(thumbnail.map(|t| t.data.as_slice()))
        .bind(thumbnail.map(|t| t.content_type.as_str()))
        .bind(thumbnail.map(|t| t.width as i32))
        .bind(thumbnail.map(|t| t.height as i32))
        .fetch_optional(&self.pool)
        .await?;

        row.map(FileRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "delete", db.record_id = %id))]
    async fn soft_delete(&self, id: Uuid, deleted_by: Option<Uuid>) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE files SET deleted_at = NOW(), deleted_by = $2 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(deleted_by)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, access), fields(db.table = "file_access_log", db.operation = "insert", db.record_id = %access.file_id))]
    async fn record_access(&self, access: &AccessRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO file_access_log (file_id, accessor, access_type, accessed_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(access.file_id)
        .bind(access.accessor)
        .bind(access.access_type.as_str())
        .bind(access.accessed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_access_log", db.operation = "select", db.record_id = %file_id))]
    async fn list_access(&self, file_id: Uuid) -> Result<Vec<AccessRecord>, AppError> {
        let rows: Vec<(Uuid, Option<Uuid>, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT file_id, accessor, access_type, accessed_at FROM file_access_log \
             WHERE file_id = $1 ORDER BY accessed_at, id",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(file_id, accessor, access_type, accessed_at)| -> Result<_, AppError> {
                Ok(AccessRecord {
                    file_id,
                    accessor,
                    access_type: access_type.parse::<AccessType>().map_err(AppError::Internal)?,
                    accessed_at,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn list_in_folder(&self, folder_id: Option<Uuid>) -> Result<Vec<FileRecord>, AppError> {
        let rows: Vec<FileRow> = sqlx::query_as::<Postgres, FileRow>(&format!(
            "SELECT {} FROM files \
             WHERE folder_id IS NOT DISTINCT FROM $1 AND deleted_at IS NULL \
             ORDER BY created_at, id",
            FILE_COLUMNS
        ))
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FileRecord::try_from).collect()
    }
}
