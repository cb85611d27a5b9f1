use bytes::Bytes;
use cairn_cache::{BoundedCache, CacheConfig, CacheKey, CachePriority};
use cairn_core::models::{
    BulkFile, BulkMode, BulkOptions, BulkUploadFailure, BulkUploadResult, FileKind, FileRecord,
    FileVariant, UploadMetadata, UploadOutcome,
};
use cairn_core::{AppError, AppResult, Config};
use cairn_db::{FileRepository, InsertOutcome};
use cairn_processing::{
    ContentHasher, ContentPolicy, ContentValidator, ImageThumbnailer, ThumbnailGenerator,
    TypedFileFactory,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::stage::{StageTracker, UploadStage};
use crate::admission::AdmissionControl;
use crate::lock::DigestLockManager;
use crate::urls::{PublicUrlBuilder, UrlBuilder};

const FALLBACK_URL_FILENAME: &str = "download";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Content store facade.
///
/// Uploads pass the admission gate, are validated and hashed, and are deduplicated
/// under a per-digest lock before anything is written. Reads go through the bounded
/// cache; every mutation invalidates the file's cache entries.
pub struct FileStore {
    pub(super) config: Config,
    pub(super) repository: Arc<dyn FileRepository>,
    pub(super) validator: Arc<dyn ContentValidator>,
    pub(super) thumbnailer: Option<Arc<dyn ThumbnailGenerator>>,
    pub(super) urls: Arc<dyn UrlBuilder>,
    pub(super) cache: Arc<BoundedCache>,
    pub(super) locks: Arc<DigestLockManager>,
    pub(super) admission: AdmissionControl,
    http: reqwest::Client,
}

impl FileStore {
    /// Store wired from configuration: allow-list validator, PNG thumbnailer, public
    /// URLs, and a cache sized by the `cache_*` settings.
    pub fn new(config: Config, repository: Arc<dyn FileRepository>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.url_fetch_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let cache = BoundedCache::new(CacheConfig {
            max_bytes: config.cache_max_bytes(),
            max_item_bytes: config.cache_max_item_bytes(),
            recency_cutoff: config.cache_recency_cutoff(),
            idle_cutoff: config.cache_idle_cutoff(),
        });

        Ok(Self {
            validator: Arc::new(ContentPolicy::from_config(&config)),
            thumbnailer: Some(Arc::new(ImageThumbnailer::new(
                config.thumbnail_max_dimension(),
            ))),
            urls: Arc::new(PublicUrlBuilder::new(config.public_base_url())),
            cache: Arc::new(cache),
            locks: Arc::new(DigestLockManager::new()),
            admission: AdmissionControl::new(config.upload_concurrency()),
            repository,
            config,
            http,
        })
    }

    pub fn with_validator(mut self, validator: Arc<dyn ContentValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// `None` disables image post-processing; images are then stored without dimensions.
    pub fn with_thumbnailer(mut self, thumbnailer: Option<Arc<dyn ThumbnailGenerator>>) -> Self {
        self.thumbnailer = thumbnailer;
        self
    }

    pub fn with_url_builder(mut self, urls: Arc<dyn UrlBuilder>) -> Self {
        self.urls = urls;
        self
    }

    pub fn with_cache(mut self, cache: Arc<BoundedCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<BoundedCache> {
        &self.cache
    }

    pub fn locks(&self) -> &Arc<DigestLockManager> {
        &self.locks
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    /// Store one file, or return the existing record if identical content is already stored.
    #[tracing::instrument(
        skip(self, data, metadata),
        fields(upload.name = %metadata.original_name, size_bytes = data.len())
    )]
    pub async fn upload(&self, data: Bytes, metadata: UploadMetadata) -> AppResult<UploadOutcome> {
        let _permit = self.admission.admit().await?;
        self.run_pipeline(data, metadata).await
    }

    /// Store a batch. Each file succeeds or fails on its own; a failure never aborts
    /// the rest of the batch.
    #[tracing::instrument(skip(self, files, options), fields(batch.size = files.len(), batch.mode = ?options.mode))]
    pub async fn upload_many(&self, files: Vec<BulkFile>, options: BulkOptions) -> BulkUploadResult {
        let results: Vec<(usize, String, AppResult<UploadOutcome>)> = match options.mode {
            BulkMode::Sequential => {
                let mut results = Vec::with_capacity(files.len());
                for (index, file) in files.into_iter().enumerate() {
                    let name = file.metadata.original_name.clone();
                    let outcome = self.upload(file.data, file.metadata).await;
                    results.push((index, name, outcome));
                }
                results
            }
            BulkMode::Parallel => {
                let concurrency = options
                    .concurrency
                    .unwrap_or_else(|| self.config.bulk_upload_concurrency())
                    .max(1);
                let semaphore = Arc::new(Semaphore::new(concurrency));
                let tasks = files.into_iter().enumerate().map(|(index, file)| {
                    let semaphore = semaphore.clone();
                    async move {
                        let name = file.metadata.original_name.clone();
                        let outcome = match semaphore.acquire_owned().await {
                            Ok(_slot) => self.upload(file.data, file.metadata).await,
                            Err(_) => Err(AppError::Internal("Bulk upload gate closed".to_string())),
                        };
                        (index, name, outcome)
                    }
                });
                join_all(tasks).await
            }
        };

        let mut batch = BulkUploadResult::default();
        for (index, name, outcome) in results {
            match outcome {
                Ok(outcome) => batch.succeeded.push(outcome),
                Err(e) => {
                    tracing::warn!(index = index, upload.name = %name, error = %e, "Bulk upload item failed");
                    batch.failed.push(BulkUploadFailure {
                        index,
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            succeeded = batch.succeeded_count(),
            failed = batch.failed_count(),
            "Bulk upload finished"
        );
        batch
    }

    /// Download a remote file and store it.
    ///
    /// The fetch runs before any lock or permit is taken and is bounded by
    /// `url_fetch_timeout`; running out of time aborts the upload with `Timeout`.
    #[tracing::instrument(skip(self, metadata), fields(url = %url))]
    pub async fn upload_from_url(
        &self,
        url: &str,
        mut metadata: UploadMetadata,
    ) -> AppResult<UploadOutcome> {
        let url = url.trim();
        let parsed = reqwest::Url::parse(url)
            .map_err(|_| AppError::InvalidInput(format!("Invalid URL format: {}", url)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AppError::InvalidInput(
                "Only HTTP and HTTPS URLs are allowed".to_string(),
            ));
        }

        let timeout = self.config.url_fetch_timeout();
        let (data, remote_type) = tokio::time::timeout(timeout, self.fetch(&parsed))
            .await
            .map_err(|_| {
                tracing::warn!(url = %parsed, timeout_secs = timeout.as_secs(), "URL fetch timed out");
                AppError::Timeout(format!(
                    "Fetching {} took longer than {}s",
                    parsed,
                    timeout.as_secs()
                ))
            })??;

        if metadata.original_name.trim().is_empty() {
            metadata.original_name = parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|name| !name.is_empty())
                .map(|s| s.to_string())
                .unwrap_or_else(|| FALLBACK_URL_FILENAME.to_string());
        }
        if metadata.content_type.trim().is_empty() {
            metadata.content_type =
                remote_type.unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        }

        tracing::info!(
            url = %parsed,
            size_bytes = data.len(),
            upload.name = %metadata.original_name,
            "Downloaded file from URL"
        );
        self.upload(data, metadata).await
    }

    async fn fetch(&self, url: &reqwest::Url) -> AppResult<(Bytes, Option<String>)> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_error(url, e))?;

        if !response.status().is_success() {
            return Err(AppError::InvalidInput(format!(
                "URL returned status code: {}",
                response.status()
            )));
        }

        let max = self.config.max_file_size_bytes();
        if let Some(length) = response.content_length() {
            if length > max as u64 {
                return Err(AppError::Validation(format!(
                    "File too large: {} bytes (max: {} bytes)",
                    length, max
                )));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let body = response.bytes().await.map_err(|e| fetch_error(url, e))?;
        Ok((body, content_type))
    }

    async fn run_pipeline(
        &self,
        data: Bytes,
        metadata: UploadMetadata,
    ) -> AppResult<UploadOutcome> {
        let mut tracker = StageTracker::start(&metadata.original_name, data.len());

        let validated = self
            .validator
            .validate(&metadata.original_name, &metadata.content_type, &data)
            .map_err(|e| {
                tracing::debug!(upload.name = %metadata.original_name, error = %e, "Upload rejected");
                AppError::from(e)
            })?;
        tracker.advance(UploadStage::Validated)?;

        let digest = ContentHasher::digest(&data);
        tracker.advance(UploadStage::Hashed)?;

        let lock = self.locks.acquire(digest.as_str()).await;
        let existing = self.find_duplicate(digest.as_str()).await?;
        tracker.advance(UploadStage::DedupChecked)?;

        if let Some(existing) = existing {
            tracker.advance(UploadStage::DuplicateFound)?;
            tracing::info!(file_id = %existing.id, digest = %digest, "Upload resolved to existing file");
            return Ok(UploadOutcome::Duplicate(existing));
        }

        let variant = TypedFileFactory::create(&validated.content_type, &validated.extension);
        let record = FileRecord::new_upload(
            validated.safe_name,
            validated.content_type,
            validated.extension,
            data.len() as i64,
            digest.into_string(),
            variant,
            metadata.folder_id,
            metadata.is_public,
            metadata.tags,
            metadata.uploaded_by,
        );

        let mut record = match self.repository.insert_with_content(&record, &data).await? {
            InsertOutcome::Inserted(record) => record,
            InsertOutcome::DigestConflict(existing) => {
                tracker.advance(UploadStage::DuplicateFound)?;
                tracing::info!(
                    file_id = %existing.id,
                    "Digest conflict on insert resolved to existing file"
                );
                self.cache_record(&existing);
                return Ok(UploadOutcome::Duplicate(existing));
            }
        };
        tracker.advance(UploadStage::Persisted)?;
        drop(lock);

        self.post_process(&mut record, &data).await;
        let record = match self.repository.update_processing(&record).await? {
            Some(stored) => {
                self.populate_cache(&stored, &data);
                stored
            }
            None => {
                tracing::warn!(
                    file_id = %record.id,
                    "File removed during post-processing, enrichment discarded"
                );
                record
            }
        };
        tracker.advance(UploadStage::PostProcessed)?;

        tracing::info!(
            file_id = %record.id,
            kind = %record.kind(),
            size_bytes = record.size_bytes,
            status = %record.processing_status,
            stage = tracker.stage().as_str(),
            duration_ms = tracker.elapsed_ms(),
            "Upload stored"
        );
        Ok(UploadOutcome::Created(record))
    }

    /// Dedup lookup: the digest cache first, then the repository.
    pub(super) async fn find_duplicate(&self, digest: &str) -> AppResult<Option<FileRecord>> {
        let key = CacheKey::digest(digest);
        let cached_id = self
            .cache
            .get(&key)
            .and_then(|raw| std::str::from_utf8(&raw).ok().map(str::to_string))
            .and_then(|raw| Uuid::parse_str(&raw).ok());

        if let Some(id) = cached_id {
            match self.load_record(id).await? {
                Some(record) if record.digest == digest && record.copied_from.is_none() => {
                    tracing::debug!(file_id = %id, "Dedup hit in cache");
                    return Ok(Some(record));
                }
                _ => {
                    self.cache.invalidate(&key);
                }
            }
        }

        let found = self.repository.find_by_digest(digest).await?;
        if let Some(record) = &found {
            self.cache_record(record);
        }
        Ok(found)
    }

    /// Decode dimensions and build a thumbnail for images. Never fails the upload:
    /// a decode error leaves the record in `Failed`.
    pub(super) async fn post_process(&self, record: &mut FileRecord, data: &Bytes) {
        if record.kind() != FileKind::Image {
            record.mark_completed();
            return;
        }
        let Some(thumbnailer) = self.thumbnailer.clone() else {
            record.mark_completed();
            return;
        };

        record.mark_processing();
        let want_thumbnail = self.config.thumbnail_enabled();
        let bytes = data.clone();
        let result =
            tokio::task::spawn_blocking(move || thumbnailer.analyze(&bytes, want_thumbnail)).await;

        match result {
            Ok(Ok((info, thumbnail))) => {
                record.variant = FileVariant::Image(info.into());
                record.thumbnail = thumbnail;
                record.mark_completed();
            }
            Ok(Err(e)) => {
                tracing::warn!(file_id = %record.id, error = %e, "Image post-processing failed, file kept");
                record.mark_failed();
            }
            Err(e) => {
                tracing::warn!(file_id = %record.id, error = %e, "Image post-processing task aborted, file kept");
                record.mark_failed();
            }
        }
    }

    /// Cached record, falling back to the repository.
    pub(super) async fn load_record(&self, id: Uuid) -> AppResult<Option<FileRecord>> {
        if let Some(record) = self.cached_record(id) {
            return Ok(Some(record));
        }
        let record = self.repository.get(id).await?;
        if let Some(record) = &record {
            self.cache_record(record);
        }
        Ok(record)
    }

    fn cached_record(&self, id: Uuid) -> Option<FileRecord> {
        let key = CacheKey::meta(id);
        let raw = self.cache.get(&key)?;
        match serde_json::from_slice::<FileRecord>(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(file_id = %id, error = %e, "Dropping unreadable cached metadata");
                self.cache.invalidate(&key);
                None
            }
        }
    }

    pub(super) fn cache_record(&self, record: &FileRecord) {
        match serde_json::to_vec(record) {
            Ok(json) => self.cache_put(
                record.id,
                CacheKey::meta(record.id),
                Bytes::from(json),
                self.config.cache_meta_ttl(),
                CachePriority::High,
            ),
            Err(e) => {
                tracing::debug!(file_id = %record.id, error = %e, "Metadata not cacheable");
            }
        }

        if record.copied_from.is_none() {
            self.cache_put(
                record.id,
                CacheKey::digest(&record.digest),
                Bytes::from(record.id.to_string()),
                self.config.cache_meta_ttl(),
                CachePriority::High,
            );
        }
    }

    pub(super) fn cache_content(&self, id: Uuid, content: &Bytes) {
        self.cache_put(
            id,
            CacheKey::content(id),
            content.clone(),
            self.config.cache_content_ttl(),
            CachePriority::Low,
        );
    }

    fn populate_cache(&self, record: &FileRecord, content: &Bytes) {
        self.cache_record(record);
        self.cache_content(record.id, content);
        if let Some(thumbnail) = &record.thumbnail {
            self.cache_put(
                record.id,
                CacheKey::thumbnail(record.id),
                Bytes::copy_from_slice(&thumbnail.data),
                self.config.cache_thumbnail_ttl(),
                CachePriority::Normal,
            );
        }
    }

    /// Cache refusals are not errors; the read simply goes to the repository next time.
    pub(super) fn cache_put(
        &self,
        file_id: Uuid,
        key: String,
        value: Bytes,
        ttl: Duration,
        priority: CachePriority,
    ) {
        if let Err(e) = self.cache.set_for_file(file_id, key, value, ttl, priority) {
            tracing::debug!(file_id = %file_id, error = %e, "Cache refused entry, passing through");
        }
    }
}

fn fetch_error(url: &reqwest::Url, err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        tracing::warn!(url = %url, error = %err, "URL fetch timed out");
        AppError::Timeout(format!("Fetching {} timed out: {}", url, err))
    } else {
        tracing::error!(url = %url, error = %err, "Failed to download from URL");
        AppError::InvalidInput(format!("Failed to download from URL: {}", err))
    }
}
