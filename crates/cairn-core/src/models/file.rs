use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::variant::{FileKind, FileVariant};

/// Processing state of a stored file.
///
/// Only post-processing (dimension decoding, thumbnailing) moves a record past `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(format!("unknown processing status: {}", other)),
        }
    }
}

/// Thumbnail synthesized during post-processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
}

/// Persisted metadata for one stored file.
///
/// Content bytes live next to this record in the persistence layer and are read
/// through `FileRepository::read_content`; the record itself only carries the
/// digest and length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub original_name: String,
    pub stored_name: String,
    pub content_type: String,
    pub extension: String,
    pub size_bytes: i64,
    /// Lowercase hex SHA-256 of the content
    pub digest: String,
    pub processing_status: ProcessingStatus,
    pub is_processed: bool,
    pub is_public: bool,
    pub folder_id: Option<Uuid>,
    pub tags: BTreeMap<String, String>,
    pub variant: FileVariant,
    pub thumbnail: Option<Thumbnail>,
    /// Source record when this record was produced by a copy rather than an upload
    pub copied_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl FileRecord {
    /// Build a fresh, pending record for newly uploaded content.
    #[allow(clippy::too_many_arguments)]
    pub fn new_upload(
        original_name: String,
        content_type: String,
        extension: String,
        size_bytes: i64,
        digest: String,
        variant: FileVariant,
        folder_id: Option<Uuid>,
        is_public: bool,
        tags: BTreeMap<String, String>,
        created_by: Option<Uuid>,
    ) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            id,
            original_name,
            stored_name: stored_name_for(id, &extension),
            content_type,
            extension,
            size_bytes,
            digest,
            processing_status: ProcessingStatus::Pending,
            is_processed: false,
            is_public,
            folder_id,
            tags,
            variant,
            thumbnail: None,
            copied_from: None,
            created_at: now,
            updated_at: now,
            created_by,
            updated_by: created_by,
            deleted_at: None,
            deleted_by: None,
        }
    }

    pub fn kind(&self) -> FileKind {
        self.variant.kind()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn mark_processing(&mut self) {
        self.processing_status = ProcessingStatus::Processing;
        self.is_processed = false;
    }

    pub fn mark_completed(&mut self) {
        self.processing_status = ProcessingStatus::Completed;
        self.is_processed = true;
    }

    /// Degraded post-processing: content stays, metadata reflects the failure.
    pub fn mark_failed(&mut self) {
        self.processing_status = ProcessingStatus::Failed;
        self.is_processed = false;
    }

    /// `is_processed` must never be set without a completed status.
    pub fn processing_state_consistent(&self) -> bool {
        !self.is_processed || self.processing_status == ProcessingStatus::Completed
    }

    pub fn touch(&mut self, user: Option<Uuid>) {
        self.updated_at = Utc::now();
        self.updated_by = user;
    }

    /// Duplicate this record under a new identity.
    ///
    /// Variant properties and thumbnail bytes are copied into owned buffers; the copy
    /// shares nothing mutable with the source.
    pub fn duplicate(&self, folder_id: Option<Uuid>, user: Option<Uuid>) -> FileRecord {
        let id = Uuid::new_v4();
        let now = Utc::now();
        FileRecord {
            id,
            original_name: self.original_name.clone(),
            stored_name: stored_name_for(id, &self.extension),
            content_type: self.content_type.clone(),
            extension: self.extension.clone(),
            size_bytes: self.size_bytes,
            digest: self.digest.clone(),
            processing_status: self.processing_status,
            is_processed: self.is_processed,
            is_public: self.is_public,
            folder_id,
            tags: self.tags.clone(),
            variant: self.variant.clone(),
            thumbnail: self.thumbnail.as_ref().map(|t| Thumbnail {
                data: t.data.to_vec(),
                content_type: t.content_type.clone(),
                width: t.width,
                height: t.height,
            }),
            copied_from: Some(self.id),
            created_at: now,
            updated_at: now,
            created_by: user,
            updated_by: user,
            deleted_at: None,
            deleted_by: None,
        }
    }
}

/// Stored name is `<id>.<ext>`, or just `<id>` when the upload had no extension.
pub fn stored_name_for(id: Uuid, extension: &str) -> String {
    if extension.is_empty() {
        id.to_string()
    } else {
        format!("{}.{}", id, extension)
    }
}

/// Partial metadata edit. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileUpdate {
    pub original_name: Option<String>,
    pub is_public: Option<bool>,
    pub tags: Option<BTreeMap<String, String>>,
    pub variant: Option<FileVariant>,
}

impl FileUpdate {
    pub fn is_empty(&self) -> bool {
        self.original_name.is_none()
            && self.is_public.is_none()
            && self.tags.is_none()
            && self.variant.is_none()
    }

    /// Apply the edit in place. A variant of a different kind is rejected.
    pub fn apply_to(self, record: &mut FileRecord) -> Result<(), String> {
        if let Some(variant) = self.variant {
            if variant.kind() != record.kind() {
                return Err(format!(
                    "cannot change a {} record into {}",
                    record.kind(),
                    variant.kind()
                ));
            }
            record.variant = variant;
        }
        if let Some(name) = self.original_name {
            record.original_name = name;
        }
        if let Some(is_public) = self.is_public {
            record.is_public = is_public;
        }
        if let Some(tags) = self.tags {
            record.tags = tags;
        }
        Ok(())
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::variant::ImageProperties;

    fn image_record() -> FileRecord {
        let mut record = FileRecord::new_upload(
            "cat.png".to_string(),
            "image/png".to_string(),
            "png".to_string(),
            42,
            "ab".repeat(32),
            FileVariant::Image(ImageProperties {
                width: Some(4),
                height: Some(3),
                color_depth: Some(8),
                has_alpha: Some(true),
            }),
            None,
            false,
            BTreeMap::from([("source".to_string(), "test".to_string())]),
            None,
        );
        record.thumbnail = Some(Thumbnail {
            data: vec![1, 2, 3],
            content_type: "image/png".to_string(),
            width: 2,
            height: 1,
        });
        record
    }

    #[test]
    fn test_new_upload_is_pending() {
        let record = image_record();
        assert_eq!(record.processing_status, ProcessingStatus::Pending);
        assert!(!record.is_processed);
        assert_eq!(record.stored_name, format!("{}.png", record.id));
        assert!(record.processing_state_consistent());
    }

    #[test]
    fn test_mark_failed_keeps_invariant() {
        let mut record = image_record();
        record.mark_completed();
        assert!(record.is_processed);
        record.mark_failed();
        assert!(!record.is_processed);
        assert_eq!(record.processing_status, ProcessingStatus::Failed);
        assert!(record.processing_state_consistent());
    }

    #[test]
    fn test_duplicate_copies_variant_and_thumbnail() {
        let source = image_record();
        let folder = Uuid::new_v4();
        let mut copy = source.duplicate(Some(folder), None);

        assert_ne!(copy.id, source.id);
        assert_eq!(copy.copied_from, Some(source.id));
        assert_eq!(copy.folder_id, Some(folder));
        assert_eq!(copy.variant, source.variant);
        assert_eq!(copy.digest, source.digest);

        copy.thumbnail.as_mut().unwrap().data[0] = 9;
        assert_eq!(source.thumbnail.as_ref().unwrap().data[0], 1);
    }

    #[test]
    fn test_update_rejects_kind_change() {
        let mut record = image_record();
        let update = FileUpdate {
            variant: Some(FileVariant::Other),
            ..Default::default()
        };
        assert!(update.apply_to(&mut record).is_err());
    }

    #[test]
    fn test_record_json_roundtrip_keeps_thumbnail() {
        let record = image_record();
        let json = serde_json::to_string(&record).unwrap();
        let parsed: FileRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_processing_status_from_str() {
        assert_eq!(
            "Completed".parse::<ProcessingStatus>().unwrap(),
            ProcessingStatus::Completed
        );
        assert!("done".parse::<ProcessingStatus>().is_err());
    }
}
