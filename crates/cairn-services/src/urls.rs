//! Public URL construction for stored files.

use cairn_core::models::FileRecord;

pub trait UrlBuilder: Send + Sync {
    fn download_url(&self, record: &FileRecord) -> String;

    /// `None` when the record has no thumbnail.
    fn thumbnail_url(&self, record: &FileRecord) -> Option<String>;
}

/// Builds `<base>/files/<id>/<stored_name>` style URLs.
#[derive(Debug, Clone)]
pub struct PublicUrlBuilder {
    base_url: String,
}

impl PublicUrlBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl UrlBuilder for PublicUrlBuilder {
    fn download_url(&self, record: &FileRecord) -> String {
        self.build_url(&format!("/files/{}/{}", record.id, record.stored_name))
    }

    fn thumbnail_url(&self, record: &FileRecord) -> Option<String> {
        record
            .thumbnail
            .as_ref()
            .map(|_| self.build_url(&format!("/files/{}/thumbnail", record.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::models::{FileVariant, Thumbnail};
    use std::collections::BTreeMap;

    fn record() -> FileRecord {
        FileRecord::new_upload(
            "photo.png".to_string(),
            "image/png".to_string(),
            "png".to_string(),
            10,
            "d".to_string(),
            FileVariant::Other,
            None,
            true,
            BTreeMap::new(),
            None,
        )
    }

    #[test]
    fn test_download_url_uses_stored_name() {
        let builder = PublicUrlBuilder::new("https://cdn.example.com/");
        let rec = record();
        assert_eq!(
            builder.download_url(&rec),
            format!("https://cdn.example.com/files/{}/{}.png", rec.id, rec.id)
        );
    }

    #[test]
    fn test_thumbnail_url_only_with_thumbnail() {
        let builder = PublicUrlBuilder::new("http://localhost:4000");
        let mut rec = record();
        assert!(builder.thumbnail_url(&rec).is_none());

        rec.thumbnail = Some(Thumbnail {
            data: vec![1, 2, 3],
            content_type: "image/png".to_string(),
            width: 1,
            height: 1,
        });
        assert_eq!(
            builder.thumbnail_url(&rec).unwrap(),
            format!("http://localhost:4000/files/{}/thumbnail", rec.id)
        );
    }
}
