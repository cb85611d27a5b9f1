use uuid::Uuid;

pub const CONTENT_PREFIX: &str = "content:";
pub const THUMBNAIL_PREFIX: &str = "thumbnail:";
pub const META_PREFIX: &str = "meta:";
pub const DIGEST_PREFIX: &str = "meta:digest:";

/// Builders for the cache key namespaces.
///
/// Content, thumbnail, and metadata keys are keyed by file id; the digest key maps a
/// content digest to the id of the record holding it.
pub struct CacheKey;

impl CacheKey {
    pub fn content(id: Uuid) -> String {
        format!("{}{}", CONTENT_PREFIX, id)
    }

    pub fn thumbnail(id: Uuid) -> String {
        format!("{}{}", THUMBNAIL_PREFIX, id)
    }

    pub fn meta(id: Uuid) -> String {
        format!("{}{}", META_PREFIX, id)
    }

    pub fn digest(hex: &str) -> String {
        format!("{}{}", DIGEST_PREFIX, hex)
    }
}
