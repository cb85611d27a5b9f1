//! Maps an upload's declared type to the typed payload its record carries.

use cairn_core::models::{FileKind, FileVariant};

/// Exact content types, checked before any prefix rule.
const CONTENT_TYPE_TABLE: &[(&str, FileKind)] = &[
    ("application/pdf", FileKind::Document),
    ("application/msword", FileKind::Document),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        FileKind::Document,
    ),
    ("application/vnd.oasis.opendocument.text", FileKind::Document),
    ("application/rtf", FileKind::Document),
    ("text/plain", FileKind::Document),
    ("text/markdown", FileKind::Document),
    ("text/csv", FileKind::Document),
    ("application/zip", FileKind::Archive),
    ("application/x-zip-compressed", FileKind::Archive),
    ("application/x-tar", FileKind::Archive),
    ("application/gzip", FileKind::Archive),
    ("application/x-gzip", FileKind::Archive),
    ("application/x-7z-compressed", FileKind::Archive),
    ("application/x-rar-compressed", FileKind::Archive),
    ("application/ogg", FileKind::Audio),
];

const PREFIX_TABLE: &[(&str, FileKind)] = &[
    ("image/", FileKind::Image),
    ("video/", FileKind::Video),
    ("audio/", FileKind::Audio),
];

/// Fallback when the content type is generic (e.g. `application/octet-stream`).
const EXTENSION_TABLE: &[(&str, FileKind)] = &[
    ("jpg", FileKind::Image),
    ("jpeg", FileKind::Image),
    ("png", FileKind::Image),
    ("gif", FileKind::Image),
    ("webp", FileKind::Image),
    ("bmp", FileKind::Image),
    ("mp4", FileKind::Video),
    ("webm", FileKind::Video),
    ("mov", FileKind::Video),
    ("mkv", FileKind::Video),
    ("mp3", FileKind::Audio),
    ("wav", FileKind::Audio),
    ("ogg", FileKind::Audio),
    ("flac", FileKind::Audio),
    ("pdf", FileKind::Document),
    ("doc", FileKind::Document),
    ("docx", FileKind::Document),
    ("odt", FileKind::Document),
    ("txt", FileKind::Document),
    ("md", FileKind::Document),
    ("csv", FileKind::Document),
    ("zip", FileKind::Archive),
    ("tar", FileKind::Archive),
    ("gz", FileKind::Archive),
    ("tgz", FileKind::Archive),
    ("7z", FileKind::Archive),
    ("rar", FileKind::Archive),
];

pub struct TypedFileFactory;

impl TypedFileFactory {
    pub fn kind_for(content_type: &str, extension: &str) -> FileKind {
        let content_type = content_type.trim().to_lowercase();
        let extension = extension.trim().trim_start_matches('.').to_lowercase();

        if let Some((_, kind)) = CONTENT_TYPE_TABLE
            .iter()
            .find(|(ct, _)| *ct == content_type)
        {
            return *kind;
        }

        if let Some((_, kind)) = PREFIX_TABLE
            .iter()
            .find(|(prefix, _)| content_type.starts_with(prefix))
        {
            return *kind;
        }

        EXTENSION_TABLE
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, kind)| *kind)
            .unwrap_or(FileKind::Other)
    }

    /// Empty payload of the kind the upload maps to; properties are filled in by post-processing.
    pub fn create(content_type: &str, extension: &str) -> FileVariant {
        FileVariant::empty(Self::kind_for(content_type, extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_rules() {
        assert_eq!(TypedFileFactory::kind_for("image/png", "png"), FileKind::Image);
        assert_eq!(TypedFileFactory::kind_for("video/mp4", "mp4"), FileKind::Video);
        assert_eq!(TypedFileFactory::kind_for("audio/mpeg", "mp3"), FileKind::Audio);
    }

    #[test]
    fn test_exact_table_wins() {
        assert_eq!(
            TypedFileFactory::kind_for("application/zip", "zip"),
            FileKind::Archive
        );
        assert_eq!(
            TypedFileFactory::kind_for("application/pdf", "pdf"),
            FileKind::Document
        );
        assert_eq!(
            TypedFileFactory::kind_for("application/ogg", "ogg"),
            FileKind::Audio
        );
    }

    #[test]
    fn test_extension_fallback_for_generic_type() {
        assert_eq!(
            TypedFileFactory::kind_for("application/octet-stream", "TGZ"),
            FileKind::Archive
        );
        assert_eq!(
            TypedFileFactory::kind_for("application/octet-stream", ".png"),
            FileKind::Image
        );
    }

    #[test]
    fn test_unknown_is_other() {
        assert_eq!(
            TypedFileFactory::kind_for("application/x-unknown", "bin"),
            FileKind::Other
        );
        assert_eq!(
            TypedFileFactory::create("application/x-unknown", "bin"),
            FileVariant::Other
        );
    }

    #[test]
    fn test_create_returns_empty_payload() {
        match TypedFileFactory::create("image/png", "png") {
            FileVariant::Image(props) => {
                assert!(props.width.is_none());
                assert!(props.height.is_none());
            }
            other => panic!("expected image variant, got {:?}", other),
        }
    }
}
