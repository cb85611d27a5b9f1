use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Broad content family a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Other,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Document => "document",
            FileKind::Archive => "archive",
            FileKind::Other => "other",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(FileKind::Image),
            "video" => Ok(FileKind::Video),
            "audio" => Ok(FileKind::Audio),
            "document" => Ok(FileKind::Document),
            "archive" => Ok(FileKind::Archive),
            "other" => Ok(FileKind::Other),
            other => Err(format!("unknown file kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageProperties {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Bits per channel
    pub color_depth: Option<u16>,
    pub has_alpha: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoProperties {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<f64>,
    pub frame_rate: Option<f64>,
    pub video_codec: Option<String>,
    pub bitrate: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioProperties {
    pub duration_secs: Option<f64>,
    pub bitrate: Option<i64>,
    pub sample_rate: Option<i32>,
    pub channels: Option<i32>,
    pub audio_codec: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentProperties {
    pub page_count: Option<i32>,
    pub word_count: Option<i64>,
    pub author: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveProperties {
    pub file_count: Option<i64>,
    pub uncompressed_size: Option<i64>,
    pub compression_ratio: Option<f64>,
    /// Container format, e.g. "zip" or "tar.gz"
    pub format: Option<String>,
}

/// Kind-specific payload of a file record.
///
/// Stored as JSONB with an internal `kind` discriminator. Every payload owns its data,
/// so `Clone` is a deep copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FileVariant {
    Image(ImageProperties),
    Video(VideoProperties),
    Audio(AudioProperties),
    Document(DocumentProperties),
    Archive(ArchiveProperties),
    Other,
}

impl FileVariant {
    /// Empty payload for the given kind.
    pub fn empty(kind: FileKind) -> Self {
        match kind {
            FileKind::Image => FileVariant::Image(ImageProperties::default()),
            FileKind::Video => FileVariant::Video(VideoProperties::default()),
            FileKind::Audio => FileVariant::Audio(AudioProperties::default()),
            FileKind::Document => FileVariant::Document(DocumentProperties::default()),
            FileKind::Archive => FileVariant::Archive(ArchiveProperties::default()),
            FileKind::Other => FileVariant::Other,
        }
    }

    pub fn kind(&self) -> FileKind {
        match self {
            FileVariant::Image(_) => FileKind::Image,
            FileVariant::Video(_) => FileKind::Video,
            FileVariant::Audio(_) => FileKind::Audio,
            FileVariant::Document(_) => FileKind::Document,
            FileVariant::Archive(_) => FileKind::Archive,
            FileVariant::Other => FileKind::Other,
        }
    }

    pub fn as_image(&self) -> Option<&ImageProperties> {
        match self {
            FileVariant::Image(props) => Some(props),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_json_uses_kind_tag() {
        let variant = FileVariant::Archive(ArchiveProperties {
            file_count: Some(3),
            format: Some("zip".to_string()),
            ..Default::default()
        });
        let value = serde_json::to_value(&variant).unwrap();
        assert_eq!(value["kind"], "archive");
        assert_eq!(value["file_count"], 3);

        let other = serde_json::to_value(FileVariant::Other).unwrap();
        assert_eq!(other, serde_json::json!({ "kind": "other" }));
    }

    #[test]
    fn test_empty_matches_kind() {
        for kind in [
            FileKind::Image,
            FileKind::Video,
            FileKind::Audio,
            FileKind::Document,
            FileKind::Archive,
            FileKind::Other,
        ] {
            assert_eq!(FileVariant::empty(kind).kind(), kind);
            assert_eq!(kind.as_str().parse::<FileKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_clone_is_independent() {
        let source = FileVariant::Document(DocumentProperties {
            title: Some("Q3 report".to_string()),
            ..Default::default()
        });
        let mut copy = source.clone();
        if let FileVariant::Document(props) = &mut copy {
            props.title = Some("changed".to_string());
        }
        assert_ne!(source, copy);
    }
}
