use cairn_core::{AppError, Config};
use std::path::Path;
use std::sync::Arc;

use crate::scanner::{ContentScanner, NoopScanner, ScanResult, SignatureScanner};

const MAX_FILENAME_LENGTH: usize = 255;

/// Validation errors for uploaded content
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Invalid file extension: {extension} (allowed: {allowed:?})")]
    InvalidExtension {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("Invalid content type: {content_type} (allowed: {allowed:?})")]
    InvalidContentType {
        content_type: String,
        allowed: Vec<String>,
    },

    #[error("Content type {content_type} does not match extension '{extension}' (expected one of: {expected})")]
    ContentTypeMismatch {
        content_type: String,
        extension: String,
        expected: String,
    },

    #[error("File size not allowed: {size} bytes")]
    SizeNotAllowed { size: usize },

    #[error("File type not allowed: {content_type} for '{name}'")]
    TypeNotAllowed { name: String, content_type: String },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Content rejected by safety scan: {0}")]
    Unsafe(String),

    #[error("Empty file")]
    EmptyFile,
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Upload name and type after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub safe_name: String,
    pub extension: String,
    pub content_type: String,
}

/// Admission checks applied to every upload.
pub trait ContentValidator: Send + Sync {
    fn is_allowed_type(&self, name: &str, content_type: &str) -> bool;

    fn is_allowed_size(&self, len: usize) -> bool;

    fn is_safe(&self, data: &[u8]) -> bool;

    /// Run every check. Implementations may override to report more precise errors.
    fn validate(
        &self,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<ValidatedUpload, ValidationError> {
        if data.is_empty() {
            return Err(ValidationError::EmptyFile);
        }
        if !self.is_allowed_size(data.len()) {
            return Err(ValidationError::SizeNotAllowed { size: data.len() });
        }
        let safe_name = sanitize_filename(name)?;
        let extension = extension_of(&safe_name)?;
        let content_type = normalize_mime_type(content_type);
        if !self.is_allowed_type(&safe_name, &content_type) {
            return Err(ValidationError::TypeNotAllowed {
                name: safe_name,
                content_type,
            });
        }
        if !self.is_safe(data) {
            return Err(ValidationError::Unsafe("content flagged".to_string()));
        }
        Ok(ValidatedUpload {
            safe_name,
            extension,
            content_type,
        })
    }
}

/// Allow-list validator driven by configuration.
pub struct ContentPolicy {
    max_file_size: usize,
    allowed_extensions: Vec<String>,
    allowed_content_types: Vec<String>,
    scanner: Arc<dyn ContentScanner>,
}

impl ContentPolicy {
    pub fn new(
        max_file_size: usize,
        allowed_extensions: Vec<String>,
        allowed_content_types: Vec<String>,
        scanner: Arc<dyn ContentScanner>,
    ) -> Self {
        Self {
            max_file_size,
            allowed_extensions,
            allowed_content_types,
            scanner,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let scanner: Arc<dyn ContentScanner> = if config.safety_scan_enabled() {
            Arc::new(SignatureScanner::default())
        } else {
            Arc::new(NoopScanner)
        };
        Self::new(
            config.max_file_size_bytes(),
            config.allowed_extensions().to_vec(),
            config.allowed_content_types().to_vec(),
            scanner,
        )
    }

    pub fn validate_file_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    pub fn validate_extension(&self, filename: &str) -> Result<String, ValidationError> {
        let extension = extension_of(filename)?;

        if !self.allowed_extensions.contains(&extension) {
            return Err(ValidationError::InvalidExtension {
                extension,
                allowed: self.allowed_extensions.clone(),
            });
        }

        Ok(extension)
    }

    pub fn validate_content_type(&self, content_type: &str) -> Result<String, ValidationError> {
        let normalized = normalize_mime_type(content_type);

        if !self.allowed_content_types.iter().any(|ct| ct == &normalized) {
            return Err(ValidationError::InvalidContentType {
                content_type: content_type.to_string(),
                allowed: self.allowed_content_types.clone(),
            });
        }

        Ok(normalized)
    }

    /// Reject a content type that contradicts the extension.
    pub fn validate_extension_content_type_match(
        &self,
        extension: &str,
        content_type: &str,
    ) -> Result<(), ValidationError> {
        let Some(expected) = expected_content_types(extension) else {
            tracing::debug!(
                extension = %extension,
                content_type = %content_type,
                "Unknown extension, skipping content-type/extension cross-check"
            );
            return Ok(());
        };

        let normalized = normalize_mime_type(content_type);
        // Opaque binaries are accepted under any known extension.
        if normalized == "application/octet-stream" {
            return Ok(());
        }

        if !expected.iter().any(|ct| *ct == normalized) {
            return Err(ValidationError::ContentTypeMismatch {
                content_type: content_type.to_string(),
                extension: extension.to_string(),
                expected: expected.join(", "),
            });
        }

        Ok(())
    }

    pub fn validate_safety(&self, data: &[u8]) -> Result<(), ValidationError> {
        match self.scanner.scan(data) {
            ScanResult::Clean => Ok(()),
            ScanResult::Flagged(reason) => {
                tracing::warn!(reason = %reason, size_bytes = data.len(), "Rejected flagged upload");
                Err(ValidationError::Unsafe(reason))
            }
        }
    }
}

impl ContentValidator for ContentPolicy {
    fn is_allowed_type(&self, name: &str, content_type: &str) -> bool {
        self.validate_extension(name)
            .and_then(|ext| {
                self.validate_content_type(content_type)?;
                self.validate_extension_content_type_match(&ext, content_type)
            })
            .is_ok()
    }

    fn is_allowed_size(&self, len: usize) -> bool {
        self.validate_file_size(len).is_ok()
    }

    fn is_safe(&self, data: &[u8]) -> bool {
        self.scanner.scan(data).is_clean()
    }

    fn validate(
        &self,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<ValidatedUpload, ValidationError> {
        self.validate_file_size(data.len())?;
        let safe_name = sanitize_filename(name)?;
        let extension = self.validate_extension(&safe_name)?;
        let content_type = self.validate_content_type(content_type)?;
        self.validate_extension_content_type_match(&extension, &content_type)?;
        self.validate_safety(data)?;
        Ok(ValidatedUpload {
            safe_name,
            extension,
            content_type,
        })
    }
}

/// Strip directories and replace anything outside `[A-Za-z0-9._-]`.
/// Path traversal is rejected rather than repaired.
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    let filename_only = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    if filename_only.contains("..") || filename.split(['/', '\\']).any(|part| part == "..") {
        return Err(ValidationError::InvalidFilename(
            "filename contains path traversal".to_string(),
        ));
    }

    let sanitized: String = filename_only
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.trim_matches(['.', '_']).is_empty() {
        return Err(ValidationError::InvalidFilename(filename.to_string()));
    }

    Ok(sanitized)
}

/// Normalize a MIME type: drop parameters and lowercase.
pub fn normalize_mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_lowercase()
}

fn extension_of(filename: &str) -> Result<String, ValidationError> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ValidationError::InvalidFilename(filename.to_string()))
}

fn expected_content_types(extension: &str) -> Option<&'static [&'static str]> {
    let expected: &'static [&'static str] = match extension {
        // Images
        "jpg" | "jpeg" => &["image/jpeg"],
        "png" => &["image/png"],
        "gif" => &["image/gif"],
        "webp" => &["image/webp"],
        "bmp" => &["image/bmp"],
        // Videos
        "mp4" => &["video/mp4"],
        "webm" => &["video/webm"],
        "mov" => &["video/quicktime"],
        "mkv" => &["video/x-matroska"],
        // Audio
        "mp3" => &["audio/mpeg", "audio/mp3"],
        "wav" => &["audio/wav", "audio/wave", "audio/x-wav"],
        "ogg" => &["audio/ogg", "application/ogg"],
        "flac" => &["audio/flac"],
        // Documents
        "pdf" => &["application/pdf"],
        "doc" => &["application/msword"],
        "docx" => &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"],
        "txt" => &["text/plain"],
        "md" => &["text/markdown", "text/plain"],
        "csv" => &["text/csv"],
        // Archives
        "zip" => &["application/zip", "application/x-zip-compressed"],
        "tar" => &["application/x-tar"],
        "gz" | "tgz" => &["application/gzip", "application/x-gzip"],
        "7z" => &["application/x-7z-compressed"],
        _ => return None,
    };
    Some(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_policy() -> ContentPolicy {
        ContentPolicy::new(
            1024 * 1024, // 1MB
            vec!["jpg".to_string(), "png".to_string(), "zip".to_string()],
            vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "application/zip".to_string(),
            ],
            Arc::new(SignatureScanner::default()),
        )
    }

    /// Only the three primitive checks; relies on the provided `validate`.
    struct TinyTextOnly;

    impl ContentValidator for TinyTextOnly {
        fn is_allowed_type(&self, _name: &str, content_type: &str) -> bool {
            content_type == "text/plain"
        }

        fn is_allowed_size(&self, len: usize) -> bool {
            len <= 4
        }

        fn is_safe(&self, _data: &[u8]) -> bool {
            true
        }
    }

    #[test]
    fn test_provided_validate_reports_failing_check() {
        let validator = TinyTextOnly;

        let err = validator
            .validate("a.txt", "text/plain", b"too long")
            .unwrap_err();
        assert!(matches!(err, ValidationError::SizeNotAllowed { size: 8 }));
        assert!(!err.to_string().contains("max: 0"));

        let err = validator
            .validate("a.png", "image/png", b"png")
            .unwrap_err();
        assert!(matches!(
            &err,
            ValidationError::TypeNotAllowed { name, content_type }
                if name == "a.png" && content_type == "image/png"
        ));
        assert!(!err.to_string().contains("allowed: []"));

        let ok = validator.validate("a.txt", "text/plain", b"ok").unwrap();
        assert_eq!(ok.extension, "txt");
    }

    #[test]
    fn test_validate_file_size() {
        let policy = test_policy();
        assert!(policy.validate_file_size(512 * 1024).is_ok());
        assert!(policy.validate_file_size(2 * 1024 * 1024).is_err());
        assert!(matches!(
            policy.validate_file_size(0),
            Err(ValidationError::EmptyFile)
        ));
        assert!(!policy.is_allowed_size(0));
    }

    #[test]
    fn test_validate_extension_case_insensitive() {
        let policy = test_policy();
        assert_eq!(policy.validate_extension("test.PNG").unwrap(), "png");
        assert!(policy.validate_extension("test.gif").is_err());
        assert!(policy.validate_extension("noextension").is_err());
    }

    #[test]
    fn test_validate_content_type_strips_parameters() {
        let policy = test_policy();
        assert_eq!(
            policy.validate_content_type("IMAGE/PNG; charset=binary").unwrap(),
            "image/png"
        );
        assert!(policy.validate_content_type("image/gif").is_err());
    }

    #[test]
    fn test_extension_content_type_mismatch() {
        let policy = test_policy();
        assert!(policy
            .validate_extension_content_type_match("jpg", "image/jpeg")
            .is_ok());
        assert!(matches!(
            policy.validate_extension_content_type_match("jpg", "image/png"),
            Err(ValidationError::ContentTypeMismatch { .. })
        ));
        assert!(policy
            .validate_extension_content_type_match("xyz", "application/xyz")
            .is_ok());
        assert!(!policy.is_allowed_type("photo.png", "application/zip"));
        assert!(policy.is_allowed_type("photo.png", "image/png"));
    }

    #[test]
    fn test_validate_rejects_flagged_content() {
        let policy = test_policy();
        let err = policy
            .validate("setup.zip", "application/zip", b"MZ\x90\x00rest")
            .unwrap_err();
        assert!(matches!(err, ValidationError::Unsafe(_)));
        assert!(AppError::from(err).is_validation());
    }

    #[test]
    fn test_validate_returns_sanitized_upload() {
        let policy = test_policy();
        let validated = policy
            .validate("my photo (1).PNG", "image/png", b"\x89PNG....")
            .unwrap();
        assert_eq!(validated.safe_name, "my_photo__1_.PNG");
        assert_eq!(validated.extension, "png");
        assert_eq!(validated.content_type, "image/png");
    }

    #[test]
    fn sanitize_filename_rejects_path_traversal() {
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("foo/../bar.png").is_err());
        assert!(sanitize_filename("....").is_err());
    }

    #[test]
    fn sanitize_filename_strips_directories() {
        assert_eq!(sanitize_filename("/tmp/uploads/image.png").unwrap(), "image.png");
        assert_eq!(sanitize_filename("my-file_1.jpg").unwrap(), "my-file_1.jpg");
    }
}
