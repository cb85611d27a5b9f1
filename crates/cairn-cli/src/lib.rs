//! Helpers for the `cairn` command-line tool.

use cairn_core::{AppError, ErrorMetadata};
use std::path::Path;

/// Exit status for a successful command.
pub const EXIT_OK: i32 = 0;
/// Exit status when `verify` finds damaged content.
pub const EXIT_DAMAGED: i32 = 2;
/// Exit status for rejected input (sysexits `EX_DATAERR`).
pub const EXIT_INVALID: i32 = 65;
/// Exit status for failures worth retrying (sysexits `EX_TEMPFAIL`).
pub const EXIT_RETRY: i32 = 75;
/// Exit status for any other failure.
pub const EXIT_FAILURE: i32 = 1;

/// Content type for a local file, from its extension.
pub fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        _ => "application/octet-stream",
    }
}

/// Parse a `key=value` tag argument.
pub fn parse_tag(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("tag '{}' must look like key=value", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("tag '{}' has an empty key", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Machine-readable description of a failed command, printed on stderr.
pub fn error_report(err: &AppError) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": err.error_code(),
            "message": err.client_message(),
            "recoverable": err.is_recoverable(),
        }
    })
}

pub fn exit_code(err: &AppError) -> i32 {
    if err.is_validation() {
        EXIT_INVALID
    } else if err.is_recoverable() {
        EXIT_RETRY
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_report_uses_client_message() {
        let report = error_report(&AppError::Internal("pool exhausted at 10.0.0.3".to_string()));
        assert_eq!(report["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(report["error"]["message"], "Internal error");
        assert_eq!(report["error"]["recoverable"], true);

        let report = error_report(&AppError::Validation("Empty file".to_string()));
        assert_eq!(report["error"]["message"], "Empty file");
    }

    #[test]
    fn exit_code_by_error_class() {
        assert_eq!(exit_code(&AppError::Validation("x".into())), EXIT_INVALID);
        assert_eq!(exit_code(&AppError::InvalidInput("x".into())), EXIT_INVALID);
        assert_eq!(exit_code(&AppError::Timeout("x".into())), EXIT_RETRY);
        assert_eq!(
            exit_code(&AppError::Integrity {
                expected: 2,
                actual: 1
            }),
            EXIT_RETRY
        );
        assert_eq!(exit_code(&AppError::NotFound("x".into())), EXIT_FAILURE);
    }

    #[test]
    fn guess_content_type_known_and_unknown() {
        assert_eq!(guess_content_type(Path::new("a/b/photo.JPG")), "image/jpeg");
        assert_eq!(guess_content_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(
            guess_content_type(Path::new("blob")),
            "application/octet-stream"
        );
    }

    #[test]
    fn parse_tag_splits_on_first_equals() {
        assert_eq!(
            parse_tag("env=prod=eu").unwrap(),
            ("env".to_string(), "prod=eu".to_string())
        );
        assert!(parse_tag("novalue").is_err());
        assert!(parse_tag("=x").is_err());
    }
}
