//! Content processing for the Cairn store
//!
//! Hashing, upload validation and safety scanning, kind dispatch, and image
//! thumbnailing. Everything here is free of I/O against the store itself.

pub mod factory;
pub mod hasher;
#[cfg(feature = "image")]
pub mod image;
pub mod scanner;
pub mod validator;

pub use factory::TypedFileFactory;
pub use hasher::{ContentDigest, ContentHasher};
#[cfg(feature = "image")]
pub use image::{ImageInfo, ImageThumbnailer, ThumbnailGenerator};
pub use scanner::{ContentScanner, NoopScanner, ScanResult, SignatureScanner};
pub use validator::{
    sanitize_filename, ContentPolicy, ContentValidator, ValidatedUpload, ValidationError,
};
