//! Cairn Core Library
//!
//! Domain models, error types, and configuration shared by every Cairn crate.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{Config, StoreConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};

pub type AppResult<T> = Result<T, AppError>;
