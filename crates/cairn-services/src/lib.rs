//! Cairn service layer
//!
//! Orchestration on top of persistence, processing, and caching: the `FileStore`
//! upload/read service, the per-digest lock manager and admission gate it relies on,
//! and the background cleanup scheduler.

pub mod admission;
pub mod cleanup;
pub mod lock;
pub mod upload;
pub mod urls;

pub use admission::{AdmissionControl, UploadPermit};
pub use cleanup::{CleanupReport, CleanupScheduler};
pub use lock::{DigestLockGuard, DigestLockManager};
pub use upload::{FileStore, UploadStage};
pub use urls::{PublicUrlBuilder, UrlBuilder};
