//! The `FileStore` service: upload pipeline, reads, and metadata mutations.

mod operations;
mod service;
mod stage;

pub use service::FileStore;
pub use stage::UploadStage;
