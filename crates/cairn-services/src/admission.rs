//! Global cap on uploads running at the same time.

use cairn_core::AppError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Slot in the upload gate. Returned to the gate on drop.
#[derive(Debug)]
pub struct UploadPermit {
    _permit: OwnedSemaphorePermit,
}

impl UploadPermit {
    pub fn release(self) {}
}

#[derive(Debug, Clone)]
pub struct AdmissionControl {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl AdmissionControl {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Wait for a free slot.
    pub async fn admit(&self) -> Result<UploadPermit, AppError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Internal("Upload gate is closed".to_string()))?;
        tracing::trace!(available = self.available(), "Upload admitted");
        Ok(UploadPermit { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for AdmissionControl {
    fn default() -> Self {
        let limit = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(limit)
    }
}
