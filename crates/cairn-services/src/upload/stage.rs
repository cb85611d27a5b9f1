use cairn_core::AppError;
use std::fmt;
use std::time::Instant;

/// Where an upload is in the pipeline.
///
/// ```text
/// Received -> Validated -> Hashed -> DedupChecked -> DuplicateFound
///                                                 \-> Persisted -> PostProcessed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStage {
    Received,
    Validated,
    Hashed,
    DedupChecked,
    DuplicateFound,
    Persisted,
    PostProcessed,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Received => "received",
            UploadStage::Validated => "validated",
            UploadStage::Hashed => "hashed",
            UploadStage::DedupChecked => "dedup_checked",
            UploadStage::DuplicateFound => "duplicate_found",
            UploadStage::Persisted => "persisted",
            UploadStage::PostProcessed => "post_processed",
        }
    }

    pub fn can_advance_to(self, next: UploadStage) -> bool {
        use UploadStage::*;
        matches!(
            (self, next),
            (Received, Validated)
                | (Validated, Hashed)
                | (Hashed, DedupChecked)
                | (DedupChecked, DuplicateFound)
                | (DedupChecked, Persisted)
                | (Persisted, PostProcessed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStage::DuplicateFound | UploadStage::PostProcessed)
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one upload through its stages and traces every transition.
pub(crate) struct StageTracker {
    name: String,
    stage: UploadStage,
    started: Instant,
}

impl StageTracker {
    pub(crate) fn start(name: &str, size_bytes: usize) -> Self {
        tracing::debug!(
            upload.name = %name,
            size_bytes = size_bytes,
            stage = UploadStage::Received.as_str(),
            "Upload received"
        );
        Self {
            name: name.to_string(),
            stage: UploadStage::Received,
            started: Instant::now(),
        }
    }

    pub(crate) fn advance(&mut self, next: UploadStage) -> Result<(), AppError> {
        if !self.stage.can_advance_to(next) {
            return Err(AppError::Internal(format!(
                "Illegal upload stage transition {} -> {}",
                self.stage, next
            )));
        }
        tracing::debug!(
            upload.name = %self.name,
            from = self.stage.as_str(),
            stage = next.as_str(),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Upload stage transition"
        );
        self.stage = next;
        Ok(())
    }

    pub(crate) fn stage(&self) -> UploadStage {
        self.stage
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Drop for StageTracker {
    fn drop(&mut self) {
        if !self.stage.is_terminal() {
            tracing::debug!(
                upload.name = %self.name,
                stage = self.stage.as_str(),
                elapsed_ms = self.elapsed_ms(),
                "Upload ended before a terminal stage"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut tracker = StageTracker::start("a.txt", 3);
        for next in [
            UploadStage::Validated,
            UploadStage::Hashed,
            UploadStage::DedupChecked,
            UploadStage::Persisted,
            UploadStage::PostProcessed,
        ] {
            tracker.advance(next).unwrap();
        }
        assert!(tracker.stage().is_terminal());
    }

    #[test]
    fn test_duplicate_branch_is_terminal() {
        let mut tracker = StageTracker::start("a.txt", 3);
        tracker.advance(UploadStage::Validated).unwrap();
        tracker.advance(UploadStage::Hashed).unwrap();
        tracker.advance(UploadStage::DedupChecked).unwrap();
        tracker.advance(UploadStage::DuplicateFound).unwrap();
        assert!(tracker.stage().is_terminal());
        assert!(tracker.advance(UploadStage::Persisted).is_err());
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let mut tracker = StageTracker::start("a.txt", 3);
        let err = tracker.advance(UploadStage::Hashed).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(tracker.stage(), UploadStage::Received);
    }
}
