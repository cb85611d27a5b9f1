#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// No room could be made without evicting recently used entries.
    #[error("Cache capacity exceeded: need {needed} bytes, {available} reclaimable")]
    CapacityExceeded { needed: usize, available: usize },

    #[error("Entry of {size} bytes exceeds the per-item limit of {max} bytes")]
    ItemTooLarge { size: usize, max: usize },
}

pub type CacheResult<T> = Result<T, CacheError>;
