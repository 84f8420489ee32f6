use contentbank_model::CacheInvalidator;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Cache generation counter.
///
/// Readers remember the epoch their cached data was built at and rebuild
/// once it moves.
#[derive(Debug, Default)]
pub struct EpochCache {
    epoch: AtomicU64,
}

impl EpochCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Whether data built at `seen` is still current.
    pub fn is_current(&self, seen: u64) -> bool {
        self.epoch() == seen
    }
}

impl CacheInvalidator for EpochCache {
    fn purge_all(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Content caches purged (epoch {})", epoch);
    }
}
