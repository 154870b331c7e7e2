use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Observes how often owners of native resources have been reclaimed.
///
/// [`crate::resource::ResourceTracker`] compares the count against the one it saw on its previous
/// sweep and skips the sweep entirely when nothing has been collected in between.
pub trait CollectionCounter: Debug + Send + Sync {
    /// Monotonic count of completed collections
    fn collection_count(&self) -> u64;

    /// Called from the finalization path of a tracked owner. May run on any thread and must
    /// not touch the native layer.
    fn record_finalization(&self) {}
}

/// Default counter: every finalized tracked owner counts as one collection
#[derive(Debug, Default)]
pub struct FinalizationCounter {
    finalized: AtomicU64,
}

impl FinalizationCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CollectionCounter for FinalizationCounter {
    fn collection_count(&self) -> u64 {
        self.finalized.load(Ordering::Acquire)
    }

    fn record_finalization(&self) {
        self.finalized.fetch_add(1, Ordering::AcqRel);
    }
}

/// A counter which only advances when [`ManualCollector::collect`] is called.
///
/// Finalizations are ignored, which makes sweeps fully deterministic.
#[derive(Debug, Default)]
pub struct ManualCollector {
    collections: AtomicU64,
}

impl ManualCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a completed major collection
    pub fn collect(&self) {
        self.collections.fetch_add(1, Ordering::AcqRel);
    }
}

impl CollectionCounter for ManualCollector {
    fn collection_count(&self) -> u64 {
        self.collections.load(Ordering::Acquire)
    }
}
