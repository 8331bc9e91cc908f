//! Write-through caches kept coherent with storage (spec §4.A).
//!
//! Three maps, each populated lazily and invalidated explicitly by
//! whichever code path just committed a write to storage — nothing ever
//! infers cache state from worker-local activity.

pub mod conjugation_cache;
pub mod key_cache;
pub mod verb_cache;

pub use conjugation_cache::ConjugationCache;
pub use key_cache::KeyCache;
pub use verb_cache::VerbCache;

use std::sync::atomic::{AtomicU64, Ordering};

/// Hit/miss counters shared by every cache (spec §4.A `stats()`).
#[derive(Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, entries: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries,
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}
