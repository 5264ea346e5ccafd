//! Cache Statistics Module
//!
//! Tracks paging metrics including hits, page fetches, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks paged cache metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Element accesses served from an already loaded page
    pub hits: u64,
    /// Page fetches issued
    pub misses: u64,
    /// Pages evicted by the idle timeout sweep
    pub evictions: u64,
    /// Full resets (count changes, reloads)
    pub resets: u64,
    /// Failed provider calls
    pub fetch_failures: u64,
    /// Pages currently held
    pub resident_pages: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if nothing was accessed.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, pages: usize) {
        self.evictions += pages as u64;
    }

    pub fn record_reset(&mut self) {
        self.resets += 1;
    }

    pub fn record_failure(&mut self) {
        self.fetch_failures += 1;
    }

    pub fn set_resident_pages(&mut self, pages: usize) {
        self.resident_pages = pages;
    }
}
