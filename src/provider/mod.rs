//! Provider Module
//!
//! The record source contract the paged cache consumes, plus a lock-guarded
//! wrapper and an in-memory journal implementation.

mod guarded;
mod memory;

pub use guarded::GuardedProvider;
pub use memory::{JournalFilter, JournalRecord, MemoryJournal, SortOrder};

use std::fmt::Debug;
use std::sync::Arc;

// == Range Fetch ==
/// Result of a ranged fetch: the records plus the provider's view of the total.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFetch<T> {
    /// Records starting at the requested index, possibly fewer or more than asked
    pub records: Vec<T>,
    /// Total record count as observed while serving this fetch
    pub overall_count: usize,
}

impl<T> RangeFetch<T> {
    pub fn new(records: Vec<T>, overall_count: usize) -> Self {
        Self {
            records,
            overall_count,
        }
    }
}

// == Provider Trait ==
/// External data source backing a paged cache.
///
/// Every method is called from a worker thread, never from the thread that
/// owns the cache, and must not touch cache state. Filter and sort parameters
/// belong to the implementation and are applied on every call.
pub trait Provider: Send + Sync + 'static {
    /// Record type handed out through slots.
    type Record: Clone + Debug + Send + Sync + 'static;

    /// Total number of records available.
    fn fetch_count(&self) -> anyhow::Result<usize>;

    /// Fetches up to `len` records starting at `start`.
    fn fetch_range(&self, start: usize, len: usize) -> anyhow::Result<RangeFetch<Self::Record>>;

    /// Identifier of the newest record, or -1 when there is none.
    fn fetch_latest_id(&self) -> anyhow::Result<i64>;
}

impl<P: Provider> Provider for Arc<P> {
    type Record = P::Record;

    fn fetch_count(&self) -> anyhow::Result<usize> {
        (**self).fetch_count()
    }

    fn fetch_range(&self, start: usize, len: usize) -> anyhow::Result<RangeFetch<Self::Record>> {
        (**self).fetch_range(start, len)
    }

    fn fetch_latest_id(&self) -> anyhow::Result<i64> {
        (**self).fetch_latest_id()
    }
}
