//! Paged Cache Module
//!
//! Synchronous core: maps element indices to lazily fetched pages, tracks the
//! authoritative count, and evicts idle pages.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::cache::{CacheStats, Page, PageState, Slot};
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};
use crate::provider::{Provider, RangeFetch};

// == Page Request ==
/// A page fetch the cache wants issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_index: usize,
    pub start: usize,
    pub len: usize,
}

/// Outcome of applying a count fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountChange {
    Unchanged,
    /// Count differed; all pages were dropped.
    Reset,
}

/// Outcome of applying a page fetch.
#[derive(Debug, Clone)]
pub enum PageChange<T> {
    /// The page was evicted while its fetch was in flight.
    Dropped,
    /// Slots filled, count unchanged.
    Populated,
    /// The tail page grew the sequence; `slots` cover every new index.
    Extended {
        start: usize,
        slots: Vec<Arc<Slot<T>>>,
    },
    /// Count changed in a way that invalidates all pages.
    Reset,
}

// == Paged Cache ==
/// Sparse page map over a [`Provider`].
#[derive(Debug)]
pub struct PagedCache<P: Provider> {
    provider: Arc<P>,
    options: CacheOptions,
    /// Authoritative count; `None` until the first count fetch lands
    count: Option<usize>,
    pages: HashMap<usize, Page<P::Record>>,
    /// Page indices with an outstanding fetch
    in_flight: HashSet<usize>,
    stats: CacheStats,
}

impl<P: Provider> PagedCache<P> {
    // == Constructor ==
    pub fn new(provider: Arc<P>, options: CacheOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            provider,
            options,
            count: None,
            pages: HashMap::new(),
            in_flight: HashSet::new(),
            stats: CacheStats::new(),
        })
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn page_size(&self) -> usize {
        self.options.page_size
    }

    /// Cached count, 0 until known.
    pub fn count(&self) -> usize {
        self.count.unwrap_or(0)
    }

    /// Whether a count fetch has landed since construction.
    pub fn has_count(&self) -> bool {
        self.count.is_some()
    }

    pub fn page_index_of(&self, index: usize) -> usize {
        index / self.options.page_size
    }

    pub fn page(&self, page_index: usize) -> Option<&Page<P::Record>> {
        self.pages.get(&page_index)
    }

    pub fn page_state(&self, page_index: usize) -> Option<PageState> {
        self.pages.get(&page_index).map(|page| page.state())
    }

    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }

    /// Number of page fetches still outstanding.
    pub fn pages_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_resident_pages(self.pages.len());
        stats
    }

    // == Resolve ==
    /// Returns the slot for `index` and the page fetches needed to fill it.
    ///
    /// Sweeps idle pages first, so a stale owning page is evicted and fetched
    /// again. Placeholder slots are returned while fetches are outstanding.
    ///
    /// # Arguments
    /// * `index` - Element index, must be below the cached count
    ///
    /// # Returns
    /// * `Ok((slot, requests))` - The slot (possibly still loading) and any
    ///   page fetches, neighbour prefetch included, the caller must issue
    /// * `Err(CacheError::OutOfRange)` - If `index` is at or past the count
    pub fn resolve(&mut self, index: usize) -> Result<(Arc<Slot<P::Record>>, Vec<PageRequest>)> {
        let count = self.count();
        if index >= count {
            return Err(CacheError::OutOfRange { index, count });
        }

        self.cleanup_pages(Instant::now());

        let page_size = self.options.page_size;
        let page_index = index / page_size;
        let offset = index % page_size;

        let mut requests = Vec::new();
        if self.page_state(page_index) == Some(PageState::Loaded) {
            self.stats.record_hit();
        }
        requests.extend(self.request_page(page_index));

        if self.options.prefetch_neighbours {
            let half = page_size / 2;
            if offset > half && (page_index + 1) * page_size < count {
                requests.extend(self.request_page(page_index + 1));
            }
            if offset < half && page_index > 0 {
                requests.extend(self.request_page(page_index - 1));
            }
        }

        let slot = self
            .pages
            .get(&page_index)
            .and_then(|page| page.slot(index))
            .cloned()
            .ok_or(CacheError::OutOfRange { index, count })?;

        Ok((slot, requests))
    }

    /// Ensures a page exists, touching it. Returns a fetch request when the
    /// page is not loaded and no fetch for it is already outstanding.
    ///
    /// Pending pages with no outstanding fetch are tail placeholders created
    /// by [`apply_page`](Self::apply_page); they are fetched on first access.
    pub fn request_page(&mut self, page_index: usize) -> Option<PageRequest> {
        let page_size = self.options.page_size;
        let first_index = page_index * page_size;

        let needs_fetch = match self.pages.get_mut(&page_index) {
            Some(page) => {
                page.touch();
                match page.state() {
                    PageState::Loaded => false,
                    PageState::Pending => true,
                    PageState::Failed => {
                        page.reset();
                        true
                    }
                }
            }
            None => {
                self.pages
                    .insert(page_index, Page::new(first_index, page_size));
                true
            }
        };

        if needs_fetch && self.in_flight.insert(page_index) {
            self.stats.record_miss();
            Some(PageRequest {
                page_index,
                start: first_index,
                len: page_size,
            })
        } else {
            None
        }
    }

    // == Apply Count ==
    /// Merges a count fetch. A different count drops every page.
    pub fn apply_count(&mut self, new_count: usize) -> CountChange {
        if new_count == self.count() {
            self.count = Some(new_count);
            return CountChange::Unchanged;
        }

        info!("Count changed {} -> {}, resetting cache", self.count(), new_count);
        self.count = Some(new_count);
        self.empty_cache();
        self.stats.record_reset();
        CountChange::Reset
    }

    // == Apply Page ==
    /// Merges a page fetch into whatever page currently sits at `page_index`.
    ///
    /// Growth reported while fetching the page holding the last known element
    /// extends the sequence. Any other count change drops every page.
    ///
    /// # Arguments
    /// * `page_index` - Page the fetch was issued for
    /// * `fetched` - Records plus the provider's overall count
    ///
    /// # Returns
    /// * `PageChange::Dropped` - If the page was evicted meanwhile
    /// * `PageChange::Populated` - If the count did not change
    /// * `PageChange::Extended` - Slots for every index in `old..new` count;
    ///   those past the fetched page sit in placeholder pages
    /// * `PageChange::Reset` - If the count changed any other way
    pub fn apply_page(
        &mut self,
        page_index: usize,
        fetched: RangeFetch<P::Record>,
    ) -> PageChange<P::Record> {
        self.in_flight.remove(&page_index);

        let page_size = self.options.page_size;
        let old_count = self.count();
        let new_count = fetched.overall_count;
        let tail_page = old_count.saturating_sub(1) / page_size;

        let Some(page) = self.pages.get_mut(&page_index) else {
            debug!("Dropping result for evicted page {}", page_index);
            return PageChange::Dropped;
        };
        page.populate(fetched.records);

        if new_count == old_count {
            return PageChange::Populated;
        }

        let page_end = page.first_index() + page.len();
        // A short page cannot be followed by further elements.
        let contiguous = page_end >= new_count || page.len() == page_size;

        if new_count > old_count && page_index == tail_page && contiguous {
            let mut slots: Vec<_> = page
                .slots()
                .iter()
                .filter(|slot| (old_count..new_count).contains(&slot.index()))
                .cloned()
                .collect();
            slots.extend(self.reserve_tail(page_end, new_count));

            debug!(
                "Tail page {} extended count {} -> {}",
                page_index, old_count, new_count
            );
            self.count = Some(new_count);
            return PageChange::Extended {
                start: old_count,
                slots,
            };
        }

        info!(
            "Page {} reported count {} (cached {}), resetting cache",
            page_index, new_count, old_count
        );
        self.count = Some(new_count);
        self.empty_cache();
        self.stats.record_reset();
        PageChange::Reset
    }

    /// Creates placeholder pages covering `from..to` and returns their slots.
    /// `from` is a page boundary.
    fn reserve_tail(&mut self, from: usize, to: usize) -> Vec<Arc<Slot<P::Record>>> {
        let page_size = self.options.page_size;
        let mut slots = Vec::new();
        let mut first = from;

        while first < to {
            let len = page_size.min(to - first);
            let page = self
                .pages
                .entry(first / page_size)
                .or_insert_with(|| Page::new(first, len));
            slots.extend(
                page.slots()
                    .iter()
                    .filter(|slot| (from..to).contains(&slot.index()))
                    .cloned(),
            );
            first += len;
        }
        slots
    }

    /// Marks an outstanding page fetch as failed. Returns whether the page
    /// was still resident.
    pub fn fail_page(&mut self, page_index: usize, message: Arc<str>) -> bool {
        self.in_flight.remove(&page_index);
        self.stats.record_failure();
        match self.pages.get_mut(&page_index) {
            Some(page) => {
                page.fail(message);
                true
            }
            None => false,
        }
    }

    pub(crate) fn record_failure(&mut self) {
        self.stats.record_failure();
    }

    pub(crate) fn record_reset(&mut self) {
        self.stats.record_reset();
    }

    // == Eviction ==
    /// Drops every page. The count is left untouched.
    pub fn empty_cache(&mut self) {
        self.pages.clear();
    }

    /// Evicts pages idle longer than the page timeout and not in use.
    pub fn cleanup_pages(&mut self, now: Instant) -> usize {
        let timeout = self.options.page_timeout;
        let before = self.pages.len();
        self.pages.retain(|_, page| !page.is_expired(timeout, now));
        let evicted = before - self.pages.len();

        if evicted > 0 {
            debug!("Evicted {} idle pages", evicted);
            self.stats.record_evictions(evicted);
        }
        evicted
    }

    // == Synchronous Access ==
    /// Fetches the count from the provider inline and merges it.
    pub fn request_recount(&mut self) -> Result<CountChange> {
        match self.provider.fetch_count() {
            Ok(count) => Ok(self.apply_count(count)),
            Err(e) => {
                self.stats.record_failure();
                Err(CacheError::Provider(e))
            }
        }
    }

    /// Returns the slot at `index`, fetching its page inline if needed.
    pub fn item(&mut self, index: usize) -> Result<Arc<Slot<P::Record>>> {
        if !self.has_count() {
            self.request_recount()?;
        }

        // A count change while fetching drops pages; one more round refills them.
        for _ in 0..2 {
            let (slot, requests) = self.resolve(index)?;
            for request in requests {
                self.load_page_inline(request)?;
            }
            let current = self.pages.get(&self.page_index_of(index)).and_then(|p| p.slot(index));
            if let Some(current) = current {
                if Arc::ptr_eq(current, &slot) || !current.is_loading() {
                    return Ok(current.clone());
                }
            }
        }

        let count = self.count();
        Err(CacheError::OutOfRange { index, count })
    }

    fn load_page_inline(&mut self, request: PageRequest) -> Result<()> {
        match self.provider.fetch_range(request.start, request.len) {
            Ok(fetched) => {
                self.apply_page(request.page_index, fetched);
                Ok(())
            }
            Err(e) => {
                self.fail_page(request.page_index, Arc::from(e.to_string()));
                Err(CacheError::Provider(e))
            }
        }
    }
}
