//! Page Module
//!
//! A contiguous run of slots filled by a single fetch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::Slot;

// == Page State ==
/// Fetch state of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Fetch outstanding, slots are placeholders
    Pending,
    /// Slots hold provider records
    Loaded,
    /// Fetch failed, slots carry the error
    Failed,
}

// == Page ==
/// Window of slots starting at `first_index`.
///
/// Invariant: `slots[i].index() == first_index + i`.
#[derive(Debug)]
pub struct Page<T> {
    first_index: usize,
    slots: Vec<Arc<Slot<T>>>,
    touched: Instant,
    state: PageState,
}

impl<T: Clone> Page<T> {
    // == Constructor ==
    /// Creates `len` loading slots starting at `first_index`.
    pub fn new(first_index: usize, len: usize) -> Self {
        let slots = (first_index..first_index + len)
            .map(|index| Arc::new(Slot::new(index)))
            .collect();
        Self {
            first_index,
            slots,
            touched: Instant::now(),
            state: PageState::Pending,
        }
    }

    pub fn first_index(&self) -> usize {
        self.first_index
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn slots(&self) -> &[Arc<Slot<T>>] {
        &self.slots
    }

    /// Slot holding the given global index, if this page covers it.
    pub fn slot(&self, index: usize) -> Option<&Arc<Slot<T>>> {
        index
            .checked_sub(self.first_index)
            .and_then(|offset| self.slots.get(offset))
    }

    // == Touch ==
    /// Refreshes the last-access time.
    pub fn touch(&mut self) {
        self.touched = Instant::now();
    }

    /// Idle time as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.touched)
    }

    /// Whether any slot is pinned by a subscriber.
    pub fn is_in_use(&self) -> bool {
        self.slots.iter().any(|slot| slot.is_observed())
    }

    /// Evictable: idle longer than `timeout` and not in use.
    pub fn is_expired(&self, timeout: Duration, now: Instant) -> bool {
        self.idle_for(now) > timeout && !self.is_in_use()
    }

    // == Populate ==
    /// Fills slots with fetched records.
    ///
    /// Extra records append slots continuing the index sequence; a short
    /// result truncates the trailing slots.
    pub fn populate(&mut self, records: Vec<T>) {
        let returned = records.len();
        let filled = returned.min(self.slots.len());
        let mut records = records.into_iter();

        for slot in &self.slots[..filled] {
            if let Some(record) = records.next() {
                slot.populate(record);
            }
        }

        self.slots.truncate(returned);

        for record in records {
            let index = self.first_index + self.slots.len();
            self.slots.push(Arc::new(Slot::loaded(index, record)));
        }

        self.state = PageState::Loaded;
        self.touch();
    }

    /// Marks every slot as failed.
    pub fn fail(&mut self, message: Arc<str>) {
        for slot in &self.slots {
            slot.fail(message.clone());
        }
        self.state = PageState::Failed;
    }

    /// Returns a failed page to pending, slots back to loading.
    pub fn reset(&mut self) {
        for slot in &self.slots {
            slot.reset();
        }
        self.state = PageState::Pending;
    }
}
