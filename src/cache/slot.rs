//! Slot Module
//!
//! A single addressable element of the virtualized sequence. A slot starts out
//! loading, is populated once its page arrives, and can be watched for changes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

// == Slot State ==
/// Load state of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState<T> {
    /// Page fetch outstanding
    Loading,
    /// Record available
    Loaded(T),
    /// Page fetch failed; carries the provider's error message
    Failed(Arc<str>),
}

impl<T> SlotState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, SlotState::Loading)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SlotState::Failed(_))
    }

    /// Borrows the record, if loaded.
    pub fn value(&self) -> Option<&T> {
        match self {
            SlotState::Loaded(value) => Some(value),
            _ => None,
        }
    }
}

// == Slot ==
/// Placeholder for one element, shared between the cache and its consumers.
///
/// Value and loading changes are published through a watch channel, so one
/// update carries both. `observers` is an explicit pin count held by
/// [`SlotSubscription`] handles; a page with any observed slot is never evicted.
#[derive(Debug)]
pub struct Slot<T> {
    index: usize,
    state: watch::Sender<SlotState<T>>,
    observers: AtomicUsize,
}

impl<T: Clone> Slot<T> {
    // == Constructor ==
    /// Creates a loading slot at the given global index.
    pub fn new(index: usize) -> Self {
        let (state, _) = watch::channel(SlotState::Loading);
        Self {
            index,
            state,
            observers: AtomicUsize::new(0),
        }
    }

    /// Creates a slot already holding a value.
    pub fn loaded(index: usize, value: T) -> Self {
        let slot = Self::new(index);
        slot.populate(value);
        slot
    }

    /// Global position of this slot. Never changes.
    pub fn index(&self) -> usize {
        self.index
    }

    /// One-based position, for display.
    pub fn item_number(&self) -> usize {
        self.index + 1
    }

    // == Get ==
    /// Returns the record, or `None` while loading or after a failure.
    pub fn get(&self) -> Option<T> {
        self.state.borrow().value().cloned()
    }

    /// Returns a snapshot of the full state.
    pub fn state(&self) -> SlotState<T> {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn is_failed(&self) -> bool {
        self.state.borrow().is_failed()
    }

    /// Error message of a failed fetch.
    pub fn error(&self) -> Option<Arc<str>> {
        match &*self.state.borrow() {
            SlotState::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    // == State Transitions ==
    /// Stores the fetched record and notifies watchers.
    pub(crate) fn populate(&self, value: T) {
        self.state.send_replace(SlotState::Loaded(value));
    }

    /// Marks the fetch for this slot as failed.
    pub(crate) fn fail(&self, message: Arc<str>) {
        self.state.send_replace(SlotState::Failed(message));
    }

    /// Returns the slot to loading ahead of a retry.
    pub(crate) fn reset(&self) {
        self.state.send_if_modified(|state| {
            if state.is_loading() {
                false
            } else {
                *state = SlotState::Loading;
                true
            }
        });
    }

    // == Observation ==
    /// Whether any subscription currently pins this slot.
    pub fn is_observed(&self) -> bool {
        self.observers.load(Ordering::Acquire) > 0
    }

    pub fn observer_count(&self) -> usize {
        self.observers.load(Ordering::Acquire)
    }

    /// Subscribes to changes, pinning the slot (and its page) until the
    /// returned handle is dropped.
    pub fn subscribe(self: &Arc<Self>) -> SlotSubscription<T> {
        self.observers.fetch_add(1, Ordering::AcqRel);
        SlotSubscription {
            receiver: self.state.subscribe(),
            slot: Arc::clone(self),
        }
    }
}

// == Slot Subscription ==
/// Change feed for one slot. Dropping it releases the pin.
#[derive(Debug)]
pub struct SlotSubscription<T> {
    slot: Arc<Slot<T>>,
    receiver: watch::Receiver<SlotState<T>>,
}

impl<T: Clone> SlotSubscription<T> {
    pub fn slot(&self) -> &Arc<Slot<T>> {
        &self.slot
    }

    /// Current state without waiting.
    pub fn state(&self) -> SlotState<T> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next change and returns the new state.
    pub async fn changed(&mut self) -> SlotState<T> {
        // The sender lives inside `self.slot`, so it cannot close under us.
        let _ = self.receiver.changed().await;
        self.receiver.borrow_and_update().clone()
    }

    /// Waits until the slot is no longer loading.
    pub async fn settled(&mut self) -> SlotState<T> {
        let settled = self
            .receiver
            .wait_for(|state| !state.is_loading())
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.state())
    }
}

impl<T> Drop for SlotSubscription<T> {
    fn drop(&mut self) {
        self.slot.observers.fetch_sub(1, Ordering::AcqRel);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_starts_loading() {
        let slot: Slot<String> = Slot::new(7);

        assert_eq!(slot.index(), 7);
        assert_eq!(slot.item_number(), 8);
        assert!(slot.is_loading());
        assert!(slot.get().is_none());
        assert!(!slot.is_observed());
    }

    #[test]
    fn test_populate_clears_loading() {
        let slot = Slot::new(0);
        slot.populate("record".to_string());

        assert!(!slot.is_loading());
        assert_eq!(slot.get(), Some("record".to_string()));
    }

    #[test]
    fn test_failed_is_distinct_from_loading() {
        let slot: Slot<u32> = Slot::new(3);
        slot.fail(Arc::from("backend down"));

        assert!(!slot.is_loading());
        assert!(slot.is_failed());
        assert!(slot.get().is_none());
        assert_eq!(slot.error().as_deref(), Some("backend down"));

        slot.reset();
        assert!(slot.is_loading());
    }

    #[test]
    fn test_subscription_pins_until_dropped() {
        let slot = Arc::new(Slot::<u32>::new(1));

        let first = slot.subscribe();
        let second = slot.subscribe();
        assert_eq!(slot.observer_count(), 2);

        drop(first);
        assert!(slot.is_observed());

        drop(second);
        assert!(!slot.is_observed());
    }

    #[tokio::test]
    async fn test_subscriber_sees_population() {
        let slot = Arc::new(Slot::new(0));
        let mut sub = slot.subscribe();

        let writer = slot.clone();
        tokio::spawn(async move {
            writer.populate(42u32);
        });

        assert_eq!(sub.settled().await, SlotState::Loaded(42));
    }
}
