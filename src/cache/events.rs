//! Change Notifications
//!
//! Structured events raised on the owning context and fanned out to
//! subscribers, each with its own delivery mode.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::cache::Slot;

/// Observable flag whose change is announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Property {
    IsLoading,
    IsInitializing,
    HasMoreItems,
    IsProcessed,
    FirstItemIsVisible,
}

/// Operation class a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FetchKind {
    Count,
    Page,
    LatestId,
    Reload,
}

// == Cache Event ==
/// Notification raised by the cache.
#[derive(Debug, Clone)]
pub enum CacheEvent<T> {
    /// Everything may have changed; re-read from scratch.
    Reset,
    /// New slots were appended at the tail, contiguous from `start`.
    ItemsAdded {
        start: usize,
        slots: Vec<Arc<Slot<T>>>,
    },
    /// A flag changed value.
    PropertyChanged(Property),
    /// A background fetch failed. Affected slots are left in the failed state.
    FetchFailed { kind: FetchKind, message: Arc<str> },
}

/// How a subscriber wants incremental additions delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Receive `ItemsAdded` with the new slots.
    #[default]
    Delta,
    /// Receive `Reset` in place of every `ItemsAdded`.
    Refresh,
}

/// Receiving end of a cache subscription.
pub type EventStream<T> = mpsc::UnboundedReceiver<CacheEvent<T>>;

// == Event Hub ==
/// Subscriber registry. Closed subscriptions are pruned on the next emit.
#[derive(Debug)]
pub struct EventHub<T> {
    listeners: Vec<(DeliveryMode, mpsc::UnboundedSender<CacheEvent<T>>)>,
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<T: Clone> EventHub<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, mode: DeliveryMode) -> EventStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push((mode, tx));
        rx
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn emit(&mut self, event: CacheEvent<T>) {
        self.listeners.retain(|(mode, tx)| {
            let delivered = match (mode, &event) {
                (DeliveryMode::Refresh, CacheEvent::ItemsAdded { .. }) => CacheEvent::Reset,
                _ => event.clone(),
            };
            tx.send(delivered).is_ok()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added() -> CacheEvent<u32> {
        CacheEvent::ItemsAdded {
            start: 4,
            slots: vec![Arc::new(Slot::loaded(4, 1))],
        }
    }

    #[test]
    fn test_delta_receives_payload() {
        let mut hub = EventHub::new();
        let mut rx = hub.subscribe(DeliveryMode::Delta);

        hub.emit(added());

        match rx.try_recv().unwrap() {
            CacheEvent::ItemsAdded { start, slots } => {
                assert_eq!(start, 4);
                assert_eq!(slots.len(), 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_refresh_receives_reset() {
        let mut hub = EventHub::new();
        let mut rx = hub.subscribe(DeliveryMode::Refresh);

        hub.emit(added());
        hub.emit(CacheEvent::PropertyChanged(Property::IsLoading));

        assert!(matches!(rx.try_recv().unwrap(), CacheEvent::Reset));
        assert!(matches!(
            rx.try_recv().unwrap(),
            CacheEvent::PropertyChanged(Property::IsLoading)
        ));
    }

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let mut hub: EventHub<u32> = EventHub::new();
        let rx = hub.subscribe(DeliveryMode::Delta);
        let _kept = hub.subscribe(DeliveryMode::Refresh);
        drop(rx);

        hub.emit(CacheEvent::Reset);
        assert_eq!(hub.len(), 1);
    }
}
