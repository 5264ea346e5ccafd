//! Cache Module
//!
//! Virtualized paged cache over a record provider: slots and pages, the
//! synchronous core, the background-fetching wrapper and the tail follower.

mod async_cache;
mod events;
mod page;
mod paged;
mod slot;
mod stats;
mod tail;


// Re-export public types
pub use async_cache::{AsyncPagedCache, FetchState};
pub use events::{CacheEvent, DeliveryMode, EventHub, EventStream, FetchKind, Property};
pub use page::{Page, PageState};
pub use paged::{CountChange, PageChange, PageRequest, PagedCache};
pub use slot::{Slot, SlotState, SlotSubscription};
pub use stats::CacheStats;
pub use tail::{TailFollower, TailSnapshot, TailState};
