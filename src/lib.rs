//! Paged Journal - a virtualized paged cache over large journals
//!
//! Presents a huge, growing record sequence as an indexable list. Records are
//! fetched a page at a time on background workers, idle pages are evicted,
//! and a tail follower notices new records at the head of the journal.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod provider;
pub mod tasks;

pub use api::AppState;
pub use cache::{AsyncPagedCache, PagedCache, TailFollower};
pub use config::{CacheOptions, Config};
pub use error::{CacheError, Result};
pub use provider::{GuardedProvider, MemoryJournal, Provider};
pub use tasks::{spawn_append_task, spawn_journal_owner, spawn_poll_ticker};
