//! Background Tasks Module
//!
//! Tasks that run for the lifetime of the server.
//!
//! # Tasks
//! - Journal owner: holds the tail follower and serves commands
//! - Poll ticker: triggers tail comparisons at a fixed interval
//! - Demo appender: grows the in-memory journal

mod append;
mod owner;
mod ticker;

pub use append::spawn_append_task;
pub use owner::{spawn_journal_owner, ItemsWindow, JournalHandle};
pub use ticker::spawn_poll_ticker;

#[cfg(test)]
pub(crate) use owner::wait_for_window;
