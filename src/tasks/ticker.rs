//! Tail Poll Ticker
//!
//! Background task that periodically asks the journal owner to compare the
//! newest journal id with the last one it saw.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::tasks::JournalHandle;

/// Spawns a task that triggers a tail comparison every `interval`.
///
/// A tick that lands while the follower is still probing or reloading is
/// skipped by the follower itself. The task ends on its own once the owner
/// has shut down, or it can be aborted through the returned handle.
///
/// # Example
/// ```ignore
/// let (journal, owner) = spawn_journal_owner(tail);
/// let ticker = spawn_poll_ticker(journal.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// ticker.abort();
/// ```
pub fn spawn_poll_ticker<T: Send + 'static>(
    journal: JournalHandle<T>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting tail poll ticker with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            match journal.compare_last_items().await {
                Ok(true) => debug!("Tail probe started"),
                Ok(false) => debug!("Tail probe skipped, follower busy"),
                Err(_) => {
                    info!("Journal owner gone, stopping poll ticker");
                    break;
                }
            }
        }
    })
}
