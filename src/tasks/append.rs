//! Demo Append Task
//!
//! Appends synthetic records to a [`MemoryJournal`] so the tail follower has
//! something to follow.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::provider::MemoryJournal;

const SOURCES: [&str; 4] = ["kernel", "sshd", "cron", "app"];

/// Spawns a task appending one record every `interval`.
pub fn spawn_append_task(journal: Arc<MemoryJournal>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting demo appender with interval of {:?}", interval);

        let mut sequence = 0usize;
        loop {
            tokio::time::sleep(interval).await;

            let source = SOURCES[sequence % SOURCES.len()];
            let id = journal.append(source, format!("synthetic event {}", sequence));
            debug!("Appended record {} from {}", id, source);
            sequence += 1;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_task_grows_journal() {
        let journal = Arc::new(MemoryJournal::new());
        let handle = spawn_append_task(journal.clone(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(journal.len() >= 3, "expected several appends, got {}", journal.len());
    }
}
