//! Journal Owner Task
//!
//! Runs a [`TailFollower`] inside a single task. Everything else talks to it
//! through a cloneable [`JournalHandle`], so cache state is only ever touched
//! from the owner's loop.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::cache::{CacheStats, SlotState, TailFollower, TailSnapshot};
use crate::error::{CacheError, Result};
use crate::provider::Provider;

const COMMAND_BUFFER: usize = 64;

/// A run of slot states read in one go.
#[derive(Debug, Clone)]
pub struct ItemsWindow<T> {
    pub start: usize,
    /// Count at the time of the read
    pub count: usize,
    pub items: Vec<(usize, SlotState<T>)>,
}

enum Command<T> {
    Items {
        start: usize,
        len: usize,
        reply: oneshot::Sender<Result<ItemsWindow<T>>>,
    },
    State {
        reply: oneshot::Sender<TailSnapshot>,
    },
    Stats {
        reply: oneshot::Sender<CacheStats>,
    },
    LoadMore {
        reply: oneshot::Sender<bool>,
    },
    SetFirstItemVisible {
        visible: bool,
        reply: oneshot::Sender<TailSnapshot>,
    },
    Recount {
        reply: oneshot::Sender<()>,
    },
    CompareLastItems {
        reply: oneshot::Sender<bool>,
    },
}

// == Journal Handle ==
/// Cloneable client of the owner task. Every call fails with
/// [`CacheError::OwnerGone`] once the task has stopped.
#[derive(Debug)]
pub struct JournalHandle<T> {
    commands: mpsc::Sender<Command<T>>,
}

impl<T> Clone for JournalHandle<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Items { .. } => "Items",
            Command::State { .. } => "State",
            Command::Stats { .. } => "Stats",
            Command::LoadMore { .. } => "LoadMore",
            Command::SetFirstItemVisible { .. } => "SetFirstItemVisible",
            Command::Recount { .. } => "Recount",
            Command::CompareLastItems { .. } => "CompareLastItems",
        };
        f.write_str(name)
    }
}

impl<T: Send + 'static> JournalHandle<T> {
    async fn request<R>(&self, build: impl FnOnce(oneshot::Sender<R>) -> Command<T>) -> Result<R> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| CacheError::OwnerGone)?;
        response.await.map_err(|_| CacheError::OwnerGone)
    }

    /// Reads slot states for `start..start + len`, clamped to the count.
    /// Missing pages are requested; their slots come back as loading.
    pub async fn items(&self, start: usize, len: usize) -> Result<ItemsWindow<T>> {
        self.request(|reply| Command::Items { start, len, reply })
            .await?
    }

    pub async fn state(&self) -> Result<TailSnapshot> {
        self.request(|reply| Command::State { reply }).await
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Starts a reload from the head. False when one is already running.
    pub async fn load_more(&self) -> Result<bool> {
        self.request(|reply| Command::LoadMore { reply }).await
    }

    pub async fn set_first_item_visible(&self, visible: bool) -> Result<TailSnapshot> {
        self.request(|reply| Command::SetFirstItemVisible { visible, reply })
            .await
    }

    pub async fn recount(&self) -> Result<()> {
        self.request(|reply| Command::Recount { reply }).await
    }

    /// Starts a tail probe. False when the follower is busy.
    pub async fn compare_last_items(&self) -> Result<bool> {
        self.request(|reply| Command::CompareLastItems { reply })
            .await
    }
}

// == Owner Loop ==
/// Moves `tail` into a new task and returns the handle used to drive it.
///
/// The task stops when every handle has been dropped.
pub fn spawn_journal_owner<P: Provider>(
    tail: TailFollower<P>,
) -> (JournalHandle<P::Record>, JoinHandle<()>) {
    let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(run_owner(tail, receiver));
    (JournalHandle { commands }, task)
}

async fn run_owner<P: Provider>(
    mut tail: TailFollower<P>,
    mut commands: mpsc::Receiver<Command<P::Record>>,
) {
    info!("Journal owner started");
    tail.count();

    loop {
        let deadline = tail.reload_deadline();

        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => handle_command(&mut tail, command),
                None => break,
            },
            Some(delivery) = tail.recv() => tail.apply(delivery),
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                tail.dispatch_pending();
            }
        }
    }

    info!("Journal owner stopped");
}

fn handle_command<P: Provider>(tail: &mut TailFollower<P>, command: Command<P::Record>) {
    debug!("Owner handling {:?}", command);
    match command {
        Command::Items { start, len, reply } => {
            let _ = reply.send(read_window(tail, start, len));
        }
        Command::State { reply } => {
            let _ = reply.send(tail.snapshot());
        }
        Command::Stats { reply } => {
            let _ = reply.send(tail.stats());
        }
        Command::LoadMore { reply } => {
            let _ = reply.send(tail.load_more_items());
        }
        Command::SetFirstItemVisible { visible, reply } => {
            tail.set_first_item_is_visible(visible);
            let _ = reply.send(tail.snapshot());
        }
        Command::Recount { reply } => {
            tail.request_recount();
            let _ = reply.send(());
        }
        Command::CompareLastItems { reply } => {
            let _ = reply.send(tail.compare_last_items());
        }
    }
}

fn read_window<P: Provider>(
    tail: &mut TailFollower<P>,
    start: usize,
    len: usize,
) -> Result<ItemsWindow<P::Record>> {
    let count = tail.count();
    let end = start.saturating_add(len).min(count);

    let items = (start..end)
        .map(|index| tail.item(index).map(|slot| (index, slot.state())))
        .collect::<Result<Vec<_>>>()?;

    Ok(ItemsWindow {
        start,
        count,
        items,
    })
}

/// Waits until every slot in the window has settled. Test helper.
#[cfg(test)]
pub(crate) async fn wait_for_window<T: Clone + Send + 'static>(
    handle: &JournalHandle<T>,
    start: usize,
    len: usize,
) -> ItemsWindow<T> {
    for _ in 0..100 {
        let window = handle.items(start, len).await.unwrap();
        let settled = window.count > 0 && window.items.iter().all(|(_, s)| !s.is_loading());
        if settled {
            return window;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("window {}..{} never settled", start, start + len);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheOptions;
    use crate::provider::{JournalRecord, MemoryJournal, SortOrder};
    use std::sync::Arc;
    use std::time::Duration;

    fn spawn(journal: Arc<MemoryJournal>) -> (JournalHandle<JournalRecord>, JoinHandle<()>) {
        let tail = TailFollower::with_current_runtime(
            journal,
            CacheOptions::new(10, Duration::from_secs(60)),
        )
        .unwrap();
        spawn_journal_owner(tail)
    }

    #[tokio::test]
    async fn test_items_window_loads() {
        let journal = Arc::new(MemoryJournal::with_records(30).with_order(SortOrder::OldestFirst));
        let (handle, _task) = spawn(journal);

        let window = wait_for_window(&handle, 8, 5).await;
        assert_eq!(window.count, 30);
        let ids: Vec<i64> = window
            .items
            .iter()
            .map(|(_, s)| s.value().unwrap().id)
            .collect();
        assert_eq!(ids, vec![8, 9, 10, 11, 12]);
    }

    #[tokio::test]
    async fn test_window_clamped_to_count() {
        let journal = Arc::new(MemoryJournal::with_records(12));
        let (handle, _task) = spawn(journal);

        let window = wait_for_window(&handle, 10, 50).await;
        assert_eq!(window.items.len(), 2);

        let beyond = handle.items(40, 5).await.unwrap();
        assert!(beyond.items.is_empty());
    }

    #[tokio::test]
    async fn test_visibility_and_load_more() {
        let journal = Arc::new(MemoryJournal::with_records(3));
        let (handle, _task) = spawn(journal.clone());
        wait_for_window(&handle, 0, 3).await;

        let snapshot = handle.set_first_item_visible(true).await.unwrap();
        assert!(snapshot.first_item_is_visible);

        journal.append("test", "late");
        assert!(handle.load_more().await.unwrap());

        let window = wait_for_window(&handle, 0, 10).await;
        assert_eq!(window.count, 4);
        assert_eq!(window.items[0].1.value().unwrap().id, 3);
    }

    #[tokio::test]
    async fn test_handle_fails_after_owner_stops() {
        let journal = Arc::new(MemoryJournal::new());
        let (handle, task) = spawn(journal);

        task.abort();
        let _ = task.await;

        assert!(matches!(handle.state().await, Err(CacheError::OwnerGone)));
    }
}
