//! Integration Tests for the Paged Cache and Tail Follower
//!
//! Drives the public cache API end to end against an in-memory journal
//! wrapped in the lock-guarded provider.

use paged_journal::cache::{
    AsyncPagedCache, CacheEvent, DeliveryMode, PageState, Property, SlotState, TailState,
};
use paged_journal::provider::SortOrder;
use paged_journal::{
    CacheError, CacheOptions, GuardedProvider, MemoryJournal, PagedCache, TailFollower,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

type Guarded = GuardedProvider<Arc<MemoryJournal>>;

fn guarded(journal: &Arc<MemoryJournal>) -> Arc<Guarded> {
    Arc::new(GuardedProvider::new(journal.clone()))
}

// == Tail Following ==

#[tokio::test]
async fn test_tail_follow_from_empty_journal() {
    let journal = Arc::new(MemoryJournal::new());
    let mut tail = assert_ok!(TailFollower::with_current_runtime(
        guarded(&journal),
        CacheOptions::default()
    ));
    assert_eq!(tail.paged().page_size(), 500);

    tail.count();
    tail.settle().await;
    tail.compare_last_items();
    tail.settle().await;
    assert_eq!(tail.last_id(), Some(-1));

    for i in 0..10 {
        journal.append("test", format!("record {}", i));
    }
    tail.set_first_item_is_visible(true);
    let mut events = tail.subscribe(DeliveryMode::Delta);

    assert!(tail.compare_last_items());
    tail.settle().await;

    assert_eq!(tail.count(), 10);
    assert!(!tail.has_more_items());
    assert_eq!(tail.state(), TailState::Idle);
    assert_eq!(tail.paged().page(0).unwrap().len(), 10);

    let mut saw_reset = false;
    let mut processed_changes = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            CacheEvent::Reset => saw_reset = true,
            CacheEvent::PropertyChanged(Property::IsProcessed) => processed_changes += 1,
            _ => {}
        }
    }
    assert!(saw_reset);
    assert_eq!(processed_changes, 2);
}

#[tokio::test]
async fn test_tail_follow_while_scrolled_away() {
    let journal = Arc::new(MemoryJournal::new());
    let mut tail = assert_ok!(TailFollower::with_current_runtime(
        guarded(&journal),
        CacheOptions::default()
    ));
    tail.count();
    tail.compare_last_items();
    tail.settle().await;

    for i in 0..10 {
        journal.append("test", format!("record {}", i));
    }
    tail.compare_last_items();
    tail.settle().await;

    assert!(tail.has_more_items());
    assert_eq!(tail.count(), 0, "nothing repopulated before load_more");

    tail.load_more_items();
    tail.settle().await;
    assert!(!tail.has_more_items());
    assert_eq!(tail.count(), 10);
}

#[tokio::test]
async fn test_repeated_comparisons_probe_once() {
    let journal = Arc::new(MemoryJournal::with_records(3).with_latency(Duration::from_millis(40)));
    let mut tail = assert_ok!(TailFollower::with_current_runtime(
        guarded(&journal),
        CacheOptions::default()
    ));

    assert!(tail.compare_last_items());
    assert!(!tail.compare_last_items());
    tail.settle().await;

    assert_eq!(journal.latest_id_calls(), 1);
}

// == Paging ==

#[tokio::test]
async fn test_item_750_fetches_second_page() {
    let journal = Arc::new(MemoryJournal::with_records(2000));
    let mut cache = assert_ok!(AsyncPagedCache::with_current_runtime(
        guarded(&journal),
        CacheOptions::default()
    ));
    cache.count();
    cache.settle().await;

    let slot = assert_ok!(cache.item(750));
    let mut subscription = slot.subscribe();
    let (state, _) = tokio::join!(subscription.settled(), cache.settle());

    match state {
        SlotState::Loaded(record) => assert_eq!(record.id, 2000 - 1 - 750),
        other => panic!("unexpected state {:?}", other),
    }
    assert_eq!(journal.range_calls(), 1);
    assert_eq!(cache.paged().page_state(1), Some(PageState::Loaded));
    assert_eq!(cache.paged().page(1).unwrap().first_index(), 500);
}

#[tokio::test]
async fn test_scrolling_lookahead_journal_adds_items() {
    let journal = Arc::new(
        MemoryJournal::with_records(35)
            .with_order(SortOrder::OldestFirst)
            .with_lookahead(10),
    );
    let options = CacheOptions {
        prefetch_neighbours: false,
        ..CacheOptions::new(10, Duration::from_secs(60))
    };
    let mut cache = assert_ok!(AsyncPagedCache::with_current_runtime(
        guarded(&journal),
        options
    ));
    assert_eq!(cache.count(), 0);
    cache.settle().await;
    assert_eq!(cache.count(), 20, "first page plus one page of look-ahead");
    let mut events = cache.subscribe(DeliveryMode::Delta);

    for index in [15, 25, 33] {
        assert_ok!(cache.item(index));
        cache.settle().await;
    }

    let mut added = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            CacheEvent::ItemsAdded { start, slots } => added.push((start, slots.len())),
            CacheEvent::Reset => panic!("scrolling to the tail reset the cache"),
            _ => {}
        }
    }
    assert_eq!(added, vec![(20, 10), (30, 5)]);
    assert_eq!(cache.count(), 35);
    assert_eq!(cache.stats().resets, 0);

    let last = assert_ok!(cache.item(34));
    assert_eq!(last.get().unwrap().id, 34);
}

#[tokio::test]
async fn test_short_range_truncates_page() {
    let journal = Arc::new(MemoryJournal::with_records(503).with_order(SortOrder::OldestFirst));
    let mut cache = assert_ok!(PagedCache::new(guarded(&journal), CacheOptions::default()));

    let slot = assert_ok!(cache.item(501));
    assert_eq!(slot.get().unwrap().id, 501);
    assert_eq!(cache.page(1).unwrap().len(), 3);
    assert_err!(cache.item(503));
}

#[tokio::test]
async fn test_idle_pages_evicted_unless_observed() {
    let journal = Arc::new(MemoryJournal::with_records(100));
    let options = CacheOptions::new(10, Duration::from_millis(40));
    let mut cache = assert_ok!(AsyncPagedCache::with_current_runtime(
        guarded(&journal),
        options
    ));
    cache.count();
    cache.settle().await;

    let pinned = assert_ok!(cache.item(2));
    let _pin = pinned.subscribe();
    assert_ok!(cache.item(42));
    cache.settle().await;

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_ok!(cache.item(95));

    assert!(cache.paged().page(0).is_some(), "observed page kept");
    assert!(cache.paged().page(4).is_none(), "idle page evicted");
    assert!(cache.stats().evictions >= 1);
}

#[tokio::test]
async fn test_sync_provider_failure_surfaces_error() {
    let journal = Arc::new(MemoryJournal::with_records(10));
    let mut cache = assert_ok!(PagedCache::new(guarded(&journal), CacheOptions::default()));

    journal.fail_next(1);
    let result = cache.item(0);
    assert!(matches!(result, Err(CacheError::Provider(_))));

    assert_ok!(cache.item(0));
}

#[tokio::test]
async fn test_refresh_subscribers_never_see_deltas() {
    let journal = Arc::new(MemoryJournal::with_records(5).with_order(SortOrder::OldestFirst));
    let options = CacheOptions {
        prefetch_neighbours: false,
        ..CacheOptions::new(10, Duration::from_secs(60))
    };
    let mut cache = assert_ok!(AsyncPagedCache::with_current_runtime(
        guarded(&journal),
        options
    ));
    cache.count();
    cache.settle().await;
    let mut refresh = cache.subscribe(DeliveryMode::Refresh);

    journal.append("test", "grown");
    assert_ok!(cache.item(4));
    cache.settle().await;

    let mut resets = 0;
    while let Ok(event) = refresh.try_recv() {
        assert!(!matches!(event, CacheEvent::ItemsAdded { .. }));
        if matches!(event, CacheEvent::Reset) {
            resets += 1;
        }
    }
    assert_eq!(resets, 1);
    assert_eq!(cache.count(), 6);
}
