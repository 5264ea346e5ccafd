//! Tail Follower
//!
//! Watches the head of a growing journal. A probe compares the provider's
//! newest id with the last one seen; when the consumer is looking at the first
//! item the cache reloads from the head, otherwise `has_more_items` is raised
//! and the reload waits for [`TailFollower::load_more_items`].

use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::cache::async_cache::Delivery;
use crate::cache::{
    AsyncPagedCache, CacheEvent, CacheStats, DeliveryMode, EventStream, FetchKind, PageState,
    PagedCache, Property, Slot,
};
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};
use crate::provider::Provider;

/// Follower state. Anything but `Idle` counts as processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TailState {
    #[default]
    Idle,
    /// A latest-id probe is outstanding
    Probing,
    /// Waiting for page 0 to settle after the cache was emptied
    Reloading { deadline: Instant },
}

/// Point-in-time view of the follower's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TailSnapshot {
    pub count: usize,
    pub is_loading: bool,
    pub is_initializing: bool,
    pub has_more_items: bool,
    pub is_processed: bool,
    pub first_item_is_visible: bool,
    pub last_id: Option<i64>,
}

// == Tail Follower ==
pub struct TailFollower<P: Provider> {
    cache: AsyncPagedCache<P>,
    /// Newest id seen; `None` until the first probe lands
    last_id: Option<i64>,
    has_more_items: bool,
    first_item_is_visible: bool,
    state: TailState,
}

impl<P: Provider> TailFollower<P> {
    // == Constructors ==
    pub fn new(provider: Arc<P>, options: CacheOptions, runtime: Handle) -> Result<Self> {
        Ok(Self::from_cache(AsyncPagedCache::new(
            provider, options, runtime,
        )?))
    }

    pub fn with_current_runtime(provider: Arc<P>, options: CacheOptions) -> Result<Self> {
        Ok(Self::from_cache(AsyncPagedCache::with_current_runtime(
            provider, options,
        )?))
    }

    pub fn from_cache(cache: AsyncPagedCache<P>) -> Self {
        Self {
            cache,
            last_id: None,
            has_more_items: false,
            first_item_is_visible: false,
            state: TailState::Idle,
        }
    }

    // == Accessors ==
    pub fn cache(&self) -> &AsyncPagedCache<P> {
        &self.cache
    }

    pub fn paged(&self) -> &PagedCache<P> {
        self.cache.paged()
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    pub fn last_id(&self) -> Option<i64> {
        self.last_id
    }

    pub fn has_more_items(&self) -> bool {
        self.has_more_items
    }

    pub fn first_item_is_visible(&self) -> bool {
        self.first_item_is_visible
    }

    pub fn is_processed(&self) -> bool {
        self.state != TailState::Idle
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn count(&mut self) -> usize {
        self.cache.count()
    }

    pub fn item(&mut self, index: usize) -> Result<Arc<Slot<P::Record>>> {
        self.cache.item(index)
    }

    pub fn request_recount(&mut self) {
        self.cache.request_recount();
    }

    pub fn subscribe(&mut self, mode: DeliveryMode) -> EventStream<P::Record> {
        self.cache.subscribe(mode)
    }

    /// Deadline of the running reload, if any.
    pub fn reload_deadline(&self) -> Option<Instant> {
        match self.state {
            TailState::Reloading { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Whether a probe, reload or any fetch is still outstanding.
    pub fn has_pending_work(&self) -> bool {
        self.cache.has_outstanding() || self.is_processed()
    }

    pub fn snapshot(&self) -> TailSnapshot {
        TailSnapshot {
            count: self.cache.cached_count(),
            is_loading: self.cache.is_loading(),
            is_initializing: self.cache.is_initializing(),
            has_more_items: self.has_more_items,
            is_processed: self.is_processed(),
            first_item_is_visible: self.first_item_is_visible,
            last_id: self.last_id,
        }
    }

    /// Records whether the consumer currently shows the first item.
    pub fn set_first_item_is_visible(&mut self, visible: bool) {
        if self.first_item_is_visible != visible {
            self.first_item_is_visible = visible;
            self.cache
                .emit(CacheEvent::PropertyChanged(Property::FirstItemIsVisible));
        }
    }

    // == Triggers ==
    /// Starts a latest-id probe. Returns false when a comparison or reload is
    /// already in progress.
    pub fn compare_last_items(&mut self) -> bool {
        if self.state != TailState::Idle {
            debug!("Tail comparison skipped, state {:?}", self.state);
            return false;
        }
        self.set_state(TailState::Probing);
        self.cache.spawn_latest_id_probe();
        true
    }

    /// Reloads from the head on explicit request. Returns false while a
    /// reload is already running.
    pub fn load_more_items(&mut self) -> bool {
        if matches!(self.state, TailState::Reloading { .. }) {
            debug!("Reload already in progress");
            return false;
        }
        self.begin_reload();
        true
    }

    // == Dispatch ==
    /// Waits for one result and applies it. While reloading the wait is
    /// bounded by the reload deadline; expiry aborts the reload.
    pub async fn dispatch_next(&mut self) -> bool {
        if let TailState::Reloading { deadline } = self.state {
            if !self.cache.has_outstanding() {
                self.abort_reload("no fetch outstanding for the first page".to_string());
                return true;
            }
            return match timeout_at(deadline, self.cache.recv()).await {
                Ok(Some(delivery)) => {
                    self.apply(delivery);
                    true
                }
                Ok(None) => false,
                Err(_) => {
                    let timeout = self.cache.options().reload_timeout;
                    self.abort_reload(CacheError::ReloadTimedOut(timeout).to_string());
                    true
                }
            };
        }

        if !self.cache.has_outstanding() {
            return false;
        }
        match self.cache.recv().await {
            Some(delivery) => {
                self.apply(delivery);
                true
            }
            None => false,
        }
    }

    /// Applies every result already delivered, without waiting.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(delivery) = self.cache.try_recv() {
            self.apply(delivery);
            applied += 1;
        }
        if let TailState::Reloading { deadline } = self.state {
            if Instant::now() >= deadline {
                let timeout = self.cache.options().reload_timeout;
                self.abort_reload(CacheError::ReloadTimedOut(timeout).to_string());
            }
        }
        applied
    }

    /// Dispatches until no fetch, probe or reload is outstanding.
    pub async fn settle(&mut self) {
        while self.dispatch_next().await {}
    }

    pub(crate) async fn recv(&mut self) -> Option<Delivery<P::Record>> {
        self.cache.recv().await
    }

    pub(crate) fn apply(&mut self, delivery: Delivery<P::Record>) {
        if let Some(probe) = self.cache.apply(delivery) {
            self.handle_probe(probe);
        }
        if matches!(self.state, TailState::Reloading { .. }) {
            self.check_reload();
        }
    }

    // == State Machine ==
    fn handle_probe(&mut self, result: anyhow::Result<i64>) {
        let reloading = matches!(self.state, TailState::Reloading { .. });

        let latest = match result {
            Ok(id) => id,
            Err(e) => {
                warn!("Latest id probe failed: {:#}", e);
                self.cache.emit_failure(FetchKind::LatestId, &e);
                if !reloading {
                    self.set_state(TailState::Idle);
                }
                return;
            }
        };

        let grew = match self.last_id {
            None => {
                debug!("First probe, latest id {}", latest);
                self.last_id = Some(latest);
                false
            }
            Some(previous) if latest > previous => {
                debug!("Latest id moved {} -> {}", previous, latest);
                self.last_id = Some(latest);
                true
            }
            Some(_) => false,
        };

        if reloading {
            return;
        }
        if !grew {
            self.set_state(TailState::Idle);
            return;
        }

        if self.first_item_is_visible && !self.has_more_items {
            self.begin_reload();
        } else {
            self.set_has_more_items(true);
            self.set_state(TailState::Idle);
        }
    }

    fn begin_reload(&mut self) {
        info!("Reloading from the head of the journal");
        self.cache.empty_cache();
        if !self.cache.paged().has_count() {
            self.cache.request_recount();
        }
        self.cache.request_head_page();

        let deadline = Instant::now() + self.cache.options().reload_timeout;
        self.set_state(TailState::Reloading { deadline });
    }

    fn check_reload(&mut self) {
        match self.cache.paged().page_state(0) {
            Some(PageState::Loaded) => self.finish_reload(),
            Some(PageState::Failed) => self.abort_reload("first page fetch failed".to_string()),
            Some(PageState::Pending) => {}
            None => {
                debug!("First page dropped during reload, requesting again");
                self.cache.request_head_page();
            }
        }
    }

    fn finish_reload(&mut self) {
        info!("Reload complete, count {}", self.cache.cached_count());
        self.set_has_more_items(false);
        self.cache.record_reset();
        self.cache.emit(CacheEvent::Reset);
        self.set_state(TailState::Idle);
    }

    fn abort_reload(&mut self, reason: String) {
        warn!("Reload aborted: {}", reason);
        self.set_has_more_items(true);
        self.cache.emit(CacheEvent::FetchFailed {
            kind: FetchKind::Reload,
            message: Arc::from(reason),
        });
        self.set_state(TailState::Idle);
    }

    fn set_has_more_items(&mut self, value: bool) {
        if self.has_more_items != value {
            self.has_more_items = value;
            self.cache
                .emit(CacheEvent::PropertyChanged(Property::HasMoreItems));
        }
    }

    fn set_state(&mut self, state: TailState) {
        let was_processed = self.is_processed();
        self.state = state;
        if was_processed != self.is_processed() {
            self.cache
                .emit(CacheEvent::PropertyChanged(Property::IsProcessed));
        }
    }
}
