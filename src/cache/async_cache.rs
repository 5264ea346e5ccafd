//! Asynchronous Paged Cache
//!
//! Wraps [`PagedCache`] so provider calls run on the blocking worker pool.
//! Results come back over a channel and are merged only by the owner of the
//! cache (whoever holds `&mut`), which is also where notifications are raised.
//! Each worker waits for an acknowledgement before it finishes, so background
//! work never runs ahead of the owner by more than one result per worker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::cache::{
    CacheEvent, CacheStats, CountChange, DeliveryMode, EventHub, EventStream, FetchKind,
    PageChange, PageRequest, PagedCache, Property, Slot,
};
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};
use crate::provider::{Provider, RangeFetch};

// == Worker Results ==
/// What a worker computed.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Count(anyhow::Result<usize>),
    Page {
        page_index: usize,
        result: anyhow::Result<RangeFetch<T>>,
    },
    LatestId(anyhow::Result<i64>),
}

/// A worker result plus the acknowledgement the worker is parked on.
#[derive(Debug)]
pub(crate) struct Delivery<T> {
    outcome: Outcome<T>,
    ack: oneshot::Sender<()>,
}

/// In-flight state of an operation class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchState {
    #[default]
    Idle,
    InFlight,
}

/// Runs a provider call, turning a panic into an ordinary error.
fn run_guarded<R>(work: impl FnOnce() -> anyhow::Result<R>) -> anyhow::Result<R> {
    catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|_| Err(anyhow!("provider panicked")))
}

// == Async Paged Cache ==
/// Non-blocking paged cache. All mutation happens through `&mut self`.
pub struct AsyncPagedCache<P: Provider> {
    cache: PagedCache<P>,
    runtime: Handle,
    deliveries_tx: mpsc::UnboundedSender<Delivery<P::Record>>,
    deliveries_rx: mpsc::UnboundedReceiver<Delivery<P::Record>>,
    count_fetch: FetchState,
    /// Dispatched units whose results have not been applied yet
    outstanding: usize,
    is_loading: bool,
    is_initializing: bool,
    events: EventHub<P::Record>,
}

impl<P: Provider> AsyncPagedCache<P> {
    // == Constructor ==
    /// Creates a cache whose fetches run on `runtime`'s blocking pool.
    ///
    /// # Arguments
    /// * `provider` - Backing journal, shared with the worker tasks
    /// * `options` - Page size, page timeout, reload bound and prefetch
    /// * `runtime` - Runtime whose blocking pool runs provider calls
    ///
    /// # Returns
    /// * `Ok(AsyncPagedCache)` - With no count and no pages yet
    /// * `Err(CacheError::InvalidConfig)` - If `options` fail validation
    pub fn new(provider: Arc<P>, options: CacheOptions, runtime: Handle) -> Result<Self> {
        let cache = PagedCache::new(provider, options)?;
        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();
        Ok(Self {
            cache,
            runtime,
            deliveries_tx,
            deliveries_rx,
            count_fetch: FetchState::Idle,
            outstanding: 0,
            is_loading: false,
            is_initializing: false,
            events: EventHub::new(),
        })
    }

    /// Creates a cache on the runtime the caller is running in.
    pub fn with_current_runtime(provider: Arc<P>, options: CacheOptions) -> Result<Self> {
        let runtime =
            Handle::try_current().map_err(|e| CacheError::InvalidConfig(e.to_string()))?;
        Self::new(provider, options, runtime)
    }

    // == Accessors ==
    /// Read access to the synchronous core.
    pub fn paged(&self) -> &PagedCache<P> {
        &self.cache
    }

    pub fn options(&self) -> &CacheOptions {
        self.cache.options()
    }

    pub fn page_size(&self) -> usize {
        self.cache.page_size()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_initializing(&self) -> bool {
        self.is_initializing
    }

    pub fn count_fetch(&self) -> FetchState {
        self.count_fetch
    }

    /// Whether any dispatched result is still waiting to be applied.
    pub fn has_outstanding(&self) -> bool {
        self.outstanding > 0
    }

    /// Cached count without triggering a fetch.
    pub fn cached_count(&self) -> usize {
        self.cache.count()
    }

    /// Cached count. The first call starts the initial count fetch.
    pub fn count(&mut self) -> usize {
        if !self.cache.has_count() && self.count_fetch == FetchState::Idle {
            self.load_count();
        }
        self.cache.count()
    }

    pub fn subscribe(&mut self, mode: DeliveryMode) -> EventStream<P::Record> {
        self.events.subscribe(mode)
    }

    // == Item ==
    /// Returns the slot at `index`, scheduling background fetches for its page
    /// (and neighbours) when needed. The slot may still be loading.
    pub fn item(&mut self, index: usize) -> Result<Arc<Slot<P::Record>>> {
        let (slot, requests) = self.cache.resolve(index)?;
        for request in requests {
            self.load_page(request);
        }
        Ok(slot)
    }

    /// Drops every page. No notification; the count is kept.
    pub fn empty_cache(&mut self) {
        self.cache.empty_cache();
    }

    /// Starts a count fetch unless one is already in flight.
    pub fn request_recount(&mut self) {
        self.load_count();
    }

    // == Dispatch ==
    fn load_count(&mut self) {
        if self.count_fetch == FetchState::InFlight {
            debug!("Count fetch already in flight");
            return;
        }
        if self.cache.count() == 0 {
            self.set_initializing(true);
        }
        self.count_fetch = FetchState::InFlight;
        self.dispatch(|provider| Outcome::Count(run_guarded(|| provider.fetch_count())));
    }

    fn load_page(&mut self, request: PageRequest) {
        self.set_loading(true);
        debug!(
            "Fetching page {} ({}..{})",
            request.page_index,
            request.start,
            request.start + request.len
        );
        let PageRequest {
            page_index,
            start,
            len,
        } = request;
        self.dispatch(move |provider| Outcome::Page {
            page_index,
            result: run_guarded(|| provider.fetch_range(start, len)),
        });
    }

    /// Requests page 0 directly, regardless of the cached count.
    pub(crate) fn request_head_page(&mut self) {
        if let Some(request) = self.cache.request_page(0) {
            self.load_page(request);
        }
    }

    pub(crate) fn spawn_latest_id_probe(&mut self) {
        self.dispatch(|provider| Outcome::LatestId(run_guarded(|| provider.fetch_latest_id())));
    }

    fn dispatch<F>(&mut self, work: F)
    where
        F: FnOnce(&P) -> Outcome<P::Record> + Send + 'static,
    {
        let provider = Arc::clone(self.cache.provider());
        let deliveries = self.deliveries_tx.clone();
        self.outstanding += 1;

        let _ = self.runtime.spawn_blocking(move || {
            let outcome = work(&*provider);
            let (ack, acked) = oneshot::channel();
            if deliveries.send(Delivery { outcome, ack }).is_err() {
                return;
            }
            // Parked until the owner has applied the result (or dropped the cache).
            let _ = acked.blocking_recv();
        });
    }

    // == Receive ==
    pub(crate) async fn recv(&mut self) -> Option<Delivery<P::Record>> {
        self.deliveries_rx.recv().await
    }

    pub(crate) fn try_recv(&mut self) -> Option<Delivery<P::Record>> {
        self.deliveries_rx.try_recv().ok()
    }

    /// Waits for one result and applies it. Returns false when nothing was
    /// outstanding.
    pub async fn dispatch_next(&mut self) -> bool {
        if !self.has_outstanding() {
            return false;
        }
        match self.recv().await {
            Some(delivery) => {
                self.apply_unprobed(delivery);
                true
            }
            None => false,
        }
    }

    /// Applies every result already delivered, without waiting.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(delivery) = self.try_recv() {
            self.apply_unprobed(delivery);
            applied += 1;
        }
        applied
    }

    /// Dispatches until no fetch is outstanding.
    pub async fn settle(&mut self) {
        while self.dispatch_next().await {}
    }

    fn apply_unprobed(&mut self, delivery: Delivery<P::Record>) {
        if let Some(probe) = self.apply(delivery) {
            debug!("Ignoring latest-id probe with no follower: {:?}", probe.ok());
        }
    }

    // == Apply ==
    /// Merges a worker result. Latest-id probes are handed back to the caller.
    pub(crate) fn apply(&mut self, delivery: Delivery<P::Record>) -> Option<anyhow::Result<i64>> {
        let Delivery { outcome, ack } = delivery;
        self.outstanding = self.outstanding.saturating_sub(1);

        let probe = match outcome {
            Outcome::Count(result) => {
                self.count_completed(result);
                None
            }
            Outcome::Page { page_index, result } => {
                self.page_completed(page_index, result);
                None
            }
            Outcome::LatestId(result) => Some(result),
        };

        let _ = ack.send(());
        probe
    }

    fn count_completed(&mut self, result: anyhow::Result<usize>) {
        self.count_fetch = FetchState::Idle;
        match result {
            Ok(count) => {
                if self.cache.apply_count(count) == CountChange::Reset {
                    self.emit(CacheEvent::Reset);
                }
            }
            Err(e) => {
                warn!("Count fetch failed: {:#}", e);
                self.cache.record_failure();
                self.emit_failure(FetchKind::Count, &e);
            }
        }
        self.set_initializing(false);
    }

    fn page_completed(&mut self, page_index: usize, result: anyhow::Result<RangeFetch<P::Record>>) {
        match result {
            Ok(fetched) => match self.cache.apply_page(page_index, fetched) {
                PageChange::Dropped | PageChange::Populated => {}
                PageChange::Extended { start, slots } => {
                    info!("{} items appended at {}", slots.len(), start);
                    self.emit(CacheEvent::ItemsAdded { start, slots });
                }
                PageChange::Reset => self.emit(CacheEvent::Reset),
            },
            Err(e) => {
                warn!("Page {} fetch failed: {:#}", page_index, e);
                self.cache
                    .fail_page(page_index, Arc::from(format!("{:#}", e)));
                self.emit_failure(FetchKind::Page, &e);
            }
        }

        if self.cache.pages_in_flight() == 0 {
            self.set_loading(false);
        }
    }

    // == Notifications ==
    pub(crate) fn emit(&mut self, event: CacheEvent<P::Record>) {
        if matches!(event, CacheEvent::Reset) {
            debug!("Raising reset");
        }
        self.events.emit(event);
    }

    pub(crate) fn emit_failure(&mut self, kind: FetchKind, error: &anyhow::Error) {
        self.emit(CacheEvent::FetchFailed {
            kind,
            message: Arc::from(format!("{:#}", error)),
        });
    }

    pub(crate) fn record_reset(&mut self) {
        self.cache.record_reset();
    }

    fn set_loading(&mut self, value: bool) {
        if self.is_loading != value {
            self.is_loading = value;
            self.emit(CacheEvent::PropertyChanged(Property::IsLoading));
        }
    }

    fn set_initializing(&mut self, value: bool) {
        if self.is_initializing != value {
            self.is_initializing = value;
            self.emit(CacheEvent::PropertyChanged(Property::IsInitializing));
        }
    }
}
