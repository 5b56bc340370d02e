//! Cache-aware loader decorator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use segcache_common::urls::SegmentMatcher;
use tokio_util::sync::CancellationToken;

use super::{
    Loader, LoaderCallbacks, LoaderConfig, LoaderContext, LoaderError, LoaderFactory,
    LoaderResponse, LoaderStats,
};
use crate::cache::SegmentCache;

/// Shortest transfer time reported for a cache hit. Keeps bandwidth
/// estimators from seeing an instantaneous transfer.
const MIN_CACHED_DURATION: Duration = Duration::from_millis(1);

#[derive(Default)]
struct Slot {
    generation: u64,
    /// Set while a cache lookup is pending, cleared once the load is handed
    /// to the inner loader or served.
    cancel: Option<CancellationToken>,
    /// Stats of the last load served from cache, cleared when the inner
    /// loader takes over.
    served: Option<LoaderStats>,
}

/// Wraps a real [`Loader`] and offers every cacheable request to the
/// [`SegmentCache`] first.
///
/// Non-cacheable URLs, byte-range requests and requests made while the cache
/// is unavailable go straight to the inner loader.
pub struct CachedLoader {
    inner: Arc<dyn Loader>,
    cache: Arc<SegmentCache>,
    matcher: Arc<SegmentMatcher>,
    slot: Arc<Mutex<Slot>>,
}

impl CachedLoader {
    pub fn new(inner: Arc<dyn Loader>, cache: Arc<SegmentCache>, matcher: Arc<SegmentMatcher>) -> Self {
        Self {
            inner,
            cache,
            matcher,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    fn bypasses(&self, context: &LoaderContext) -> bool {
        context.byte_range.is_some()
            || !self.cache.is_available()
            || !self.matcher.is_cacheable(&context.url)
    }
}

impl Loader for CachedLoader {
    fn load(&self, context: LoaderContext, config: LoaderConfig, callbacks: Box<dyn LoaderCallbacks>) {
        if self.bypasses(&context) {
            tracing::trace!("Bypassing cache for {}", context.url);
            let mut slot = self.slot.lock();
            slot.generation += 1;
            if let Some(previous) = slot.cancel.take() {
                previous.cancel();
            }
            slot.served = None;
            self.inner.load(context, config, callbacks);
            return;
        }

        let token = CancellationToken::new();
        let generation = {
            let mut slot = self.slot.lock();
            if let Some(previous) = slot.cancel.replace(token.clone()) {
                previous.cancel();
            }
            slot.generation += 1;
            slot.served = None;
            slot.generation
        };

        let inner = Arc::clone(&self.inner);
        let cache = Arc::clone(&self.cache);
        let slot = Arc::clone(&self.slot);
        let trequest = Instant::now();
        let url = context.url.clone();

        tokio::spawn(async move {
            let found = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                found = cache.fetch(&url) => found,
            };

            // Holding the slot while handing off means an `abort` either
            // lands before the inner load starts or reaches it afterwards.
            let mut guard = slot.lock();
            if token.is_cancelled() || guard.generation != generation {
                drop(guard);
                let mut stats = LoaderStats::started_at(trequest);
                stats.aborted = true;
                tracing::trace!("Load aborted during cache lookup for {}", url);
                callbacks.on_abort(stats, context);
                return;
            }
            guard.cancel = None;

            match found {
                Some(data) => {
                    let stats = cached_stats(trequest, data.len() as u64);
                    guard.served = Some(stats.clone());
                    drop(guard);
                    let response = LoaderResponse { url, data };
                    callbacks.on_success(response, stats, context);
                }
                None => {
                    let write_through = Box::new(WriteThrough {
                        cache,
                        callbacks,
                    });
                    inner.load(context, config, write_through);
                    drop(guard);
                }
            }
        });
    }

    fn abort(&self) {
        let mut slot = self.slot.lock();
        if let Some(token) = slot.cancel.take() {
            token.cancel();
        }
        self.inner.abort();
    }

    fn destroy(&self) {
        self.abort();
        self.inner.destroy();
    }

    fn stats(&self) -> LoaderStats {
        if let Some(stats) = self.slot.lock().served.clone() {
            return stats;
        }
        self.inner.stats()
    }
}

/// Stats for a hit: same shape as a network load, flagged as cached, with a
/// nonzero duration.
fn cached_stats(trequest: Instant, size: u64) -> LoaderStats {
    let done = Instant::now().max(trequest + MIN_CACHED_DURATION);
    LoaderStats {
        cached: true,
        loaded: size,
        total: size,
        tfirst: Some(done),
        tload: Some(done),
        ..LoaderStats::started_at(trequest)
    }
}

/// Forwards every outcome, admitting successful payloads on the way.
struct WriteThrough {
    cache: Arc<SegmentCache>,
    callbacks: Box<dyn LoaderCallbacks>,
}

impl LoaderCallbacks for WriteThrough {
    fn on_success(
        self: Box<Self>,
        response: LoaderResponse,
        stats: LoaderStats,
        context: LoaderContext,
    ) {
        if !response.data.is_empty() {
            self.cache
                .admit_in_background(context.url.clone(), response.data.clone());
        }
        self.callbacks.on_success(response, stats, context);
    }

    fn on_error(self: Box<Self>, error: LoaderError, context: LoaderContext, stats: LoaderStats) {
        self.callbacks.on_error(error, context, stats);
    }

    fn on_timeout(self: Box<Self>, stats: LoaderStats, context: LoaderContext) {
        self.callbacks.on_timeout(stats, context);
    }

    fn on_abort(self: Box<Self>, stats: LoaderStats, context: LoaderContext) {
        self.callbacks.on_abort(stats, context);
    }
}

/// Drop-in replacement for the host's loader factory.
pub struct CachedLoaderFactory {
    inner: Arc<dyn LoaderFactory>,
    cache: Arc<SegmentCache>,
    matcher: Arc<SegmentMatcher>,
}

impl CachedLoaderFactory {
    pub fn new(
        inner: Arc<dyn LoaderFactory>,
        cache: Arc<SegmentCache>,
        matcher: SegmentMatcher,
    ) -> Self {
        Self {
            inner,
            cache,
            matcher: Arc::new(matcher),
        }
    }
}

impl LoaderFactory for CachedLoaderFactory {
    fn create(&self) -> Arc<dyn Loader> {
        Arc::new(CachedLoader::new(
            self.inner.create(),
            Arc::clone(&self.cache),
            Arc::clone(&self.matcher),
        ))
    }
}
