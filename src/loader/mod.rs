//! Segment loaders.
//!
//! A [`Loader`] performs one request at a time and reports its result through
//! exactly one terminal callback on a [`LoaderCallbacks`] value. Hosts get
//! loaders from a [`LoaderFactory`]; installing the cache means swapping an
//! [`HttpLoaderFactory`] for a [`CachedLoaderFactory`] wrapping it.
//!
//! `load` spawns onto the current tokio runtime and returns immediately.

mod cached;
mod callbacks;
mod http;

pub use cached::{CachedLoader, CachedLoaderFactory};
pub use callbacks::{load_to_completion, oneshot_callbacks, LoadOutcome};
pub use http::{HttpLoader, HttpLoaderFactory};

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::LoaderSettings;

/// What to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderContext {
    pub url: String,
    /// Half-open byte range `[start, end)` for partial requests.
    pub byte_range: Option<(u64, u64)>,
}

impl LoaderContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            byte_range: None,
        }
    }

    pub fn with_byte_range(mut self, start: u64, end: u64) -> Self {
        self.byte_range = Some((start, end));
        self
    }
}

/// Per-request loading policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Bound on the whole request, retries included.
    pub timeout: Duration,
    pub max_retry: u32,
    pub retry_delay: Duration,
}

impl From<&LoaderSettings> for LoaderConfig {
    fn from(settings: &LoaderSettings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.timeout_ms),
            max_retry: settings.max_retry,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::from(&LoaderSettings::default())
    }
}

/// A completed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderResponse {
    pub url: String,
    pub data: Bytes,
}

/// Transfer statistics consumed by bandwidth estimation.
#[derive(Debug, Clone)]
pub struct LoaderStats {
    pub aborted: bool,
    /// Served from the segment cache rather than the network.
    pub cached: bool,
    pub loaded: u64,
    pub total: u64,
    pub retry: u32,
    pub trequest: Instant,
    pub tfirst: Option<Instant>,
    pub tload: Option<Instant>,
}

impl LoaderStats {
    /// Fresh stats for a request issued now.
    pub fn start() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(trequest: Instant) -> Self {
        Self {
            aborted: false,
            cached: false,
            loaded: 0,
            total: 0,
            retry: 0,
            trequest,
            tfirst: None,
            tload: None,
        }
    }

    /// Request-to-completion time, once the load has finished.
    pub fn duration(&self) -> Option<Duration> {
        self.tload.map(|t| t.saturating_duration_since(self.trequest))
    }

    /// Observed throughput in bits per second.
    pub fn bandwidth_bps(&self) -> Option<f64> {
        let secs = self.duration()?.as_secs_f64();
        (secs > 0.0).then(|| self.loaded as f64 * 8.0 / secs)
    }
}

impl Default for LoaderStats {
    fn default() -> Self {
        Self::start()
    }
}

/// A failed load. `code` is the HTTP status, or 0 for transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{text} (code {code})")]
pub struct LoaderError {
    pub code: u16,
    pub text: String,
}

impl LoaderError {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    pub fn is_http(&self) -> bool {
        self.code != 0
    }
}

/// Receives the result of one load. Exactly one method is called.
pub trait LoaderCallbacks: Send + 'static {
    fn on_success(
        self: Box<Self>,
        response: LoaderResponse,
        stats: LoaderStats,
        context: LoaderContext,
    );

    fn on_error(self: Box<Self>, error: LoaderError, context: LoaderContext, stats: LoaderStats);

    fn on_timeout(self: Box<Self>, stats: LoaderStats, context: LoaderContext);

    fn on_abort(self: Box<Self>, stats: LoaderStats, context: LoaderContext);
}

/// The loader capability a streaming client drives.
pub trait Loader: Send + Sync {
    /// Start loading. Must be called from within a tokio runtime.
    ///
    /// Starting a new load cancels the one in flight.
    fn load(&self, context: LoaderContext, config: LoaderConfig, callbacks: Box<dyn LoaderCallbacks>);

    /// Cancel the in-flight load, which then reports `on_abort`.
    fn abort(&self);

    /// Abort and release resources. The loader is not reused afterwards.
    fn destroy(&self);

    /// Stats of the current or most recent load.
    fn stats(&self) -> LoaderStats;
}

/// The loader slot: produces one loader per request.
pub trait LoaderFactory: Send + Sync {
    fn create(&self) -> Arc<dyn Loader>;
}
