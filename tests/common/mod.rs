//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which opens a segment cache on a temporary SQLite
//! file, starts a wiremock upstream, and builds the full [`AppContext`]. The
//! [`TestHarness::with_server`] constructor starts Axum on a random port for
//! HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use segcache::cache::SegmentCache;
use segcache::config::{CacheConfig, Config};
use segcache::server::{create_router, AppContext};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// on-disk database in a temporary directory.
pub struct TestHarness {
    pub ctx: AppContext,
    pub cache: Arc<SegmentCache>,
    pub config: Config,
    pub upstream: MockServer,
    pub dir: TempDir,
}

impl TestHarness {
    /// Create a new harness with default limits.
    pub async fn new() -> Self {
        Self::with_cache_config(CacheConfig::default()).await
    }

    /// Create a new harness with custom cache settings. `db_path` is
    /// replaced by a file in a fresh temporary directory.
    pub async fn with_cache_config(cache: CacheConfig) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = Config::default();
        config.cache = CacheConfig {
            db_path: Some(dir.path().join("segments.db")),
            ..cache
        };
        config.loader.timeout_ms = 2_000;

        let cache = Arc::new(SegmentCache::initialize(&config.cache).await);
        let ctx = AppContext::new(&config, Arc::clone(&cache)).expect("failed to build context");
        let upstream = MockServer::start().await;

        Self {
            ctx,
            cache,
            config,
            upstream,
            dir,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new().await;
        let addr = harness.serve().await;
        (harness, addr)
    }

    /// Start an Axum server with custom cache settings on a random port.
    pub async fn with_server_config(cache: CacheConfig) -> (Self, SocketAddr) {
        let harness = Self::with_cache_config(cache).await;
        let addr = harness.serve().await;
        (harness, addr)
    }

    async fn serve(&self) -> SocketAddr {
        let app = create_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        addr
    }

    /// Serve `body` from the upstream at `route`.
    pub async fn mount_segment(&self, route: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.upstream)
            .await;
    }

    /// Absolute upstream URL for `route`.
    pub fn upstream_url(&self, route: &str) -> String {
        format!("{}{}", self.upstream.uri(), route)
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("segments.db")
    }
}

/// Proxy URL asking the server at `addr` for `upstream_url`.
pub fn segment_url(addr: SocketAddr, upstream_url: &str) -> String {
    let mut url = reqwest::Url::parse(&format!("http://{}/segment", addr)).expect("valid url");
    url.query_pairs_mut().append_pair("url", upstream_url);
    url.to_string()
}
