use crate::cache::SegmentCache;
use crate::config::Config;
use crate::loader::{CachedLoaderFactory, HttpLoaderFactory, LoaderConfig, LoaderFactory};
use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use segcache_common::urls::SegmentMatcher;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;

pub mod routes_cache;
pub mod routes_segment;

/// Shared application context: one player session.
#[derive(Clone)]
pub struct AppContext {
    pub cache: Arc<SegmentCache>,
    /// The installed loader slot
    pub loaders: Arc<dyn LoaderFactory>,
    pub loader_config: LoaderConfig,
    /// Same predicate the loader slot uses, for reporting `x-cache`
    pub matcher: Arc<SegmentMatcher>,
}

impl AppContext {
    /// Install a caching loader over a plain HTTP loader.
    pub fn new(config: &Config, cache: Arc<SegmentCache>) -> Result<Self> {
        let http = HttpLoaderFactory::new(&config.loader).context("Failed to build HTTP client")?;
        Ok(Self::with_loaders(config, cache, Arc::new(http)))
    }

    /// Install a caching loader over an arbitrary inner loader factory.
    pub fn with_loaders(
        config: &Config,
        cache: Arc<SegmentCache>,
        inner: Arc<dyn LoaderFactory>,
    ) -> Self {
        let matcher = SegmentMatcher::new(config.cache.segment_patterns.iter());
        let loaders = CachedLoaderFactory::new(inner, Arc::clone(&cache), matcher.clone());
        Self {
            cache,
            loaders: Arc::new(loaders),
            loader_config: LoaderConfig::from(&config.loader),
            matcher: Arc::new(matcher),
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(routes_segment::segment_routes())
        .merge(routes_cache::cache_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Open the cache, serve until a shutdown signal, then flush pending writes.
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let cache = Arc::new(SegmentCache::initialize(&config.cache).await);
    let ctx = AppContext::new(&config, Arc::clone(&cache))?;
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Flushing pending cache writes");
    cache.flush().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
