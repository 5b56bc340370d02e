//! Network loader backed by reqwest.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::RANGE;
use tokio_util::sync::CancellationToken;

use super::{
    Loader, LoaderCallbacks, LoaderConfig, LoaderContext, LoaderError, LoaderFactory,
    LoaderResponse, LoaderStats,
};
use crate::config::LoaderSettings;

#[derive(Default)]
struct LoadState {
    /// Bumped on every `load`; lets a finishing task tell whether it still
    /// owns the slot.
    generation: u64,
    cancel: Option<CancellationToken>,
    stats: LoaderStats,
}

enum Attempt {
    Success(Bytes),
    Failed(LoaderError),
    TimedOut,
    Aborted,
}

/// Loads one URL at a time over HTTP.
pub struct HttpLoader {
    client: reqwest::Client,
    state: Arc<Mutex<LoadState>>,
}

impl HttpLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(LoadState::default())),
        }
    }
}

impl Loader for HttpLoader {
    fn load(&self, context: LoaderContext, config: LoaderConfig, callbacks: Box<dyn LoaderCallbacks>) {
        let token = CancellationToken::new();
        let mut stats = LoaderStats::start();
        let generation = {
            let mut state = self.state.lock();
            if let Some(previous) = state.cancel.replace(token.clone()) {
                previous.cancel();
            }
            state.generation += 1;
            state.stats = stats.clone();
            state.generation
        };

        let client = self.client.clone();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let attempt = tokio::select! {
                biased;
                _ = token.cancelled() => Attempt::Aborted,
                result = tokio::time::timeout(
                    config.timeout,
                    fetch_with_retry(&client, &context, &config, &mut stats),
                ) => result.unwrap_or(Attempt::TimedOut),
            };

            if matches!(attempt, Attempt::Aborted) {
                stats.aborted = true;
            }
            {
                let mut state = state.lock();
                if state.generation == generation {
                    state.cancel = None;
                    state.stats = stats.clone();
                }
            }

            match attempt {
                Attempt::Success(data) => {
                    tracing::trace!("Loaded {} ({} bytes)", context.url, data.len());
                    let response = LoaderResponse {
                        url: context.url.clone(),
                        data,
                    };
                    callbacks.on_success(response, stats, context);
                }
                Attempt::Failed(error) => {
                    tracing::debug!("Load failed for {}: {}", context.url, error);
                    callbacks.on_error(error, context, stats);
                }
                Attempt::TimedOut => {
                    tracing::debug!("Load timed out for {} after {:?}", context.url, config.timeout);
                    callbacks.on_timeout(stats, context);
                }
                Attempt::Aborted => {
                    tracing::trace!("Load aborted for {}", context.url);
                    callbacks.on_abort(stats, context);
                }
            }
        });
    }

    fn abort(&self) {
        let mut state = self.state.lock();
        if let Some(token) = state.cancel.take() {
            token.cancel();
            state.stats.aborted = true;
        }
    }

    fn destroy(&self) {
        self.abort();
    }

    fn stats(&self) -> LoaderStats {
        self.state.lock().stats.clone()
    }
}

async fn fetch_with_retry(
    client: &reqwest::Client,
    context: &LoaderContext,
    config: &LoaderConfig,
    stats: &mut LoaderStats,
) -> Attempt {
    loop {
        match fetch_once(client, context, stats).await {
            Err(error) if !error.is_http() && stats.retry < config.max_retry => {
                stats.retry += 1;
                tracing::debug!(
                    "Retrying {} ({}/{}) after error: {}",
                    context.url,
                    stats.retry,
                    config.max_retry,
                    error
                );
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(error) => return Attempt::Failed(error),
            Ok(data) => return Attempt::Success(data),
        }
    }
}

async fn fetch_once(
    client: &reqwest::Client,
    context: &LoaderContext,
    stats: &mut LoaderStats,
) -> Result<Bytes, LoaderError> {
    let mut request = client.get(&context.url);
    if let Some((start, end)) = context.byte_range {
        request = request.header(RANGE, format!("bytes={}-{}", start, end.saturating_sub(1)));
    }

    let transport = |e: reqwest::Error| LoaderError::new(0, e.to_string());

    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    if !status.is_success() {
        return Err(LoaderError::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or("HTTP error"),
        ));
    }

    stats.tfirst = Some(Instant::now());
    stats.total = response.content_length().unwrap_or(0);

    let data = response.bytes().await.map_err(transport)?;

    stats.loaded = data.len() as u64;
    if stats.total == 0 {
        stats.total = stats.loaded;
    }
    stats.tload = Some(Instant::now());
    Ok(data)
}

/// Produces [`HttpLoader`]s sharing one connection pool.
#[derive(Clone)]
pub struct HttpLoaderFactory {
    client: reqwest::Client,
}

impl HttpLoaderFactory {
    pub fn new(settings: &LoaderSettings) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl LoaderFactory for HttpLoaderFactory {
    fn create(&self) -> Arc<dyn Loader> {
        Arc::new(HttpLoader::new(self.client.clone()))
    }
}
