mod cli;

use segcache::{
    cache::SegmentCache,
    config,
    loader::{load_to_completion, LoadOutcome, LoaderContext},
    server::{self, AppContext},
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "segcache=trace,segcache_db=debug,segcache_common=debug,tower_http=debug".to_string()
        } else {
            "segcache=debug,segcache_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = config::load_config_or_default(config_path)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config::validate_config(&config)?;

            tracing::info!("Starting segcache");
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(server::start_server(config))
        }
        Commands::Fetch { url, output } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(fetch(&url, output.as_deref(), config_path))
        }
        Commands::Stats => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(show_stats(config_path))
        }
        Commands::Clear => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(clear(config_path))
        }
        Commands::Validate { config } => validate_config(config.as_deref().or(config_path)),
        Commands::Version => {
            println!("segcache {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn open_cache(config_path: Option<&Path>) -> Result<(config::Config, Arc<SegmentCache>)> {
    let config = config::load_config_or_default(config_path)?;
    let cache = Arc::new(SegmentCache::initialize(&config.cache).await);
    Ok((config, cache))
}

async fn fetch(url: &str, output: Option<&Path>, config_path: Option<&Path>) -> Result<()> {
    let (config, cache) = open_cache(config_path).await?;
    let ctx = AppContext::new(&config, Arc::clone(&cache))?;

    let loader = ctx.loaders.create();
    let outcome = load_to_completion(&loader, LoaderContext::new(url), ctx.loader_config).await;
    loader.destroy();

    let result = match outcome {
        LoadOutcome::Success { response, stats } => {
            let source = if stats.cached { "hit" } else { "miss" };
            println!("{} ({} bytes, {})", url, response.data.len(), source);
            if let Some(bps) = stats.bandwidth_bps() {
                println!("  {:.1} kbit/s", bps / 1000.0);
            }
            if let Some(path) = output {
                std::fs::write(path, &response.data)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("  Written to {:?}", path);
            }
            Ok(())
        }
        LoadOutcome::Error { error, .. } => Err(anyhow::anyhow!("Load failed: {}", error)),
        LoadOutcome::Timeout { .. } => Err(anyhow::anyhow!(
            "Load timed out after {:?}",
            ctx.loader_config.timeout
        )),
        LoadOutcome::Aborted { .. } => Err(anyhow::anyhow!("Load aborted")),
    };

    // Let the write-through land before exiting.
    cache.flush().await;
    result
}

async fn show_stats(config_path: Option<&Path>) -> Result<()> {
    let (_, cache) = open_cache(config_path).await?;
    let stats = cache.stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn clear(config_path: Option<&Path>) -> Result<()> {
    let (_, cache) = open_cache(config_path).await?;
    let removed = cache.reset().await.context("Failed to clear cache")?;
    println!("Removed {} cached segments", removed);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Cache enabled: {}", config.cache.enabled);
    if let Some(path) = config.cache.resolved_db_path() {
        println!("  Database: {}", path.display());
    }
    println!(
        "  Capacity: {} bytes (evict above {}, down to {})",
        config.cache.capacity_bytes,
        config.cache.high_water_mark_bytes(),
        config.cache.low_water_mark_bytes()
    );
    println!(
        "  Per-item ceiling: {} bytes",
        config.cache.per_item_ceiling_bytes
    );
    println!("  Segment patterns: {:?}", config.cache.segment_patterns);
    println!(
        "  Loader: timeout {} ms, {} retries",
        config.loader.timeout_ms, config.loader.max_retry
    );

    Ok(())
}
