mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./segcache.toml",
        "./config.toml",
        "~/.config/segcache/config.toml",
        "/etc/segcache/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let cache = &config.cache;

    if cache.capacity_bytes == 0 {
        anyhow::bail!("cache.capacity_bytes must be greater than 0");
    }

    if cache.per_item_ceiling_bytes == 0 {
        anyhow::bail!("cache.per_item_ceiling_bytes must be greater than 0");
    }

    if cache.per_item_ceiling_bytes > cache.capacity_bytes {
        anyhow::bail!(
            "cache.per_item_ceiling_bytes ({}) exceeds cache.capacity_bytes ({})",
            cache.per_item_ceiling_bytes,
            cache.capacity_bytes
        );
    }

    let (low, high) = (
        cache.low_water_mark_fraction,
        cache.high_water_mark_fraction,
    );
    if !(low > 0.0 && low < high && high <= 1.0) {
        anyhow::bail!(
            "Water marks must satisfy 0 < low < high <= 1 (low = {}, high = {})",
            low,
            high
        );
    }

    if cache.segment_patterns.iter().all(|p| p.is_empty()) {
        anyhow::bail!("cache.segment_patterns must contain at least one pattern");
    }

    if cache.enabled && cache.db_path.is_none() {
        tracing::warn!("Cache is enabled but no db_path is set; caching will be unavailable");
    }

    if cache.read_timeout_ms == 0 {
        anyhow::bail!("cache.read_timeout_ms must be greater than 0");
    }

    if config.loader.timeout_ms == 0 {
        anyhow::bail!("loader.timeout_ms must be greater than 0");
    }

    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    Ok(())
}
