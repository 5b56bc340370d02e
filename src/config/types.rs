use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use segcache_common::urls::DEFAULT_SEGMENT_PATTERNS;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub loader: LoaderSettings,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Disable to run every request straight against the network
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// SQLite database file (tilde is expanded)
    #[serde(default = "default_db_path")]
    pub db_path: Option<PathBuf>,

    /// Total byte budget for stored payloads
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,

    /// Payloads larger than this are never admitted
    #[serde(default = "default_per_item_ceiling_bytes")]
    pub per_item_ceiling_bytes: u64,

    /// Eviction starts when occupancy exceeds this fraction of capacity
    #[serde(default = "default_high_water_mark_fraction")]
    pub high_water_mark_fraction: f64,

    /// Eviction stops once occupancy is at or below this fraction of capacity
    #[serde(default = "default_low_water_mark_fraction")]
    pub low_water_mark_fraction: f64,

    /// Lookups slower than this are treated as misses
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// URL substrings that mark a request as a cacheable segment
    #[serde(default = "default_segment_patterns")]
    pub segment_patterns: Vec<String>,
}

fn default_enabled() -> bool {
    true
}
fn default_db_path() -> Option<PathBuf> {
    Some(PathBuf::from("~/.cache/segcache/segments.db"))
}
fn default_capacity_bytes() -> u64 {
    25 * 1024 * 1024
}
fn default_per_item_ceiling_bytes() -> u64 {
    2 * 1024 * 1024
}
fn default_high_water_mark_fraction() -> f64 {
    0.8
}
fn default_low_water_mark_fraction() -> f64 {
    0.5
}
fn default_read_timeout_ms() -> u64 {
    250
}
fn default_segment_patterns() -> Vec<String> {
    DEFAULT_SEGMENT_PATTERNS
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            db_path: default_db_path(),
            capacity_bytes: default_capacity_bytes(),
            per_item_ceiling_bytes: default_per_item_ceiling_bytes(),
            high_water_mark_fraction: default_high_water_mark_fraction(),
            low_water_mark_fraction: default_low_water_mark_fraction(),
            read_timeout_ms: default_read_timeout_ms(),
            segment_patterns: default_segment_patterns(),
        }
    }
}

impl CacheConfig {
    /// Eviction trigger in bytes.
    pub fn high_water_mark_bytes(&self) -> u64 {
        (self.capacity_bytes as f64 * self.high_water_mark_fraction).floor() as u64
    }

    /// Eviction target in bytes.
    pub fn low_water_mark_bytes(&self) -> u64 {
        (self.capacity_bytes as f64 * self.low_water_mark_fraction).floor() as u64
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Database path with `~` expanded.
    pub fn resolved_db_path(&self) -> Option<PathBuf> {
        self.db_path.as_ref().map(|p| {
            let expanded = shellexpand::tilde(&p.to_string_lossy()).into_owned();
            PathBuf::from(expanded)
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoaderSettings {
    /// Per-request time limit, covering all retries
    #[serde(default = "default_loader_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra attempts after a network-level failure
    #[serde(default)]
    pub max_retry: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_loader_timeout_ms() -> u64 {
    20_000
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_user_agent() -> String {
    format!("segcache/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_loader_timeout_ms(),
            max_retry: 0,
            retry_delay_ms: default_retry_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8089
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
