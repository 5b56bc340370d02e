//! Segcache - persistent cache for streaming media segments
//!
//! This library crate exposes the cache, the loader interceptor and the
//! proxy server for integration testing.

pub mod cache;
pub mod config;
pub mod loader;
pub mod server;
