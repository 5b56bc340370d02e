//! Segcache-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across segcache:
//!
//! - **Data model**: [`CacheEntry`] and the payload-free [`SegmentRecord`]
//! - **URL classification**: deciding which requests are cacheable segments
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use segcache_common::urls::SegmentMatcher;
//! use segcache_common::{Error, Result};
//!
//! let matcher = SegmentMatcher::default();
//! assert!(matcher.is_cacheable("https://cdn.example.com/live/seq_00042.ts"));
//! assert!(!matcher.is_cacheable("https://cdn.example.com/live/index.m3u8"));
//!
//! fn example() -> Result<()> {
//!     Err(Error::store_unavailable("no persistent storage"))
//! }
//! ```

pub mod error;
pub mod types;
pub mod urls;

pub use error::{Error, Result};
pub use types::*;
