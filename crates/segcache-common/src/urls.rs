//! URL utilities for deciding which requests carry cacheable media segments.
//!
//! Playlists, keys and other small control files must always go to the
//! network; only URLs following a media-segment naming convention are offered
//! to the cache.

/// Patterns matched by default: MPEG-TS segments and anything with
/// "segment" in the URL.
pub const DEFAULT_SEGMENT_PATTERNS: &[&str] = &[".ts", "segment"];

/// Substring-based cacheable-URL predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMatcher {
    patterns: Vec<String>,
}

impl SegmentMatcher {
    /// Build a matcher from a list of substrings. Empty patterns are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use segcache_common::urls::SegmentMatcher;
    ///
    /// let matcher = SegmentMatcher::new([".m4s"]);
    /// assert!(matcher.is_cacheable("https://cdn/video/chunk_3.m4s"));
    /// assert!(!matcher.is_cacheable("https://cdn/video/seq_3.ts"));
    /// ```
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Check whether a URL should be served through the cache.
    pub fn is_cacheable(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| url.contains(p.as_str()))
    }

    /// Get the configured patterns.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for SegmentMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_PATTERNS.iter().copied())
    }
}
