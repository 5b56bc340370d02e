//! Database query modules.
//!
//! - segments: Segment blob upsert, lookup, deletion, and oldest-first paging

pub mod segments;
