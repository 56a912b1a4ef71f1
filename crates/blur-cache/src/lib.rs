//! # blur-cache
//!
//! Bounded LRU cache of blurred images.
//!
//! Results are keyed by the identity of the source image plus the blur
//! intensity rounded to 0.1. The cache enforces two limits at once:
//!
//! | Limit | Checked on |
//! |-------|------------|
//! | `max_entries` | every insert |
//! | `max_memory` (bytes, >= 1 MiB) | every insert, using `w * h * c + 1024` per entry |
//!
//! See [`ResultCache`] for the full API.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cache;

pub use cache::{
    entry_size, make_key, round_intensity, CacheStats, PutOutcome, ResultCache,
    ENTRY_OVERHEAD_BYTES, MIN_MEMORY_BYTES,
};
