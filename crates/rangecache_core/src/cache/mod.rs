//! Byte-range caching strategies.
//!
//! A cache strategy mediates between a random-access read API and a
//! backend's "fetch a byte range" primitive. Each strategy decides which
//! fetches to issue for a requested `[start, end)` and how to retain bytes
//! for reuse.
//!
//! All strategies serve exactly `end - start` bytes for a valid request;
//! only the non-strict known-parts strategy may zero-pad, and only the
//! uncovered tail of a read that begins inside a known part.
//!
//! Strategies without internal locking take `&mut self` and expect one
//! instance per open file handle. [`BlockCache`] and
//! [`BackgroundBlockCache`] are internally lock-protected so one instance
//! can back several handles across threads.
//!
//! Submodules:
//! - `basic`: pass-through, whole-file, first-block
//! - `readahead`: read-ahead window and growing bytes buffer
//! - `sparse`: file-backed sparse block store
//! - `block` / `background`: LRU block caches, with optional prefetch
//! - `parts`: explicit known-byte-range table
//! - `registry`: name-keyed open strategy registry

mod background;
mod basic;
mod block;
mod lru;
mod parts;
mod readahead;
mod registry;
mod sparse;

pub use background::BackgroundBlockCache;
pub use basic::{AllBytesCache, FirstBlockCache, PassThroughCache};
pub use block::BlockCache;
pub use lru::{CacheInfo, UpdatableLru};
pub use parts::KnownPartsCache;
pub use readahead::{BytesCache, ReadAheadCache};
pub use registry::{create_cache, register_cache, registered_caches, CacheFactory};
pub use sparse::SparseBlockCache;

use crate::error::{CoreError, CoreResult};
use rangecache_backend::RangeFetcher;
use std::sync::Arc;

/// A pluggable read-side caching strategy.
pub trait ReadCache: Send {
    /// Returns the bytes in `[start, end)`, fetching from the backend as
    /// the strategy requires.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is invalid for this strategy or the
    /// backend fetch fails.
    fn read(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>>;

    /// The block size this strategy fetches and caches with.
    fn block_size(&self) -> u64;

    /// The total object size, if known.
    fn size(&self) -> Option<u64>;

    /// A snapshot of the hit/miss telemetry.
    fn stats(&self) -> CacheStats;

    /// Resets the telemetry counters, e.g. for a per-file report.
    fn reset_stats(&mut self);

    /// The registry name of this strategy.
    fn name(&self) -> &'static str;
}

/// Hit/miss telemetry kept by every strategy.
///
/// `miss_count` only increases on a call to the fetcher; `hit_count` only
/// increases when bytes are served without one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served without touching the fetcher.
    pub hit_count: u64,
    /// Fetcher calls issued.
    pub miss_count: u64,
    /// Total bytes requested from the fetcher.
    pub total_requested_bytes: u64,
}

impl CacheStats {
    /// Records a hit.
    pub fn hit(&mut self) {
        self.hit_count += 1;
    }

    /// Records a miss of `bytes` requested from the fetcher.
    pub fn miss(&mut self, bytes: u64) {
        self.miss_count += 1;
        self.total_requested_bytes += bytes;
    }
}

/// Constructor input shared by every strategy factory.
#[derive(Clone)]
pub struct CacheParams {
    /// Fetch unit and retention granularity.
    pub block_size: u64,
    /// The backend fetch primitive.
    pub fetcher: Arc<dyn RangeFetcher>,
    /// Total object size; `None` only for streamed sources, which only
    /// the pass-through and bytes strategies accept.
    pub size: Option<u64>,
    /// Strategy-specific options.
    pub options: CacheOptions,
}

impl CacheParams {
    /// Creates params with default options.
    pub fn new(block_size: u64, fetcher: Arc<dyn RangeFetcher>, size: Option<u64>) -> Self {
        Self {
            block_size,
            fetcher,
            size,
            options: CacheOptions::default(),
        }
    }

    /// Returns the size, or a configuration error for strategies that
    /// cannot work without one.
    pub(crate) fn known_size(&self, strategy: &str) -> CoreResult<u64> {
        self.size.ok_or_else(|| {
            CoreError::config(format!(
                "cache strategy {strategy:?} requires a known file size"
            ))
        })
    }
}

/// Options consumed by individual strategies; unknown fields are ignored.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Maximum resident blocks for the LRU strategies.
    pub max_blocks: usize,
    /// Whether the bytes strategy discards data far behind the read
    /// position.
    pub trim: bool,
    /// Whether the known-parts strategy fetches (true) or zero-pads
    /// (false) reads extending past a known part.
    pub strict: bool,
    /// Known `(start, end, bytes)` parts for the parts strategy.
    pub parts: Vec<(u64, u64, Vec<u8>)>,
    /// Directory for the sparse strategy's backing file; temp dir if
    /// unset.
    pub location: Option<std::path::PathBuf>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_blocks: 32,
            trim: true,
            strict: true,
            parts: Vec::new(),
            location: None,
        }
    }
}

/// Number of blocks covering `size` bytes.
#[must_use]
pub fn nblocks(size: u64, block_size: u64) -> u64 {
    size.div_ceil(block_size)
}

/// The byte range `[k * block_size, min((k + 1) * block_size, size))`
/// covered by block `k`.
#[must_use]
pub fn block_range(k: u64, block_size: u64, size: u64) -> (u64, u64) {
    let start = k * block_size;
    (start, (start + block_size).min(size))
}

/// Validates a `[start, end)` request against an object size.
pub(crate) fn check_range(start: u64, end: u64, size: u64) -> CoreResult<()> {
    if start > end {
        return Err(CoreError::config(format!(
            "read start {start} is past end {end}"
        )));
    }
    if end > size {
        return Err(CoreError::config(format!(
            "read [{start}, {end}) is past object size {size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nblocks_rounds_up() {
        assert_eq!(nblocks(10, 4), 3);
        assert_eq!(nblocks(8, 4), 2);
        assert_eq!(nblocks(0, 4), 0);
    }

    #[test]
    fn block_range_clamps_to_size() {
        assert_eq!(block_range(0, 4, 10), (0, 4));
        assert_eq!(block_range(2, 4, 10), (8, 10));
    }

    #[test]
    fn check_range_rejects_inverted_and_past_end() {
        assert!(check_range(0, 10, 10).is_ok());
        assert!(check_range(5, 3, 10).is_err());
        assert!(check_range(0, 11, 10).is_err());
    }
}
