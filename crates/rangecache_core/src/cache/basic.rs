//! Pass-through, whole-file, and first-block strategies.

use super::{check_range, CacheParams, CacheStats, ReadCache};
use crate::error::CoreResult;
use rangecache_backend::RangeFetcher;
use std::sync::Arc;
use tracing::debug;

/// Pass-through strategy: keeps nothing, fetches every time.
///
/// Every read issues exactly one fetch for the exact requested range.
/// This is the only strategy that is always legal for sources of unknown
/// size.
pub struct PassThroughCache {
    fetcher: Arc<dyn RangeFetcher>,
    block_size: u64,
    size: Option<u64>,
    stats: CacheStats,
}

impl PassThroughCache {
    /// Creates a pass-through strategy.
    pub fn new(params: CacheParams) -> Self {
        Self {
            fetcher: params.fetcher,
            block_size: params.block_size,
            size: params.size,
            stats: CacheStats::default(),
        }
    }
}

impl ReadCache for PassThroughCache {
    fn read(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        if let Some(size) = self.size {
            check_range(start, end, size)?;
        }
        if start == end {
            self.stats.hit();
            return Ok(Vec::new());
        }
        self.stats.miss(end - start);
        Ok(self.fetcher.fetch(start, end)?)
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Whole-file strategy: fetches the entire object once at construction.
///
/// After construction the fetcher is never called again.
pub struct AllBytesCache {
    data: Vec<u8>,
    block_size: u64,
    stats: CacheStats,
}

impl AllBytesCache {
    /// Creates the strategy, fetching the whole object eagerly.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is unknown or the fetch fails.
    pub fn new(params: CacheParams) -> CoreResult<Self> {
        let size = params.known_size("all")?;
        let mut stats = CacheStats::default();
        stats.miss(size);
        debug!(size, "fetching entire file");
        let data = params.fetcher.fetch(0, size)?;
        Ok(Self {
            data,
            block_size: params.block_size,
            stats,
        })
    }

    /// Creates the strategy around bytes already in hand, with no fetch.
    pub fn from_data(data: Vec<u8>, block_size: u64) -> Self {
        Self {
            data,
            block_size,
            stats: CacheStats::default(),
        }
    }
}

impl ReadCache for AllBytesCache {
    fn read(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        check_range(start, end, self.data.len() as u64)?;
        self.stats.hit();
        Ok(self.data[start as usize..end as usize].to_vec())
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    fn name(&self) -> &'static str {
        "all"
    }
}

/// First-block strategy: caches only `[0, block_size)`.
///
/// Useful for formats that keep randomly-accessed metadata in a header.
/// The block size is clamped to the file size. Reads past the first block
/// fall through to the fetcher uncached.
pub struct FirstBlockCache {
    fetcher: Arc<dyn RangeFetcher>,
    block_size: u64,
    size: u64,
    data: Option<Vec<u8>>,
    stats: CacheStats,
}

impl FirstBlockCache {
    /// Creates a first-block strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is unknown.
    pub fn new(params: CacheParams) -> CoreResult<Self> {
        let size = params.known_size("first")?;
        Ok(Self {
            fetcher: params.fetcher,
            block_size: params.block_size.min(size),
            size,
            data: None,
            stats: CacheStats::default(),
        })
    }

    fn first_block(&mut self) -> CoreResult<&[u8]> {
        if self.data.is_none() {
            self.stats.miss(self.block_size);
            self.data = Some(self.fetcher.fetch(0, self.block_size)?);
        } else {
            self.stats.hit();
        }
        Ok(self.data.as_deref().unwrap_or_default())
    }
}

impl ReadCache for FirstBlockCache {
    fn read(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        check_range(start, end, self.size)?;
        if start >= self.block_size {
            // Entirely past the header: uncached direct fetch.
            if start == end {
                self.stats.hit();
                return Ok(Vec::new());
            }
            self.stats.miss(end - start);
            return Ok(self.fetcher.fetch(start, end)?);
        }

        let head_end = end.min(self.block_size);
        let block = self.first_block()?;
        let mut out = block[start as usize..head_end as usize].to_vec();
        if end > self.block_size {
            self.stats.miss(end - self.block_size);
            out.extend(self.fetcher.fetch(self.block_size, end)?);
        }
        Ok(out)
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    fn name(&self) -> &'static str {
        "first"
    }
}
