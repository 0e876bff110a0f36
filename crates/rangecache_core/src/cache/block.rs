//! Fixed-size LRU block cache.

use super::lru::{CacheInfo, UpdatableLru};
use super::{block_range, check_range, nblocks, CacheParams, CacheStats, ReadCache};
use crate::error::CoreResult;
use rangecache_backend::RangeFetcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// LRU block cache.
///
/// Requests are only ever made one block at a time and kept in an LRU map
/// of at most `max_blocks` entries, so memory use is bounded by
/// `block_size * max_blocks`. A fetched block is reused until evicted.
///
/// All methods take `&self`; the internal map is lock-protected, so one
/// instance can back several file handles across threads without external
/// serialization.
pub struct BlockCache {
    fetcher: Arc<dyn RangeFetcher>,
    block_size: u64,
    size: u64,
    nblocks: u64,
    blocks: UpdatableLru<u64, Arc<Vec<u8>>>,
    requested_bytes: AtomicU64,
}

impl BlockCache {
    /// Creates a block cache holding at most `max_blocks` blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is unknown.
    pub fn new(params: CacheParams) -> CoreResult<Self> {
        let size = params.known_size("blockcache")?;
        Ok(Self {
            fetcher: params.fetcher,
            block_size: params.block_size,
            size,
            nblocks: nblocks(size, params.block_size),
            blocks: UpdatableLru::new(params.options.max_blocks),
            requested_bytes: AtomicU64::new(0),
        })
    }

    /// Statistics of the underlying LRU map.
    #[must_use]
    pub fn cache_info(&self) -> CacheInfo {
        self.blocks.cache_info()
    }

    /// Reads `[start, end)` through the block cache.
    ///
    /// A read spanning multiple blocks fetches and assembles each block
    /// independently, then slices the concatenation to the requested
    /// sub-range.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or a fetch fails.
    pub fn read_shared(&self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        check_range(start, end, self.size)?;
        if start == end {
            return Ok(Vec::new());
        }

        let first = start / self.block_size;
        let last = (end - 1) / self.block_size;
        let mut assembled = Vec::with_capacity(((last - first + 1) * self.block_size) as usize);
        for k in first..=last {
            assembled.extend_from_slice(&self.fetch_block_cached(k)?);
        }

        let off = (start - first * self.block_size) as usize;
        Ok(assembled[off..off + (end - start) as usize].to_vec())
    }

    fn fetch_block_cached(&self, k: u64) -> CoreResult<Arc<Vec<u8>>> {
        if let Some(block) = self.blocks.get(&k) {
            return Ok(block);
        }
        let block = self.fetch_block(k)?;
        if let Some(evicted) = self.blocks.insert(k, Arc::clone(&block)) {
            debug!(block = evicted, "evicted block");
        }
        Ok(block)
    }

    fn fetch_block(&self, k: u64) -> CoreResult<Arc<Vec<u8>>> {
        debug_assert!(k < self.nblocks, "block {k} out of range");
        let (start, end) = block_range(k, self.block_size, self.size);
        debug!(block = k, start, end, "fetching block");
        self.requested_bytes.fetch_add(end - start, Ordering::Relaxed);
        Ok(Arc::new(self.fetcher.fetch(start, end)?))
    }
}

impl ReadCache for BlockCache {
    fn read(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        self.read_shared(start, end)
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn stats(&self) -> CacheStats {
        let info = self.blocks.cache_info();
        CacheStats {
            hit_count: info.hits,
            miss_count: info.misses,
            total_requested_bytes: self.requested_bytes.load(Ordering::Relaxed),
        }
    }

    fn reset_stats(&mut self) {
        // LRU counters are cumulative for the life of the map; only the
        // byte counter is resettable here.
        self.requested_bytes.store(0, Ordering::Relaxed);
    }

    fn name(&self) -> &'static str {
        "blockcache"
    }
}

impl ReadCache for Arc<BlockCache> {
    fn read(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        self.read_shared(start, end)
    }

    fn block_size(&self) -> u64 {
        BlockCache::block_size(self)
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn stats(&self) -> CacheStats {
        ReadCache::stats(&**self)
    }

    fn reset_stats(&mut self) {
        self.requested_bytes.store(0, Ordering::Relaxed);
    }

    fn name(&self) -> &'static str {
        "blockcache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangecache_backend::MemoryFetcher;

    fn setup(data: &[u8], block_size: u64, max_blocks: usize) -> (Arc<MemoryFetcher>, BlockCache) {
        let fetcher = Arc::new(MemoryFetcher::new(data.to_vec()));
        let mut params = CacheParams::new(
            block_size,
            Arc::clone(&fetcher) as Arc<dyn RangeFetcher>,
            Some(data.len() as u64),
        );
        params.options.max_blocks = max_blocks;
        (fetcher, BlockCache::new(params).unwrap())
    }

    #[test]
    fn read_spanning_blocks_uses_two_fetches() {
        let (fetcher, cache) = setup(b"0123456789", 4, 32);

        assert_eq!(cache.read_shared(1, 7).unwrap(), b"123456");
        assert_eq!(fetcher.fetch_log(), vec![(0, 4), (4, 8)]);

        // Second read inside cached blocks: no new fetches
        assert_eq!(cache.read_shared(0, 4).unwrap(), b"0123");
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[test]
    fn tail_block_is_clamped_to_file_size() {
        let (fetcher, cache) = setup(b"0123456789", 4, 32);
        assert_eq!(cache.read_shared(8, 10).unwrap(), b"89");
        assert_eq!(fetcher.fetch_log(), vec![(8, 10)]);
    }

    #[test]
    fn resident_blocks_never_exceed_max() {
        let data: Vec<u8> = (0..=255).collect();
        let (_, cache) = setup(&data, 8, 3);

        for start in (0..256).step_by(8) {
            cache.read_shared(start, start + 8).unwrap();
            assert!(cache.cache_info().currsize <= 3);
        }
    }

    #[test]
    fn least_recently_used_block_evicted_first() {
        let (fetcher, cache) = setup(b"0123456789abcdef", 4, 2);

        cache.read_shared(0, 4).unwrap(); // block 0
        cache.read_shared(4, 8).unwrap(); // block 1
        cache.read_shared(0, 4).unwrap(); // touch block 0
        cache.read_shared(8, 12).unwrap(); // evicts block 1

        let before = fetcher.fetch_count();
        cache.read_shared(0, 4).unwrap(); // still cached
        assert_eq!(fetcher.fetch_count(), before);
        cache.read_shared(4, 8).unwrap(); // was evicted, refetch
        assert_eq!(fetcher.fetch_count(), before + 1);
    }

    #[test]
    fn shared_across_threads() {
        let data: Vec<u8> = (0..=255).cycle().take(1024).collect();
        let (fetcher, cache) = setup(&data, 64, 32);
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let data = data.clone();
                std::thread::spawn(move || {
                    for start in (0..1024).step_by(32) {
                        let end = (start + 32).min(1024);
                        let got = cache.read_shared(start as u64, end as u64).unwrap();
                        assert_eq!(got, &data[start..end], "thread {t}");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // 16 distinct blocks; concurrent readers may duplicate a fetch
        // racing on the same block, but never more than once per thread.
        assert!(fetcher.fetch_count() >= 16);
        assert!(fetcher.fetch_count() <= 64);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let (_, mut cache) = setup(b"0123456789", 4, 32);
        cache.read(0, 4).unwrap();
        cache.read(0, 4).unwrap();

        let stats = ReadCache::stats(&cache);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.total_requested_bytes, 4);
    }
}
