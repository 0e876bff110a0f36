//! Sparse file-backed block cache.

use super::{check_range, nblocks, CacheParams, CacheStats, ReadCache};
use crate::error::CoreResult;
use rangecache_backend::RangeFetcher;
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::debug;

/// Sparse block cache backed by a temporary file.
///
/// The backing file is created at the full object size and filled
/// block-wise as data is requested, so only the blocks actually touched
/// consume transfer; make sure the temporary location has enough disk
/// space for what you read. A block is fetched at most once, and loading
/// block `k` writes exactly its byte range.
///
/// Registered as `"mmap"`, the name the strategy has always carried; the
/// store uses positioned file I/O rather than a memory map.
pub struct SparseBlockCache {
    fetcher: Arc<dyn RangeFetcher>,
    block_size: u64,
    size: u64,
    nblocks: u64,
    file: File,
    loaded: HashSet<u64>,
    stats: CacheStats,
}

impl SparseBlockCache {
    /// Creates a sparse cache, placing the backing file in
    /// `options.location` (or the system temp directory).
    ///
    /// # Errors
    ///
    /// Returns an error if the size is unknown or the backing file cannot
    /// be created.
    pub fn new(params: CacheParams) -> CoreResult<Self> {
        let size = params.known_size("mmap")?;
        let file = match &params.options.location {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        file.set_len(size)?;
        Ok(Self {
            fetcher: params.fetcher,
            block_size: params.block_size,
            size,
            nblocks: nblocks(size, params.block_size),
            file,
            loaded: HashSet::new(),
            stats: CacheStats::default(),
        })
    }

    /// Block indices currently materialized.
    #[must_use]
    pub fn loaded_blocks(&self) -> &HashSet<u64> {
        &self.loaded
    }

    fn load_missing(&mut self, first: u64, last: u64) -> CoreResult<()> {
        let missing: Vec<u64> = (first..=last)
            .filter(|k| !self.loaded.contains(k))
            .collect();
        if missing.is_empty() {
            self.stats.hit();
            return Ok(());
        }

        // Fetch contiguous runs of missing blocks with one call each.
        let mut i = 0;
        while i < missing.len() {
            let run_start = missing[i];
            let mut run_end = run_start;
            while i + 1 < missing.len() && missing[i + 1] == run_end + 1 {
                i += 1;
                run_end = missing[i];
            }
            i += 1;

            let start = run_start * self.block_size;
            let end = ((run_end + 1) * self.block_size).min(self.size);
            debug!(run_start, run_end, start, end, "loading sparse blocks");
            self.stats.miss(end - start);
            let data = self.fetcher.fetch(start, end)?;
            self.file.seek(SeekFrom::Start(start))?;
            self.file.write_all(&data)?;
            self.loaded.extend(run_start..=run_end);
        }
        Ok(())
    }
}

impl ReadCache for SparseBlockCache {
    fn read(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        check_range(start, end, self.size)?;
        if start == end {
            self.stats.hit();
            return Ok(Vec::new());
        }
        debug_assert!(self.nblocks > 0);

        let first = start / self.block_size;
        let last = (end - 1) / self.block_size;
        self.load_missing(first, last)?;

        self.file.seek(SeekFrom::Start(start))?;
        let mut out = vec![0u8; (end - start) as usize];
        self.file.read_exact(&mut out)?;
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
        "mmap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangecache_backend::MemoryFetcher;

    fn setup(data: &[u8], block_size: u64) -> (Arc<MemoryFetcher>, SparseBlockCache) {
        let fetcher = Arc::new(MemoryFetcher::new(data.to_vec()));
        let params = CacheParams::new(
            block_size,
            Arc::clone(&fetcher) as Arc<dyn RangeFetcher>,
            Some(data.len() as u64),
        );
        (fetcher, SparseBlockCache::new(params).unwrap())
    }

    #[test]
    fn blocks_fetched_at_most_once() {
        let (fetcher, mut cache) = setup(b"0123456789", 4);

        assert_eq!(cache.read(0, 4).unwrap(), b"0123");
        assert_eq!(cache.read(0, 4).unwrap(), b"0123");
        assert_eq!(cache.read(2, 4).unwrap(), b"23");
        assert_eq!(fetcher.fetch_log(), vec![(0, 4)]);
    }

    #[test]
    fn contiguous_missing_blocks_fetched_in_one_run() {
        let (fetcher, mut cache) = setup(b"0123456789abcdef", 4);

        assert_eq!(cache.read(0, 16).unwrap(), b"0123456789abcdef");
        assert_eq!(fetcher.fetch_log(), vec![(0, 16)]);
    }

    #[test]
    fn holes_between_loaded_blocks_fetched_separately() {
        let (fetcher, mut cache) = setup(b"0123456789abcdef", 4);

        cache.read(0, 2).unwrap(); // block 0
        cache.read(12, 14).unwrap(); // block 3
        // Blocks 1 and 2 are a single missing run
        assert_eq!(cache.read(2, 14).unwrap(), b"23456789abcd");
        assert_eq!(fetcher.fetch_log(), vec![(0, 4), (12, 16), (4, 12)]);
        assert_eq!(cache.loaded_blocks().len(), 4);
    }

    #[test]
    fn tail_block_clamped_to_size() {
        let (fetcher, mut cache) = setup(b"0123456789", 4);
        assert_eq!(cache.read(8, 10).unwrap(), b"89");
        assert_eq!(fetcher.fetch_log(), vec![(8, 10)]);
    }

    #[test]
    fn fully_loaded_read_counts_as_hit() {
        let (_, mut cache) = setup(b"0123456789", 4);
        cache.read(0, 10).unwrap();
        let misses = cache.stats().miss_count;
        cache.read(3, 9).unwrap();

        assert_eq!(cache.stats().miss_count, misses);
        assert_eq!(cache.stats().hit_count, 1);
    }
}
