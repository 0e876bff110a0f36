//! LRU block cache with background prefetch of the next block.

use super::lru::{CacheInfo, UpdatableLru};
use super::{block_range, check_range, nblocks, CacheParams, CacheStats, ReadCache};
use crate::error::CoreResult;
use parking_lot::Mutex;
use rangecache_backend::RangeFetcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, warn};

/// One in-flight background fetch.
///
/// A single-producer/single-consumer cell: the worker thread sends exactly
/// one result, and at most one reader takes the receiver to wait on it.
struct Pending {
    block: u64,
    rx: mpsc::Receiver<CoreResult<Arc<Vec<u8>>>>,
}

/// LRU block cache that pre-loads the next block in the background.
///
/// Behaves like [`super::BlockCache`], but after serving a read it
/// schedules a background fetch of the following block on a worker
/// thread. At most one prefetch is in flight; a read for the block
/// currently prefetching waits on its result instead of issuing a
/// duplicate fetch, and a pending fetch for any other block is left alone
/// to complete and populate the cache opportunistically.
///
/// All methods take `&self`; the map and the pending slot are
/// lock-protected, so one instance can back several file handles across
/// threads.
pub struct BackgroundBlockCache {
    fetcher: Arc<dyn RangeFetcher>,
    block_size: u64,
    size: u64,
    nblocks: u64,
    blocks: Arc<UpdatableLru<u64, Arc<Vec<u8>>>>,
    requested_bytes: Arc<AtomicU64>,
    pending: Mutex<Option<Pending>>,
}

impl BackgroundBlockCache {
    /// Creates a background-prefetch block cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is unknown.
    pub fn new(params: CacheParams) -> CoreResult<Self> {
        let size = params.known_size("background")?;
        Ok(Self {
            fetcher: params.fetcher,
            block_size: params.block_size,
            size,
            nblocks: nblocks(size, params.block_size),
            blocks: Arc::new(UpdatableLru::new(params.options.max_blocks)),
            requested_bytes: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        })
    }

    /// Statistics of the underlying LRU map.
    #[must_use]
    pub fn cache_info(&self) -> CacheInfo {
        self.blocks.cache_info()
    }

    /// Reads `[start, end)` through the cache, scheduling a prefetch of
    /// the block following the read.
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
        self.schedule_prefetch(last + 1);

        let off = (start - first * self.block_size) as usize;
        Ok(assembled[off..off + (end - start) as usize].to_vec())
    }

    fn fetch_block_cached(&self, k: u64) -> CoreResult<Arc<Vec<u8>>> {
        if let Some(block) = self.blocks.get(&k) {
            return Ok(block);
        }

        let waiter = {
            let mut pending = self.pending.lock();
            match pending.take() {
                Some(p) if p.block == k => Some(p),
                Some(p) => {
                    // A fetch for some other block. Leave it to finish and
                    // populate the cache, unless it already has.
                    match p.rx.try_recv() {
                        Ok(_) => None,
                        Err(mpsc::TryRecvError::Empty) => {
                            *pending = Some(p);
                            None
                        }
                        Err(mpsc::TryRecvError::Disconnected) => None,
                    }
                }
                None => None,
            }
        };

        if let Some(p) = waiter {
            debug!(block = k, "waiting for in-flight prefetch");
            match p.rx.recv() {
                Ok(result) => return result,
                Err(_) => {
                    warn!(block = k, "prefetch worker vanished, fetching inline");
                }
            }
        }

        let block = self.fetch_block(k)?;
        self.blocks.insert(k, Arc::clone(&block));
        Ok(block)
    }

    fn fetch_block(&self, k: u64) -> CoreResult<Arc<Vec<u8>>> {
        let (start, end) = block_range(k, self.block_size, self.size);
        debug!(block = k, start, end, "fetching block (sync)");
        self.requested_bytes.fetch_add(end - start, Ordering::Relaxed);
        Ok(Arc::new(self.fetcher.fetch(start, end)?))
    }

    fn schedule_prefetch(&self, k: u64) {
        if k >= self.nblocks || self.blocks.contains(&k) {
            return;
        }
        let mut pending = self.pending.lock();
        if let Some(p) = pending.as_ref() {
            // One fetch in flight at a time; clear it only if finished.
            match p.rx.try_recv() {
                Err(mpsc::TryRecvError::Empty) => return,
                _ => *pending = None,
            }
        }
        if self.blocks.contains(&k) {
            return;
        }

        let (start, end) = block_range(k, self.block_size, self.size);
        let fetcher = Arc::clone(&self.fetcher);
        let blocks = Arc::clone(&self.blocks);
        let requested = Arc::clone(&self.requested_bytes);
        let (tx, rx) = mpsc::channel();

        debug!(block = k, start, end, "scheduling prefetch");
        std::thread::spawn(move || {
            requested.fetch_add(end - start, Ordering::Relaxed);
            let result = fetcher
                .fetch(start, end)
                .map(|data| {
                    let block = Arc::new(data);
                    blocks.insert(k, Arc::clone(&block));
                    block
                })
                .map_err(Into::into);
            // Nobody may be waiting; that is fine.
            let _ = tx.send(result);
        });
        *pending = Some(Pending { block: k, rx });
    }
}

impl ReadCache for BackgroundBlockCache {
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
        self.requested_bytes.store(0, Ordering::Relaxed);
    }

    fn name(&self) -> &'static str {
        "background"
    }
}

impl ReadCache for Arc<BackgroundBlockCache> {
    fn read(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        self.read_shared(start, end)
    }

    fn block_size(&self) -> u64 {
        BackgroundBlockCache::block_size(self)
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
        "background"
    }
}
