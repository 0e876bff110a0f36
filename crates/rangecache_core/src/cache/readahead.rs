//! Read-ahead window and growing bytes-buffer strategies.

use super::{check_range, CacheParams, CacheStats, ReadCache};
use crate::error::CoreResult;
use rangecache_backend::RangeFetcher;
use std::sync::Arc;
use tracing::trace;

/// Read-ahead strategy: one sliding window, refilled on every miss.
///
/// Keeps a single buffer and reads one block past the requested end when
/// refilling it. Best for many small sequential reads (e.g. line
/// iteration); it makes no attempt to fill holes or keep old fragments
/// alive.
pub struct ReadAheadCache {
    fetcher: Arc<dyn RangeFetcher>,
    block_size: u64,
    size: u64,
    buffer: Vec<u8>,
    window_start: u64,
    window_end: u64,
    stats: CacheStats,
}

impl ReadAheadCache {
    /// Creates a read-ahead strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is unknown.
    pub fn new(params: CacheParams) -> CoreResult<Self> {
        let size = params.known_size("readahead")?;
        Ok(Self {
            fetcher: params.fetcher,
            block_size: params.block_size,
            size,
            buffer: Vec::new(),
            window_start: 0,
            window_end: 0,
            stats: CacheStats::default(),
        })
    }
}

impl ReadCache for ReadAheadCache {
    fn read(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        check_range(start, end, self.size)?;
        if start == end || start >= self.size {
            self.stats.hit();
            return Ok(Vec::new());
        }

        let mut wanted = (end - start) as usize;
        let mut part = Vec::new();
        let mut fetch_from = start;

        if start >= self.window_start && end <= self.window_end {
            self.stats.hit();
            let off = (start - self.window_start) as usize;
            return Ok(self.buffer[off..off + wanted].to_vec());
        } else if start >= self.window_start && start < self.window_end {
            // Keep the tail of the window, fetch the rest.
            self.stats.hit();
            let off = (start - self.window_start) as usize;
            part = self.buffer[off..].to_vec();
            wanted -= part.len();
            fetch_from = self.window_end;
        }

        let fetch_to = (end + self.block_size).min(self.size);
        trace!(fetch_from, fetch_to, "readahead refill");
        self.stats.miss(fetch_to - fetch_from);
        self.buffer = self.fetcher.fetch(fetch_from, fetch_to)?;
        self.window_start = fetch_from;
        self.window_end = fetch_from + self.buffer.len() as u64;

        part.extend_from_slice(&self.buffer[..wanted]);
        Ok(part)
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
        "readahead"
    }
}

/// Growing bytes-buffer strategy.
///
/// Holds one contiguous in-memory buffer and extends it (with one block of
/// read-ahead) as reads progress through the file, prepending or appending
/// as needed. With `trim`, data more than a block behind the current read
/// position is discarded from the front.
pub struct BytesCache {
    fetcher: Arc<dyn RangeFetcher>,
    block_size: u64,
    size: Option<u64>,
    buffer: Vec<u8>,
    window: Option<(u64, u64)>,
    trim: bool,
    stats: CacheStats,
}

impl BytesCache {
    /// Creates a bytes-buffer strategy. The size may be unknown for
    /// streamed sources; read-ahead is then disabled.
    pub fn new(params: CacheParams) -> Self {
        Self {
            fetcher: params.fetcher,
            block_size: params.block_size,
            size: params.size,
            buffer: Vec::new(),
            window: None,
            trim: params.options.trim,
            stats: CacheStats::default(),
        }
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn fetch(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        self.stats.miss(end - start);
        Ok(self.fetcher.fetch(start, end)?)
    }
}

impl ReadCache for BytesCache {
    fn read(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        if let Some(size) = self.size {
            check_range(start, end, size)?;
        }
        if start == end {
            self.stats.hit();
            return Ok(Vec::new());
        }

        if let Some((ws, we)) = self.window {
            if start >= ws && end <= we {
                self.stats.hit();
                let off = (start - ws) as usize;
                return Ok(self.buffer[off..off + (end - start) as usize].to_vec());
            }
        }

        // Read one block ahead when the size allows it.
        let bend = match self.size {
            Some(size) => (end + self.block_size).min(size),
            None => end,
        };

        match self.window {
            None => {
                self.buffer = self.fetch(start, bend)?;
                self.window = Some((start, start + self.buffer.len() as u64));
            }
            Some((ws, we)) => {
                if start < ws && end > we {
                    // Read covers the whole window: replace it.
                    self.buffer = self.fetch(start, bend)?;
                    self.window = Some((start, start + self.buffer.len() as u64));
                } else if start < ws {
                    if we.saturating_sub(end) > self.block_size {
                        // Window is far ahead of this read: replace it.
                        self.buffer = self.fetch(start, bend)?;
                        self.window = Some((start, start + self.buffer.len() as u64));
                    } else {
                        let mut new = self.fetch(start, ws)?;
                        new.extend_from_slice(&self.buffer);
                        self.buffer = new;
                        self.window = Some((start, start + self.buffer.len() as u64));
                    }
                } else if bend > we {
                    if end.saturating_sub(we) > self.block_size {
                        // Gap too large to bridge: replace the window.
                        self.buffer = self.fetch(start, bend)?;
                        self.window = Some((start, start + self.buffer.len() as u64));
                    } else {
                        let new = self.fetch(we, bend)?;
                        self.buffer.extend_from_slice(&new);
                        self.window = Some((ws, ws + self.buffer.len() as u64));
                    }
                } else {
                    // start >= ws, end <= we: already handled as a hit.
                }
            }
        }

        let (ws, _) = self.window.unwrap_or((start, start));
        let off = (start - ws) as usize;
        let out = self.buffer[off..off + (end - start) as usize].to_vec();

        if self.trim {
            let (ws, we) = self.window.unwrap_or((0, 0));
            let num = (we - ws) / (self.block_size + 1);
            if num > 1 {
                let drop = (self.block_size * num) as usize;
                self.buffer.drain(..drop);
                self.window = Some((ws + drop as u64, we));
                trace!(dropped = drop, "trimmed bytes cache");
            }
        }

        Ok(out)
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
        "bytes"
    }
}
