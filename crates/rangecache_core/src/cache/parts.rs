//! Cache over explicitly known parts of a file.

use super::{check_range, CacheParams, CacheStats, ReadCache};
use crate::error::{CoreError, CoreResult};
use rangecache_backend::RangeFetcher;
use std::sync::Arc;
use tracing::debug;

/// Cache holding known byte ranges of a file.
///
/// Useful when some regions of an object (an index, a footer) were
/// obtained out of band. Adjacent input ranges are merged at
/// construction, so lookups walk a minimal set of maximal contiguous
/// parts.
///
/// A read wholly inside a known part never calls the fetcher. A read that
/// begins inside a part but extends past it either fetches the remainder
/// (`strict`) or zero-pads it (non-strict). A read that *begins* outside
/// every known part always fetches, never pads; without a fetcher it
/// fails instead.
pub struct KnownPartsCache {
    fetcher: Option<Arc<dyn RangeFetcher>>,
    block_size: u64,
    size: u64,
    parts: Vec<(u64, u64, Vec<u8>)>,
    strict: bool,
    stats: CacheStats,
}

impl KnownPartsCache {
    /// Creates a known-parts cache from registry params.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is unknown.
    pub fn new(params: CacheParams) -> CoreResult<Self> {
        let size = params.known_size("parts")?;
        Ok(Self::with_parts(
            Some(params.fetcher),
            params.block_size,
            size,
            params.options.parts,
            params.options.strict,
        ))
    }

    /// Creates a known-parts cache from explicit parts, optionally with a
    /// fetcher for ranges outside them.
    pub fn with_parts(
        fetcher: Option<Arc<dyn RangeFetcher>>,
        block_size: u64,
        size: u64,
        parts: Vec<(u64, u64, Vec<u8>)>,
        strict: bool,
    ) -> Self {
        Self {
            fetcher,
            block_size,
            size,
            parts: merge_adjacent(parts),
            strict,
            stats: CacheStats::default(),
        }
    }

    /// The merged `(start, end)` ranges currently known.
    pub fn known_ranges(&self) -> Vec<(u64, u64)> {
        self.parts.iter().map(|(s, e, _)| (*s, *e)).collect()
    }

    fn fetch(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        match &self.fetcher {
            Some(fetcher) => {
                self.stats.miss(end - start);
                Ok(fetcher.fetch(start, end)?)
            }
            None => Err(CoreError::config(format!(
                "read [{start}, {end}) is outside known parts and no fetcher is available"
            ))),
        }
    }
}

/// Merges ranges whose end touches the next range's start.
///
/// Input is sorted by start; one walk folds each range into the running
/// one when contiguous, producing the minimal set of maximal parts.
fn merge_adjacent(mut parts: Vec<(u64, u64, Vec<u8>)>) -> Vec<(u64, u64, Vec<u8>)> {
    parts.sort_by_key(|(start, _, _)| *start);
    let mut merged: Vec<(u64, u64, Vec<u8>)> = Vec::with_capacity(parts.len());
    for (start, end, data) in parts {
        match merged.last_mut() {
            Some((_, last_end, last_data)) if *last_end == start => {
                *last_end = end;
                last_data.extend(data);
            }
            _ => merged.push((start, end, data)),
        }
    }
    merged
}

impl ReadCache for KnownPartsCache {
    fn read(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        check_range(start, end, self.size)?;
        if start == end {
            self.stats.hit();
            return Ok(Vec::new());
        }

        let wanted = (end - start) as usize;
        let hit = self
            .parts
            .iter()
            .find(|(s, e, _)| *s <= start && start < *e)
            .map(|(s, e, data)| {
                let off = (start - s) as usize;
                let avail = &data[off..((end.min(*e) - s) as usize)];
                (avail.to_vec(), *e)
            });

        match hit {
            Some((out, part_end)) if end <= part_end => {
                self.stats.hit();
                debug_assert_eq!(out.len(), wanted);
                Ok(out)
            }
            Some((mut out, part_end)) => {
                // Read extends past the known part.
                if self.strict {
                    debug!(start, end, part_end, "strict read past known part");
                    out.extend(self.fetch(part_end, end)?);
                } else {
                    self.stats.hit();
                    out.resize(wanted, 0);
                }
                Ok(out)
            }
            // Begins outside every known part: fetch or fail, never pad.
            None => self.fetch(start, end),
        }
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
        "parts"
    }
}
