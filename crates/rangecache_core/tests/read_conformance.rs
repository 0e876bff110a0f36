//! Cross-strategy conformance: every cache strategy must return exactly
//! the underlying bytes for any in-bounds range, whatever its fetch and
//! eviction behavior.

use proptest::prelude::*;
use rangecache_core::cache::{create_cache, CacheParams};
use rangecache_backend::{MemoryFetcher, RangeFetcher};
use std::sync::Arc;

const STRATEGIES: &[&str] = &[
    "none",
    "all",
    "first",
    "mmap",
    "readahead",
    "blockcache",
    "background",
    "bytes",
    "parts",
];

fn params_for(data: &[u8], block_size: u64) -> CacheParams {
    let fetcher: Arc<dyn RangeFetcher> = Arc::new(MemoryFetcher::new(data.to_vec()));
    let mut params = CacheParams::new(block_size, fetcher, Some(data.len() as u64));
    // "parts" with no known parts degenerates to fetching; still must
    // return correct bytes.
    params.options.strict = true;
    params
}

proptest! {
    #[test]
    fn every_strategy_returns_exact_range(
        data in prop::collection::vec(any::<u8>(), 1..256),
        block_size in 1u64..32,
        ranges in prop::collection::vec((0usize..256, 0usize..64), 1..8),
    ) {
        for name in STRATEGIES {
            let mut cache = create_cache(name, params_for(&data, block_size)).unwrap();
            for (raw_start, raw_len) in &ranges {
                let start = raw_start % data.len();
                let end = (start + raw_len).min(data.len());
                let out = cache.read(start as u64, end as u64).unwrap();
                prop_assert_eq!(&out[..], &data[start..end], "strategy {}", name);
            }
        }
    }

    #[test]
    fn repeated_reads_are_stable(
        data in prop::collection::vec(any::<u8>(), 16..128),
        block_size in 1u64..16,
    ) {
        for name in STRATEGIES {
            let mut cache = create_cache(name, params_for(&data, block_size)).unwrap();
            let end = data.len() as u64;
            let first = cache.read(0, end).unwrap();
            let second = cache.read(0, end).unwrap();
            prop_assert_eq!(&first, &data, "strategy {}", name);
            prop_assert_eq!(first, second, "strategy {}", name);
        }
    }
}

#[test]
fn empty_range_is_empty_for_every_strategy() {
    let data = b"0123456789";
    for name in STRATEGIES {
        let mut cache = create_cache(name, params_for(data, 4)).unwrap();
        assert!(cache.read(5, 5).unwrap().is_empty(), "strategy {name}");
    }
}

#[test]
fn out_of_bounds_read_fails_for_every_strategy() {
    let data = b"0123456789";
    for name in STRATEGIES {
        let mut cache = create_cache(name, params_for(data, 4)).unwrap();
        assert!(cache.read(4, 11).is_err(), "strategy {name}");
        assert!(cache.read(7, 3).is_err(), "strategy {name}");
    }
}
