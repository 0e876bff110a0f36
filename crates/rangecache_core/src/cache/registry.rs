//! Name-keyed registry of cache strategy constructors.

use super::{
    AllBytesCache, BackgroundBlockCache, BlockCache, BytesCache, CacheParams, FirstBlockCache,
    KnownPartsCache, PassThroughCache, ReadAheadCache, ReadCache, SparseBlockCache,
};
use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Constructor stored in the registry.
pub type CacheFactory = Arc<dyn Fn(CacheParams) -> CoreResult<Box<dyn ReadCache>> + Send + Sync>;

fn registry() -> &'static RwLock<HashMap<String, CacheFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, CacheFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, CacheFactory> = HashMap::new();
        let builtin: [(&str, CacheFactory); 9] = [
            ("none", Arc::new(|p| Ok(Box::new(PassThroughCache::new(p)) as Box<dyn ReadCache>))),
            ("all", Arc::new(|p| Ok(Box::new(AllBytesCache::new(p)?) as Box<dyn ReadCache>))),
            ("first", Arc::new(|p| Ok(Box::new(FirstBlockCache::new(p)?) as Box<dyn ReadCache>))),
            ("mmap", Arc::new(|p| Ok(Box::new(SparseBlockCache::new(p)?) as Box<dyn ReadCache>))),
            ("readahead", Arc::new(|p| Ok(Box::new(ReadAheadCache::new(p)?) as Box<dyn ReadCache>))),
            ("blockcache", Arc::new(|p| Ok(Box::new(BlockCache::new(p)?) as Box<dyn ReadCache>))),
            ("background", Arc::new(|p| Ok(Box::new(BackgroundBlockCache::new(p)?) as Box<dyn ReadCache>))),
            ("bytes", Arc::new(|p| Ok(Box::new(BytesCache::new(p)) as Box<dyn ReadCache>))),
            ("parts", Arc::new(|p| Ok(Box::new(KnownPartsCache::new(p)?) as Box<dyn ReadCache>))),
        ];
        for (name, factory) in builtin {
            map.insert(name.to_string(), factory);
        }
        RwLock::new(map)
    })
}

/// Registers a cache strategy under `name`.
///
/// # Errors
///
/// Returns [`CoreError::DuplicateCache`] if the name is taken and
/// `clobber` is false.
pub fn register_cache(name: &str, factory: CacheFactory, clobber: bool) -> CoreResult<()> {
    let mut map = registry().write();
    if !clobber && map.contains_key(name) {
        return Err(CoreError::DuplicateCache {
            name: name.to_string(),
        });
    }
    map.insert(name.to_string(), factory);
    Ok(())
}

/// Constructs the strategy registered under `name`.
///
/// # Errors
///
/// Returns [`CoreError::UnknownCache`] for an unregistered name, or
/// whatever the strategy constructor raises.
pub fn create_cache(name: &str, params: CacheParams) -> CoreResult<Box<dyn ReadCache>> {
    let factory = registry()
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| CoreError::UnknownCache {
            name: name.to_string(),
        })?;
    factory(params)
}

/// Names currently registered, sorted.
pub fn registered_caches() -> Vec<String> {
    let mut names: Vec<String> = registry().read().keys().cloned().collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangecache_backend::{MemoryFetcher, RangeFetcher};

    fn params() -> CacheParams {
        let fetcher: Arc<dyn RangeFetcher> = Arc::new(MemoryFetcher::new(b"0123456789".to_vec()));
        CacheParams::new(4, fetcher, Some(10))
    }

    #[test]
    fn builtins_are_registered() {
        let names = registered_caches();
        for name in [
            "none",
            "all",
            "first",
            "mmap",
            "readahead",
            "blockcache",
            "background",
            "bytes",
            "parts",
        ] {
            assert!(names.iter().any(|n| n == name), "missing {name}");
        }
    }

    #[test]
    fn create_by_name_reads_correctly() {
        for name in ["none", "all", "first", "readahead", "blockcache", "bytes"] {
            let mut cache = create_cache(name, params()).unwrap();
            assert_eq!(cache.read(1, 7).unwrap(), b"123456", "{name}");
            assert_eq!(cache.name(), name);
        }
    }

    #[test]
    fn unknown_name_fails() {
        assert!(matches!(
            create_cache("nonesuch", params()),
            Err(CoreError::UnknownCache { .. })
        ));
    }

    #[test]
    fn duplicate_registration_requires_clobber() {
        let factory: CacheFactory = Arc::new(|p| Ok(Box::new(PassThroughCache::new(p)) as Box<dyn ReadCache>));
        register_cache("custom_test_strategy", Arc::clone(&factory), false).unwrap();

        let again = register_cache("custom_test_strategy", Arc::clone(&factory), false);
        assert!(matches!(again, Err(CoreError::DuplicateCache { .. })));

        register_cache("custom_test_strategy", factory, true).unwrap();
    }
}
