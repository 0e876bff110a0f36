//! Lock-protected LRU map with externally updatable entries.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Statistics snapshot for an [`UpdatableLru`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    /// Lookups served from the map.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Maximum resident entries.
    pub maxsize: usize,
    /// Current resident entries.
    pub currsize: usize,
}

/// An LRU map that allows entries to be inserted from outside the lookup
/// path, so a background worker can populate it opportunistically.
///
/// The map never holds more than `max_size` entries; inserting past
/// capacity evicts the least-recently-used entry. All operations take
/// `&self` and are serialized on an internal mutex, which is what makes
/// the block caches safe to share across threads.
pub struct UpdatableLru<K, V> {
    inner: Mutex<Inner<K, V>>,
    max_size: usize,
}

struct Inner<K, V> {
    map: HashMap<K, V>,
    order: VecDeque<K>,
    hits: u64,
    misses: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> UpdatableLru<K, V> {
    /// Creates an LRU map holding at most `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
            max_size,
        }
    }

    /// Looks up a key, marking it most recently used on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.map.get(key).cloned() {
            inner.hits += 1;
            move_to_back(&mut inner.order, key);
            Some(value)
        } else {
            inner.misses += 1;
            None
        }
    }

    /// Returns whether a key is resident, without touching recency or
    /// counters.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().map.contains_key(key)
    }

    /// Inserts a value as most recently used, evicting the LRU entry if
    /// the map is full. Returns the evicted key, if any.
    pub fn insert(&self, key: K, value: V) -> Option<K> {
        let mut inner = self.inner.lock();
        if inner.map.insert(key.clone(), value).is_some() {
            move_to_back(&mut inner.order, &key);
            return None;
        }
        inner.order.push_back(key);
        if inner.map.len() > self.max_size {
            if let Some(evicted) = inner.order.pop_front() {
                inner.map.remove(&evicted);
                return Some(evicted);
            }
        }
        None
    }

    /// Current statistics.
    pub fn cache_info(&self) -> CacheInfo {
        let inner = self.inner.lock();
        CacheInfo {
            hits: inner.hits,
            misses: inner.misses,
            maxsize: self.max_size,
            currsize: inner.map.len(),
        }
    }
}

fn move_to_back<K: Eq>(order: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        if let Some(k) = order.remove(pos) {
            order.push_back(k);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let lru = UpdatableLru::new(4);
        lru.insert(1, "a");
        assert_eq!(lru.get(&1), Some("a"));
        assert_eq!(lru.get(&2), None);

        let info = lru.cache_info();
        assert_eq!(info.hits, 1);
        assert_eq!(info.misses, 1);
        assert_eq!(info.currsize, 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let lru = UpdatableLru::new(2);
        lru.insert(1, "a");
        lru.insert(2, "b");
        // Touch 1 so 2 becomes LRU
        lru.get(&1);

        let evicted = lru.insert(3, "c");
        assert_eq!(evicted, Some(2));
        assert!(lru.contains(&1));
        assert!(!lru.contains(&2));
        assert!(lru.contains(&3));
    }

    #[test]
    fn never_exceeds_capacity() {
        let lru = UpdatableLru::new(3);
        for i in 0..20 {
            lru.insert(i, i);
            assert!(lru.cache_info().currsize <= 3);
        }
    }

    #[test]
    fn reinsert_updates_value_and_recency() {
        let lru = UpdatableLru::new(2);
        lru.insert(1, "a");
        lru.insert(2, "b");
        lru.insert(1, "a2");

        // 2 is now LRU
        assert_eq!(lru.insert(3, "c"), Some(2));
        assert_eq!(lru.get(&1), Some("a2"));
    }

    #[test]
    fn contains_does_not_touch_counters() {
        let lru = UpdatableLru::new(2);
        lru.insert(1, "a");
        lru.contains(&1);
        lru.contains(&9);

        let info = lru.cache_info();
        assert_eq!(info.hits, 0);
        assert_eq!(info.misses, 0);
    }
}
