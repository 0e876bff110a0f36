//! Token-keyed instance caching.
//!
//! Backends are often expensive to construct (connection pools, auth
//! handshakes), and callers routinely re-open the same target with the
//! same parameters. [`InstanceCache`] deduplicates those constructions:
//! the same token yields the same shared instance.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Derives a cache token from an instance's identifying parameters.
///
/// Parameters are hashed, not concatenated, so tokens have a fixed size
/// and no parameter content leaks into logs that print them.
#[must_use]
pub fn instance_token<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

struct Inner<T: ?Sized> {
    pid: u32,
    map: HashMap<String, Arc<T>>,
}

/// Process-scoped registry of shared instances.
///
/// Entries are held by strong reference: an instance stays alive for
/// reuse even when no caller currently holds it. Call
/// [`remove`](Self::remove) or [`clear`](Self::clear) to let go.
///
/// The registry remembers the process id it was filled in. After a fork
/// the child sees a different pid and the map is dropped on first touch,
/// because cached instances may wrap file descriptors or threads that do
/// not survive forking.
pub struct InstanceCache<T: ?Sized> {
    inner: Mutex<Inner<T>>,
}

impl<T: ?Sized> InstanceCache<T> {
    /// Creates an empty cache bound to the current process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pid: std::process::id(),
                map: HashMap::new(),
            }),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner<T>) -> R) -> R {
        let mut inner = self.inner.lock();
        let pid = std::process::id();
        if inner.pid != pid {
            debug!(
                old_pid = inner.pid,
                new_pid = pid,
                dropped = inner.map.len(),
                "instance cache crossed a fork"
            );
            inner.map.clear();
            inner.pid = pid;
        }
        f(&mut inner)
    }

    /// Looks up the instance for `token`.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<Arc<T>> {
        self.with_inner(|inner| inner.map.get(token).cloned())
    }

    /// Returns the instance for `token`, constructing and caching it when
    /// absent. The constructor runs under the registry lock, so at most
    /// one instance per token is ever built.
    pub fn get_or_insert_with(&self, token: &str, make: impl FnOnce() -> Arc<T>) -> Arc<T> {
        self.with_inner(|inner| {
            Arc::clone(
                inner
                    .map
                    .entry(token.to_string())
                    .or_insert_with(|| {
                        debug!(token, "constructing new cached instance");
                        make()
                    }),
            )
        })
    }

    /// Fallible variant of [`get_or_insert_with`](Self::get_or_insert_with):
    /// a failed construction caches nothing.
    ///
    /// # Errors
    ///
    /// Propagates the constructor's error.
    pub fn try_get_or_insert_with<E>(
        &self,
        token: &str,
        make: impl FnOnce() -> Result<Arc<T>, E>,
    ) -> Result<Arc<T>, E> {
        self.with_inner(|inner| {
            if let Some(existing) = inner.map.get(token) {
                return Ok(Arc::clone(existing));
            }
            let instance = make()?;
            inner.map.insert(token.to_string(), Arc::clone(&instance));
            Ok(instance)
        })
    }

    /// Drops the registry's reference for `token`, returning it.
    pub fn remove(&self, token: &str) -> Option<Arc<T>> {
        self.with_inner(|inner| inner.map.remove(token))
    }

    /// Drops all registry references.
    pub fn clear(&self) {
        self.with_inner(|inner| inner.map.clear());
    }

    /// Number of cached instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_inner(|inner| inner.map.len())
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for InstanceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn token_is_stable_and_parameter_sensitive() {
        let a = instance_token(&["s3", "bucket", "region=us-east-1"]);
        let b = instance_token(&["s3", "bucket", "region=us-east-1"]);
        let c = instance_token(&["s3", "bucket", "region=eu-west-1"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn token_separates_adjacent_parts() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(instance_token(&["ab", "c"]), instance_token(&["a", "bc"]));
    }

    #[test]
    fn same_token_yields_same_instance() {
        let cache: InstanceCache<String> = InstanceCache::new();
        let built = AtomicUsize::new(0);

        let first = cache.get_or_insert_with("t1", || {
            built.fetch_add(1, Ordering::SeqCst);
            Arc::new("instance".to_string())
        });
        let second = cache.get_or_insert_with("t1", || {
            built.fetch_add(1, Ordering::SeqCst);
            Arc::new("other".to_string())
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn entries_survive_caller_drop() {
        let cache: InstanceCache<String> = InstanceCache::new();
        {
            let _handle = cache.get_or_insert_with("t", || Arc::new("x".to_string()));
        }
        assert!(cache.get("t").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_construction_caches_nothing() {
        let cache: InstanceCache<String> = InstanceCache::new();
        let result: Result<_, &str> = cache.try_get_or_insert_with("t", || Err("boom"));
        assert!(result.is_err());
        assert!(cache.get("t").is_none());

        let ok: Result<_, &str> =
            cache.try_get_or_insert_with("t", || Ok(Arc::new("fine".to_string())));
        assert!(ok.is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_and_clear_release_references() {
        let cache: InstanceCache<String> = InstanceCache::new();
        cache.get_or_insert_with("a", || Arc::new("a".to_string()));
        cache.get_or_insert_with("b", || Arc::new("b".to_string()));

        assert!(cache.remove("a").is_some());
        assert!(cache.remove("a").is_none());
        cache.clear();
        assert!(cache.is_empty());
    }
}
