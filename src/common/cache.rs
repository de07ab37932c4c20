//! In-memory cache for storing key-value pairs.
//!
//! Uses moka's high-performance concurrent cache implementation.

use moka::sync::Cache;

/// Thread-safe in-memory cache, bounded or unbounded.
///
/// Used for storing:
/// - Deployed definitions in [`MemStore`](crate::MemStore) (`MemCache<String, Arc<TemplateModel>>`, ...)
/// - Shared HTTP clients keyed by proxy endpoint (`MemCache<String, reqwest::Client>`)
#[derive(Clone)]
pub struct MemCache<K, V> {
    entries: Cache<K, V>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a new [`MemCache`].
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::new(capacity as u64),
        }
    }

    /// Allocate a [`MemCache`] that never evicts.
    pub fn unbounded() -> Self {
        Self {
            entries: Cache::builder().build(),
        }
    }

    /// Insert or replace the value stored at `key`.
    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.entries.insert(key, value);
    }

    /// Get the value stored at `key`.
    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.get(key)
    }

    /// Get the value stored at `key`, building and storing it with `init` when absent.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        init: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.entries.get(&key) {
            return Ok(value);
        }
        let value = init()?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::MemCache;

    #[test]
    fn test_get_or_try_insert_with_builds_once() {
        let cache = MemCache::<String, usize>::new(16);
        let first: Result<usize, String> = cache.get_or_try_insert_with("a".to_string(), || Ok(1));
        let second: Result<usize, String> = cache.get_or_try_insert_with("a".to_string(), || Err("called twice".to_string()));
        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));

        let failed: Result<usize, String> = cache.get_or_try_insert_with("b".to_string(), || Err("boom".to_string()));
        assert!(failed.is_err());
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_unbounded_keeps_every_entry() {
        let cache = MemCache::<usize, usize>::unbounded();
        for i in 0..20_000 {
            cache.set(i, i * 2);
        }
        cache.entries.run_pending_tasks();
        assert_eq!(cache.entries.entry_count(), 20_000);
        assert!((0..20_000).all(|i| cache.get(&i) == Some(i * 2)));
    }
}
