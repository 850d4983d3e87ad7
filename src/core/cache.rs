//! View cache
//!
//! Maps query fingerprints to materialized read results. A [`Txn`](super::Txn) consults
//! the cache before every read and promotes its pending views into it on commit.

use super::value::DatabaseResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared read cache keyed by query fingerprint
///
/// Implementations synchronize internally; callers never lock.
pub trait ViewCache: Send + Sync {
    /// Look up a materialized result
    fn get(&self, key: &[u8]) -> Option<Arc<DatabaseResult>>;

    /// Store a materialized result, replacing any previous value
    fn put(&self, key: Vec<u8>, value: Arc<DatabaseResult>);
}

#[derive(Debug)]
struct Entry {
    value: Arc<DatabaseResult>,
    inserted: Instant,
}

/// In-memory view cache with an optional time-to-live
///
/// # Example
///
/// ```
/// use rust_ark::core::{MemoryCache, ViewCache};
/// use std::sync::Arc;
///
/// let cache = MemoryCache::new();
/// cache.put(b"key".to_vec(), Arc::new(Vec::new()));
/// assert!(cache.get(b"key").is_some());
/// assert!(cache.get(b"other").is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<Vec<u8>, Entry>>,
    ttl: Option<Duration>,
}

impl MemoryCache {
    /// Create a cache whose entries never expire
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache whose entries expire `ttl` after insertion
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    /// Number of stored entries, expired ones included until they are next read
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn expired(&self, entry: &Entry) -> bool {
        self.ttl
            .map(|ttl| entry.inserted.elapsed() >= ttl)
            .unwrap_or(false)
    }
}

impl ViewCache for MemoryCache {
    fn get(&self, key: &[u8]) -> Option<Arc<DatabaseResult>> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !self.expired(entry) => return Some(Arc::clone(&entry.value)),
                Some(_) => {}
                None => return None,
            }
        }

        // expired: remove unless a fresh value was put in between
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| self.expired(entry)) {
            entries.remove(key);
        }
        None
    }

    fn put(&self, key: Vec<u8>, value: Arc<DatabaseResult>) {
        self.entries.write().insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
            },
        );
    }
}

/// Cache that stores nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl ViewCache for NoopCache {
    fn get(&self, _key: &[u8]) -> Option<Arc<DatabaseResult>> {
        None
    }

    fn put(&self, _key: Vec<u8>, _value: Arc<DatabaseResult>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::{DatabaseRow, DatabaseValue};

    fn rows(name: &str) -> Arc<DatabaseResult> {
        let mut row = DatabaseRow::new();
        row.insert("name".to_string(), DatabaseValue::from(name));
        Arc::new(vec![row])
    }

    #[test]
    fn test_put_then_get() {
        let cache = MemoryCache::new();
        cache.put(b"k".to_vec(), rows("alice"));

        let hit = cache.get(b"k").unwrap();
        assert_eq!(hit[0]["name"], DatabaseValue::from("alice"));
        assert!(cache.get(b"missing").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_replaces() {
        let cache = MemoryCache::new();
        cache.put(b"k".to_vec(), rows("alice"));
        cache.put(b"k".to_vec(), rows("bob"));

        assert_eq!(cache.get(b"k").unwrap()[0]["name"], DatabaseValue::from("bob"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = MemoryCache::with_ttl(Duration::from_millis(20));
        cache.put(b"k".to_vec(), rows("alice"));
        assert!(cache.get(b"k").is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get(b"k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = MemoryCache::new();
        cache.put(b"a".to_vec(), rows("a"));
        cache.put(b"b".to_vec(), rows("b"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_noop_cache() {
        let cache = NoopCache;
        cache.put(b"k".to_vec(), rows("alice"));
        assert!(cache.get(b"k").is_none());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(MemoryCache::new());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for j in 0..100u8 {
                        cache.put(vec![i, j], rows("x"));
                        assert!(cache.get(&[i, j]).is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 800);
    }
}
