use crate::lru::LruCache;
use crate::value::Value;
use std::sync::Mutex;

/// Provides a thread-safe wrapper around an [LruCache](LruCache) holding [Value]s.
///
/// All operations are fully serialized by a mutex. There is no reader/writer split as even a
/// read hit mutates the recency order. The critical sections are pure in-memory work of
/// amortized constant cost, therefore the lock is never held for long. Notably, the inner
/// store is created without an eviction callback, so no user code ever runs while the lock is
/// held.
///
/// The underlying store is constructed lazily on the first [add](SharedCache::add), a
/// [get](SharedCache::get) on a wrapper which never stored anything is simply a miss.
pub struct SharedCache {
    max_bytes: usize,
    inner: Mutex<Option<LruCache<Value>>>,
}

impl SharedCache {
    /// Creates a wrapper which will set up its store with the given byte budget on first use.
    pub fn new(max_bytes: usize) -> Self {
        SharedCache {
            max_bytes,
            inner: Mutex::new(None),
        }
    }

    /// Stores the given value for the given key.
    pub fn add(&self, key: &str, value: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .get_or_insert_with(|| LruCache::new(self.max_bytes, None))
            .add(key.to_owned(), value);
    }

    /// Returns the value stored for the given key or **None** if no value is present.
    ///
    /// The returned value shares its buffer with the store, which is safe as values are
    /// immutable by construction.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap();
        match inner.as_mut() {
            Some(lru) => lru.get(key).cloned(),
            None => None,
        }
    }

    /// Removes the entry for the given key if present.
    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(lru) = inner.as_mut() {
            lru.remove(key);
        }
    }

    /// Returns the number of entries currently stored.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.as_ref().map(|lru| lru.len()).unwrap_or(0)
    }

    /// Determines if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the amount of memory currently allocated by keys and values in bytes.
    pub fn used_bytes(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.as_ref().map(|lru| lru.used_bytes()).unwrap_or(0)
    }

    /// Returns the configured memory budget in bytes (**0** meaning unbounded).
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::SharedCache;
    use crate::value::Value;
    use std::sync::Arc;

    #[test]
    fn reading_an_unused_cache_is_a_miss() {
        let cache = SharedCache::new(1024);

        assert_eq!(cache.get("anything"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.used_bytes(), 0);
    }

    #[test]
    fn the_store_is_created_on_first_add() {
        let cache = SharedCache::new(1024);

        cache.add("foo", Value::new(b"bar"));
        assert_eq!(cache.get("foo"), Some(Value::new(b"bar")));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used_bytes(), 6);

        cache.remove("foo");
        assert_eq!(cache.get("foo"), None);
    }

    #[test]
    fn the_budget_is_applied_to_the_lazy_store() {
        let cache = SharedCache::new(20);

        cache.add("a", Value::new(b"xxxxx"));
        cache.add("b", Value::new(b"yyyyy"));
        cache.add("c", Value::new(b"zzzzz"));
        cache.add("d", Value::new(b"wwwww"));

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn concurrent_access_keeps_the_store_consistent() {
        let cache = Arc::new(SharedCache::new(0));
        let mut threads = Vec::new();

        for thread in 0..4 {
            let cache = cache.clone();
            threads.push(std::thread::spawn(move || {
                for index in 0..250 {
                    let key = format!("{}-{:03}", thread, index);
                    cache.add(&key, Value::new(b"0123456789"));
                    assert_eq!(cache.get(&key), Some(Value::new(b"0123456789")));
                }
            }));
        }

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(cache.len(), 1000);
        // 1000 entries, each with a 5 byte key and a 10 byte value...
        assert_eq!(cache.used_bytes(), 1000 * (5 + 10));
    }
}
