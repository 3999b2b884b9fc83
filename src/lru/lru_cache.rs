use linked_hash_map::LinkedHashMap;

/// Returns the allocated memory in bytes.
pub trait ByteSize {
    /// Returns the amount of allocated memory in bytes.
    ///
    /// Note that most probably this is an approximation and not the exact byte value. However,
    /// it should represent the "largest" part of an instance. (E.g. for a string, this would
    /// be the bytes allocated on the heap and might discard the fields allocated on the stack
    /// used to store the length and capacity as well as the pointer itself.)
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.capacity()
    }
}

/// Invoked whenever an entry leaves the store, receiving the key and value being dropped.
pub type EvictionCallback<V> = Box<dyn FnMut(String, V) + Send>;

/// Provides a size constrained LRU store.
///
/// The store behaves just like a **Map** as long as there is no shortage in memory. Once the
/// bytes allocated by all keys and values exceed **max_bytes**, the least recently used
/// entries are evicted until the budget is satisfied again - hence the name LRU.
///
/// Each entry accounts for the length of its key plus the allocated size of its value. A
/// **max_bytes** of **0** disables the budget entirely, the store then grows without bounds.
///
/// An optional [EvictionCallback](EvictionCallback) is notified exactly once for every entry
/// which leaves the store, be it due to eviction, an explicit [remove](LruCache::remove) or a
/// [clear](LruCache::clear).
///
/// # Examples
/// ```
/// # use callisto::lru::LruCache;
/// # use callisto::value::Value;
/// // Specifies a store with a budget of 20 bytes...
/// let mut lru = LruCache::new(20, None);
///
/// lru.add("a".to_owned(), Value::new(b"xxxxx"));
/// lru.add("b".to_owned(), Value::new(b"yyyyy"));
/// lru.add("c".to_owned(), Value::new(b"zzzzz"));
/// assert_eq!(lru.used_bytes(), 18);
///
/// // ...adding a fourth entry exceeds the budget and drops the least recently used one:
/// lru.add("d".to_owned(), Value::new(b"wwwww"));
/// assert_eq!(lru.get("a").is_none(), true);
/// assert_eq!(lru.len(), 3);
/// ```
pub struct LruCache<V: ByteSize> {
    max_bytes: usize,
    used_bytes: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    on_evicted: Option<EvictionCallback<V>>,
    map: LinkedHashMap<String, Entry<V>>,
}

struct Entry<V: ByteSize> {
    mem_size: usize,
    value: V,
}

impl<V: ByteSize> LruCache<V> {
    /// Creates a new store which may allocate up to **max_bytes** for its keys and values.
    ///
    /// A **max_bytes** of **0** disables the memory budget. The given callback (if any) is
    /// invoked for every entry which leaves the store.
    pub fn new(max_bytes: usize, on_evicted: Option<EvictionCallback<V>>) -> Self {
        LruCache {
            max_bytes,
            used_bytes: 0,
            reads: 0,
            hits: 0,
            writes: 0,
            on_evicted,
            map: LinkedHashMap::new(),
        }
    }

    /// Stores the given value for the given key.
    ///
    /// If the key is already present, its value is replaced and the memory accounting is
    /// adjusted by the size difference. In either case the entry becomes the most recently
    /// used one. Afterwards, least recently used entries are evicted until the configured
    /// budget is satisfied.
    ///
    /// Note that an entry which on its own is larger than the whole budget will be inserted
    /// and immediately evicted again (notifying the eviction callback). This keeps the budget
    /// invariant intact without turning **add** into a fallible operation.
    pub fn add(&mut self, key: String, value: V) {
        let entry = Entry {
            mem_size: key.len() + value.allocated_size(),
            value,
        };

        self.writes += 1;
        self.used_bytes += entry.mem_size;

        // LinkedHashMap::insert also moves a replaced key to the most recently used spot,
        // which is exactly the recency protocol we need here...
        if let Some(stale_entry) = self.map.insert(key, entry) {
            self.used_bytes -= stale_entry.mem_size;
        }

        self.enforce_budget();
    }

    fn enforce_budget(&mut self) {
        while self.max_bytes != 0 && self.used_bytes > self.max_bytes && !self.map.is_empty() {
            self.remove_oldest();
        }
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A hit marks the entry as the most recently used one.
    ///
    /// # Examples
    /// ```
    /// # use callisto::lru::LruCache;
    /// # use callisto::value::Value;
    /// let mut lru = LruCache::new(1024, None);
    ///
    /// lru.add("foo".to_owned(), Value::new(b"bar"));
    /// assert_eq!(lru.get("foo"), Some(&Value::new(b"bar")));
    /// assert_eq!(lru.get("unknown"), None);
    /// ```
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        match self.map.get_refresh(key) {
            Some(entry) => {
                self.hits += 1;
                Some(&entry.value)
            }
            None => None,
        }
    }

    /// Removes the entry for the given key if present.
    ///
    /// The eviction callback is notified just like for an entry dropped by the LRU policy.
    pub fn remove(&mut self, key: &str) {
        self.writes += 1;

        if let Some(entry) = self.map.remove(key) {
            self.used_bytes -= entry.mem_size;
            if let Some(callback) = self.on_evicted.as_mut() {
                callback(key.to_owned(), entry.value);
            }
        }
    }

    /// Removes the least recently used entry if the store is non-empty.
    pub fn remove_oldest(&mut self) {
        if let Some((key, entry)) = self.map.pop_front() {
            self.used_bytes -= entry.mem_size;
            if let Some(callback) = self.on_evicted.as_mut() {
                callback(key, entry.value);
            }
        }
    }

    /// Removes all entries in this store.
    ///
    /// The eviction callback is notified once per live entry. Note that this will also zero
    /// all metrics (reads, writes, cache hits).
    pub fn clear(&mut self) {
        while let Some((key, entry)) = self.map.pop_front() {
            self.used_bytes -= entry.mem_size;
            if let Some(callback) = self.on_evicted.as_mut() {
                callback(key, entry.value);
            }
        }

        self.reads = 0;
        self.writes = 0;
        self.hits = 0;
    }

    /// Returns the number of entries in the store.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the store is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the memory budget of this store in bytes (**0** meaning unbounded).
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Returns the amount of memory currently allocated by all keys and values in bytes.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Returns the key of the least recently used entry (the next eviction victim).
    pub fn oldest(&self) -> Option<&str> {
        self.map.front().map(|(key, _)| key.as_str())
    }

    /// Returns the key of the most recently used entry.
    pub fn newest(&self) -> Option<&str> {
        self.map.back().map(|(key, _)| key.as_str())
    }

    /// Returns the total number of reads performed on this store since the last clear.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the total number of writes performed on this store since the last clear.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EvictionCallback, LruCache};
    use crate::value::Value;
    use std::sync::{Arc, Mutex};

    fn collector() -> (Arc<Mutex<Vec<String>>>, EvictionCallback<Value>) {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = evicted.clone();
        let callback: EvictionCallback<Value> =
            Box::new(move |key, _value| sink.lock().unwrap().push(key));

        (evicted, callback)
    }

    #[test]
    fn stored_values_can_be_read_back() {
        let mut lru = LruCache::new(1024, None);

        lru.add("key1".to_owned(), Value::new(b"1234"));
        assert_eq!(lru.get("key1"), Some(&Value::new(b"1234")));
        assert_eq!(lru.get("key2"), None);
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn memory_accounting_follows_adds_replacements_and_removes() {
        let mut lru = LruCache::new(0, None);

        lru.add("a".to_owned(), Value::new(b"xxxx"));
        lru.add("bb".to_owned(), Value::new(b"yyyy"));
        assert_eq!(lru.used_bytes(), 5 + 6);

        // Replacing a value adjusts the accounting by the size difference...
        lru.add("a".to_owned(), Value::new(b"x"));
        assert_eq!(lru.used_bytes(), 2 + 6);

        // ...and removing an entry releases its share.
        lru.remove("bb");
        assert_eq!(lru.used_bytes(), 2);
        lru.remove("a");
        assert_eq!(lru.used_bytes(), 0);
        assert!(lru.is_empty());
    }

    #[test]
    fn the_byte_budget_is_enforced() {
        let (evicted, callback) = collector();
        let mut lru = LruCache::new(20, Some(callback));

        lru.add("a".to_owned(), Value::new(b"xxxxx"));
        lru.add("b".to_owned(), Value::new(b"yyyyy"));
        lru.add("c".to_owned(), Value::new(b"zzzzz"));
        assert_eq!(lru.used_bytes(), 18);
        assert_eq!(lru.len(), 3);

        // The fourth entry exceeds the budget of 20 bytes, therefore the least recently
        // used entry ("a") has to go - exactly once...
        lru.add("d".to_owned(), Value::new(b"wwwww"));
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.used_bytes(), 18);
        assert_eq!(lru.get("a"), None);
        assert_eq!(*evicted.lock().unwrap(), vec!["a".to_owned()]);
    }

    #[test]
    fn reads_protect_entries_from_eviction() {
        let mut lru = LruCache::new(20, None);

        lru.add("a".to_owned(), Value::new(b"xxxxx"));
        lru.add("b".to_owned(), Value::new(b"yyyyy"));
        lru.add("c".to_owned(), Value::new(b"zzzzz"));

        // "a" is now the most recently used entry, so the next eviction hits "b"...
        assert!(lru.get("a").is_some());
        assert_eq!(lru.newest(), Some("a"));
        assert_eq!(lru.oldest(), Some("b"));

        lru.add("d".to_owned(), Value::new(b"wwwww"));
        assert!(lru.get("a").is_some());
        assert_eq!(lru.get("b"), None);
    }

    #[test]
    fn replacing_a_key_promotes_it() {
        let mut lru = LruCache::new(0, None);

        lru.add("a".to_owned(), Value::new(b"1"));
        lru.add("b".to_owned(), Value::new(b"2"));
        lru.add("a".to_owned(), Value::new(b"3"));

        assert_eq!(lru.oldest(), Some("b"));
        assert_eq!(lru.newest(), Some("a"));
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn a_zero_budget_never_evicts() {
        let mut lru = LruCache::new(0, None);

        for index in 0..1000 {
            lru.add(format!("key-{}", index), Value::new(b"0123456789"));
        }

        assert_eq!(lru.len(), 1000);
        assert!(lru.get("key-0").is_some());
    }

    #[test]
    fn an_oversized_entry_is_dropped_immediately() {
        let (evicted, callback) = collector();
        let mut lru = LruCache::new(8, Some(callback));

        lru.add("huge".to_owned(), Value::new(b"0123456789"));

        assert_eq!(lru.len(), 0);
        assert_eq!(lru.used_bytes(), 0);
        assert_eq!(*evicted.lock().unwrap(), vec!["huge".to_owned()]);
    }

    #[test]
    fn remove_oldest_drops_the_eviction_victim() {
        let (evicted, callback) = collector();
        let mut lru = LruCache::new(0, Some(callback));

        lru.add("a".to_owned(), Value::new(b"1"));
        lru.add("b".to_owned(), Value::new(b"2"));
        lru.remove_oldest();

        assert_eq!(lru.get("a"), None);
        assert!(lru.get("b").is_some());
        assert_eq!(*evicted.lock().unwrap(), vec!["a".to_owned()]);

        // Removing from an empty store is a no-op...
        lru.remove_oldest();
        lru.remove_oldest();
        lru.remove_oldest();
        assert_eq!(evicted.lock().unwrap().len(), 2);
    }

    #[test]
    fn clear_notifies_once_per_entry() {
        let (evicted, callback) = collector();
        let mut lru = LruCache::new(0, Some(callback));

        lru.add("a".to_owned(), Value::new(b"1"));
        lru.add("b".to_owned(), Value::new(b"2"));
        lru.add("c".to_owned(), Value::new(b"3"));
        lru.clear();

        assert_eq!(lru.len(), 0);
        assert_eq!(lru.used_bytes(), 0);
        let mut keys = evicted.lock().unwrap().clone();
        keys.sort();
        assert_eq!(keys, vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]);
    }

    #[test]
    fn metrics_are_computed_correctly() {
        let mut lru = LruCache::new(0, None);

        lru.add("a".to_owned(), Value::new(b"1"));
        lru.add("b".to_owned(), Value::new(b"2"));
        assert!(lru.get("a").is_some());
        assert!(lru.get("b").is_some());
        assert!(lru.get("a").is_some());
        assert_eq!(lru.get("missing"), None);

        assert_eq!(lru.writes(), 2);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hit_rate().round() as i32, 75);
    }
}
