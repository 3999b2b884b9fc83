//! Provides a size constrained LRU store.
//!
//! An LRU store drops the least recently used entry if it is about to grow beyond the given
//! memory limit. The store is generic over all value types for which the [ByteSize](ByteSize)
//! trait is implemented, so that the occupied memory can be accounted per entry.
//!
//! [LruCache](LruCache) is the single threaded core. [SharedCache](SharedCache) wraps it in a
//! mutex and constructs it lazily, which is the form used by cache groups.
mod lru_cache;
mod shared;

pub use lru_cache::ByteSize;
pub use lru_cache::EvictionCallback;
pub use lru_cache::LruCache;
pub use shared::SharedCache;
