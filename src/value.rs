//! Provides the immutable byte value stored in and returned by cache groups.
//!
//! A [Value] is a read-only view on a chunk of bytes. Within the library, values are shared
//! cheaply (cloning a value only bumps a reference count), which permits the LRU store and a
//! returning caller to refer to the same buffer without copying. Everything which leaves the
//! library as a raw byte buffer is a defensive copy, so that no caller can ever mutate a
//! cached value behind the back of the cache.
use crate::lru::ByteSize;
use bytes::Bytes;

/// An immutable byte value as stored in a cache group.
///
/// # Examples
/// ```
/// # use callisto::value::Value;
/// let value = Value::new(b"hello");
/// assert_eq!(value.len(), 5);
/// assert_eq!(value.as_string(), "hello");
///
/// // Exported buffers are copies and therefore independent of each other...
/// let first = value.to_vec();
/// let second = value.to_vec();
/// assert_eq!(first, second);
/// assert_ne!(first.as_ptr(), second.as_ptr());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Value {
    data: Bytes,
}

impl Value {
    /// Creates a value by copying the given bytes.
    pub fn new(data: &[u8]) -> Self {
        Value {
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Creates a value by taking ownership of the given buffer.
    ///
    /// As ownership is transferred, no copy is required to guarantee immutability.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Value {
            data: Bytes::from(data),
        }
    }

    /// Returns the size of the value in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if the value is empty.
    ///
    /// Note that empty values are perfectly legal cache contents (a loader may well yield an
    /// empty record).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a read-only view on the underlying bytes.
    ///
    /// This does not copy and must therefore stay within the process. Use [Value::to_vec] when
    /// handing data to a caller which might mutate it.
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Exports the value as a fresh, independent buffer.
    ///
    /// Each call allocates a new copy so that no caller can alias the internal buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Renders the value as a string for diagnostic purposes.
    ///
    /// Invalid UTF-8 sequences are replaced, as cached values are arbitrary bytes.
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(self.data.as_ref()).into_owned()
    }
}

impl ByteSize for Value {
    fn allocated_size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.data.as_ref()))
    }
}
