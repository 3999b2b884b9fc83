//! Provides the consistent-hash ring which maps keys onto cluster peers.
//!
//! Each real peer is represented by a configurable number of virtual nodes on the ring, so
//! that keys spread evenly and adding or removing a peer only re-routes a small fraction of
//! the key space. Given the same peer set, replica count and hash function, every node of a
//! cluster computes the exact same ownership - there is no coordination involved.
use fnv::FnvHashMap;

/// Maps a byte sequence onto a position of the ring.
pub type HashFn = fn(&[u8]) -> u32;

/// Provides a consistent-hash ring with virtual node replication.
///
/// The ring is built once from the known peer set and is immutable afterwards. When the peer
/// set changes, the owning pool simply builds a fresh ring and swaps it in wholesale.
///
/// # Examples
/// ```
/// # use callisto::ring::HashRing;
/// let mut ring = HashRing::new(50);
/// ring.add(&["http://10.0.0.1:8008", "http://10.0.0.2:8008"]);
///
/// // Ownership is deterministic: the same key always maps to the same peer...
/// assert_eq!(ring.get("some-key"), ring.get("some-key"));
/// ```
pub struct HashRing {
    replicas: usize,
    hash: HashFn,
    vnodes: Vec<u32>,
    owners: FnvHashMap<u32, String>,
}

impl HashRing {
    /// Creates an empty ring placing **replicas** virtual nodes per peer, hashing with
    /// CRC32-IEEE.
    pub fn new(replicas: usize) -> Self {
        Self::with_hash(replicas, crc32fast::hash)
    }

    /// Creates an empty ring using the given hash function.
    ///
    /// This is mainly useful for tests which want a predictable key distribution.
    pub fn with_hash(replicas: usize, hash: HashFn) -> Self {
        HashRing {
            replicas,
            hash,
            vnodes: Vec::new(),
            owners: FnvHashMap::default(),
        }
    }

    /// Adds the given peers to the ring.
    ///
    /// For each peer, one virtual node is placed per replica by hashing the replica index
    /// (rendered as a decimal number) followed by the peer identifier. Should two virtual
    /// nodes collide on the same hash, the peer added last owns the slot on every node which
    /// builds the ring in the same order.
    pub fn add<S: AsRef<str>>(&mut self, peers: &[S]) {
        for peer in peers {
            let peer = peer.as_ref();
            for index in 0..self.replicas {
                let vnode = (self.hash)(format!("{}{}", index, peer).as_bytes());
                self.vnodes.push(vnode);
                let _ = self.owners.insert(vnode, peer.to_owned());
            }
        }

        self.vnodes.sort_unstable();
    }

    /// Returns the peer owning the given key or **None** if the ring is empty.
    ///
    /// The key is hashed onto the ring and assigned to the first virtual node at or after its
    /// position, wrapping around at the end of the ring.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.vnodes.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let index = self.vnodes.partition_point(|vnode| *vnode < hash) % self.vnodes.len();

        self.owners
            .get(&self.vnodes[index])
            .map(|peer| peer.as_str())
    }

    /// Determines if no peer has been added yet.
    pub fn is_empty(&self) -> bool {
        self.vnodes.is_empty()
    }

    /// Returns the number of virtual nodes currently placed on the ring.
    pub fn vnodes(&self) -> usize {
        self.vnodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::HashRing;

    /// Interprets keys as decimal numbers so that the placement of all virtual nodes is
    /// known upfront.
    fn decimal_hash(data: &[u8]) -> u32 {
        std::str::from_utf8(data).unwrap().parse().unwrap()
    }

    #[test]
    fn an_empty_ring_owns_nothing() {
        let ring = HashRing::new(50);

        assert!(ring.is_empty());
        assert_eq!(ring.get("anything"), None);
    }

    #[test]
    fn a_single_peer_owns_every_key() {
        let mut ring = HashRing::new(50);
        ring.add(&["http://10.0.0.1:8008"]);

        for key in &["a", "b", "c", "zcache", "42", ""] {
            assert_eq!(ring.get(key), Some("http://10.0.0.1:8008"));
        }
    }

    #[test]
    fn lookups_are_deterministic() {
        let mut first = HashRing::new(3);
        first.add(&["alpha", "beta", "gamma"]);

        let mut second = HashRing::new(3);
        second.add(&["alpha", "beta", "gamma"]);

        for index in 0..100 {
            let key = format!("key-{}", index);
            assert_eq!(first.get(&key), second.get(&key));
            assert!(first.get(&key).is_some());
        }
    }

    #[test]
    fn keys_map_onto_the_next_virtual_node_clockwise() {
        let mut ring = HashRing::with_hash(3, decimal_hash);

        // With the decimal hash, the peers "6", "4" and "2" yield the virtual nodes
        // 2, 4, 6, 12, 14, 16, 22, 24 and 26...
        ring.add(&["6", "4", "2"]);
        assert_eq!(ring.vnodes(), 9);

        assert_eq!(ring.get("2"), Some("2"));
        assert_eq!(ring.get("11"), Some("2"));
        assert_eq!(ring.get("23"), Some("4"));
        // ...and 27 lies past the last virtual node, so it wraps around to the first one.
        assert_eq!(ring.get("27"), Some("2"));
    }

    #[test]
    fn added_peers_take_over_their_share() {
        let mut ring = HashRing::with_hash(1, decimal_hash);
        ring.add(&["10", "30"]);

        assert_eq!(ring.get("25"), Some("30"));

        // A peer whose virtual node lies between 10 and 30 claims the keys in between...
        ring.add(&["27"]);
        assert_eq!(ring.get("25"), Some("27"));
        // ...while everything else stays put.
        assert_eq!(ring.get("5"), Some("10"));
        assert_eq!(ring.get("29"), Some("30"));
    }
}
