//! Defines the contracts which connect cache groups to the cluster transport.
//!
//! A group never talks to the network itself. It asks a [PeerPicker] whether a remote peer
//! owns a given key and, if so, fetches the value through the returned [PeerGetter]. The
//! transport (see [http](crate::http) for the built-in one) implements both traits; anything
//! speaking another protocol can be plugged in the same way.
use std::sync::Arc;

/// Selects the peer owning a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the getter for the remote peer owning the given key.
    ///
    /// Returning **None** means "no remote owner applies, load locally". Implementations must
    /// never return a getter which identifies the local node - self detection is their
    /// responsibility, the group has no notion of peer identity.
    fn pick(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Fetches a cached value from a single remote peer.
#[async_trait::async_trait]
pub trait PeerGetter: Send + Sync {
    /// Fetches the value for the given key from the given group on the remote peer.
    ///
    /// Implementations must be safe to call from any number of tasks concurrently.
    async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>>;
}
