//! Callisto is a library for building distributed in-process caches.
//!
//! # Introduction
//! **Callisto** provides named cache *groups* which store immutable byte values under string
//! keys. Each group is fronted by a memory bounded LRU store. On a cache miss, the group either
//! asks the cluster peer owning the key (as determined by a consistent-hash ring) or invokes a
//! user supplied loader which fetches the value from the source of truth. Concurrent misses for
//! the same key are collapsed into a single backend call, so that neither a database nor a peer
//! is ever hit twice for the same hot key at the same time.
//!
//! Being an in-process cache, Callisto keeps all data in the memory of the embedding
//! application. There is no persistence, no replication and no cache coherence across
//! processes: a value lives on the node which the ring assigns it to, plus transiently on
//! whichever node loaded it locally. This keeps the hot path free of any coordination.
//!
//! # Features
//! * **Memory bounded LRU caches** - each group accounts the bytes occupied by its keys and
//!   values and evicts the least recently used entries once the configured budget is exceeded.
//! * **Consistent-hash peer routing** - keys are mapped onto cluster peers via a replicated
//!   hash ring, so that adding or removing a peer only re-routes a small fraction of the key
//!   space. See [ring](crate::ring).
//! * **Request coalescing** - concurrent lookups for the same missing key share a single load.
//!   See [singleflight](crate::singleflight).
//! * **100% Async/Await** - loading and peer fetching build upon [tokio](https://tokio.rs/)
//!   and async/await primitives as provided by Rust.
//! * **Pluggable transport** - the group only talks to the cluster through two small traits
//!   ([PeerPicker](crate::peers::PeerPicker) and [PeerGetter](crate::peers::PeerGetter)). An
//!   HTTP implementation based on [hyper](https://hyper.rs/) is provided in
//!   [http](crate::http).
//!
//! # Modules
//! * **lru**: The size constrained LRU store and its thread-safe wrapper. See [crate::lru].
//! * **ring**: The consistent-hash ring used to determine key ownership. See [crate::ring].
//! * **singleflight**: The concurrent-call coalescer. See [crate::singleflight].
//! * **group**: The user facing cache groups and their registry. See [crate::group].
//! * **http**: The HTTP peer pool implementing the peer contracts. See [crate::http].
//!
//! # Example
//! ```no_run
//! # use std::sync::Arc;
//! # use callisto::group::{new_group, FnGetter};
//! #[tokio::main]
//! async fn main() {
//!     // Create a group which loads missing entries from the source of truth...
//!     let group = new_group(
//!         "users",
//!         64 * 1024 * 1024,
//!         Arc::new(FnGetter(|key: &str| -> anyhow::Result<Vec<u8>> {
//!             Ok(format!("user-record-of-{}", key).into_bytes())
//!         })),
//!     );
//!
//!     // ...and perform cached lookups against it.
//!     let value = group.get("42").await.unwrap();
//!     assert_eq!(value.as_string(), "user-record-of-42");
//! }
//! ```
#![deny(
    warnings,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod fmt;
pub mod group;
pub mod http;
pub mod lru;
pub mod peers;
pub mod ring;
pub mod singleflight;
pub mod value;

/// Initializes the logging system.
///
/// This sets up **simplelog** to log to stdout with RFC 3339 timestamps, which is all that is
/// needed when running inside a container. Repeated calls are a no-op, so tests and embedding
/// applications may call this freely. Applications which bring their own logger should simply
/// not call this function.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    INIT_LOGGING.call_once(|| {
        let config = ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_target_level(LevelFilter::Error)
            .build();

        if let Err(error) = SimpleLogger::init(LevelFilter::Debug, config) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn logging_initializes_once_and_stays_idempotent() {
        crate::init_logging();
        // A second call must not attempt to install another logger...
        crate::init_logging();

        // ...and the installed logger is live.
        assert!(log::log_enabled!(log::Level::Debug));
        log::debug!("Logging is up...");
    }
}
