//! Provides cache groups - the user facing entry point of the library.
//!
//! A [Group] is a named cache namespace with its own LRU store, its own loader and its own
//! view of the cluster. A lookup via [Group::get] first consults the local store. On a miss,
//! the group enters a coalesced load: if a remote peer owns the key, the value is fetched from
//! there; otherwise (or if the peer fails) the user supplied [Getter] is invoked and the
//! result is placed into the local store.
//!
//! Groups are usually kept in the process wide [Registry] so that a transport serving cache
//! requests can resolve them by name. [new_group] and [get_group] operate on that registry.
//!
//! # Example
//! ```no_run
//! # use std::sync::Arc;
//! # use callisto::group::{new_group, FnGetter};
//! #[tokio::main]
//! async fn main() {
//!     let group = new_group(
//!         "scores",
//!         2048,
//!         Arc::new(FnGetter(|key: &str| -> anyhow::Result<Vec<u8>> {
//!             Ok(format!("score-of-{}", key).into_bytes())
//!         })),
//!     );
//!
//!     let value = group.get("Tom").await.unwrap();
//!     assert_eq!(value.as_string(), "score-of-Tom");
//! }
//! ```
use crate::fmt::format_size;
use crate::lru::SharedCache;
use crate::peers::{PeerGetter, PeerPicker};
use crate::singleflight::SingleFlight;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Loads values from the source of truth on a true cache miss.
///
/// This is the callback every group needs: whenever neither the local store nor a peer can
/// deliver a value, the group asks its getter. Whatever this trait returns for a key is
/// considered the authoritative value and is placed into the local store.
#[async_trait::async_trait]
pub trait Getter: Send + Sync {
    /// Loads the value for the given key.
    ///
    /// Returning an **Err** here aborts the lookup; the error is surfaced to all callers
    /// currently waiting for this key and nothing is cached.
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Lifts a plain function into a [Getter].
///
/// This permits using a closure wherever a getter is required, without defining a new type:
///
/// ```
/// # use callisto::group::FnGetter;
/// let getter = FnGetter(|key: &str| -> anyhow::Result<Vec<u8>> {
///     Ok(key.as_bytes().to_vec())
/// });
/// # let _ = getter;
/// ```
pub struct FnGetter<F>(
    /// The function performing the actual load.
    pub F,
);

#[async_trait::async_trait]
impl<F> Getter for FnGetter<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.0)(key)
    }
}

/// Counts the traffic a group handles.
///
/// All counters are atomics, recording is wait-free and reading never blocks the cache.
#[derive(Default)]
pub struct GroupStats {
    gets: AtomicU64,
    hits: AtomicU64,
    local_loads: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
}

impl GroupStats {
    fn record_get(&self) {
        let _ = self.gets.fetch_add(1, Ordering::Relaxed);
    }

    fn record_hit(&self) {
        let _ = self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_local_load(&self) {
        let _ = self.local_loads.fetch_add(1, Ordering::Relaxed);
    }

    fn record_peer_load(&self) {
        let _ = self.peer_loads.fetch_add(1, Ordering::Relaxed);
    }

    fn record_peer_error(&self) {
        let _ = self.peer_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total number of lookups performed.
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups answered from the local store.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns the number of values loaded via the user supplied getter.
    pub fn local_loads(&self) -> u64 {
        self.local_loads.load(Ordering::Relaxed)
    }

    /// Returns the number of values fetched from remote peers.
    pub fn peer_loads(&self) -> u64 {
        self.peer_loads.load(Ordering::Relaxed)
    }

    /// Returns the number of failed peer fetches (each of which fell back to the local
    /// loader).
    pub fn peer_errors(&self) -> u64 {
        self.peer_errors.load(Ordering::Relaxed)
    }

    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.gets() {
            0 => 0.,
            n => self.hits() as f32 / n as f32 * 100.,
        }
    }
}

/// A named cache namespace with its own store, loader and peer view.
///
/// Groups are created via [new_group] (or [Registry::create]) and are structurally immutable
/// afterwards - only the peer picker may be attached once via [Group::register_peers].
pub struct Group {
    name: String,
    getter: Arc<dyn Getter>,
    main_cache: SharedCache,
    peers: RwLock<Option<Arc<dyn PeerPicker>>>,
    loader: SingleFlight<Value>,
    stats: GroupStats,
}

impl Group {
    /// Creates a standalone group without registering it anywhere.
    ///
    /// **cache_bytes** limits the memory occupied by the local store (**0** meaning
    /// unbounded). Most callers want [new_group] instead, which also makes the group
    /// resolvable by name.
    pub fn new(name: &str, cache_bytes: usize, getter: Arc<dyn Getter>) -> Arc<Group> {
        Arc::new(Group {
            name: name.to_owned(),
            getter,
            main_cache: SharedCache::new(cache_bytes),
            peers: RwLock::new(None),
            loader: SingleFlight::new(),
            stats: GroupStats::default(),
        })
    }

    /// Returns the name under which this group routes across the cluster.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Performs a cached lookup for the given key.
    ///
    /// On a hit, the stored value is returned directly. On a miss, the group coalesces all
    /// concurrent lookups for the key into a single load which either fetches from the peer
    /// owning the key or invokes the user supplied getter. A failed load yields an error and
    /// caches nothing; empty keys are rejected upfront.
    pub async fn get(&self, key: &str) -> anyhow::Result<Value> {
        if key.is_empty() {
            return Err(anyhow::anyhow!("key is empty"));
        }

        self.stats.record_get();

        if let Some(value) = self.main_cache.get(key) {
            log::debug!("[{}] Cache hit for {}...", self.name, key);
            self.stats.record_hit();
            return Ok(value);
        }

        self.load(key).await
    }

    /// Attaches the peer picker which routes misses across the cluster.
    ///
    /// This may be called at most once per group; without a picker, all misses are satisfied
    /// by the local getter.
    ///
    /// # Panics
    /// Panics if a picker has already been registered, as silently swapping the cluster view
    /// of a live group is almost certainly a bug in the embedding application.
    pub fn register_peers(&self, picker: Arc<dyn PeerPicker>) {
        let mut peers = self.peers.write().unwrap();
        if peers.is_some() {
            panic!("register_peers was called twice for group '{}'!", self.name);
        }
        *peers = Some(picker);
    }

    /// Returns the traffic counters of this group.
    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }

    /// Renders a human readable overview of this group for diagnostic commands.
    pub fn report(&self) -> String {
        let mut result = String::new();

        result += format!("{:<20} {:>20}\n", "Name", self.name).as_str();
        result += format!("{:<20} {:>20}\n", "Entries", self.main_cache.len()).as_str();
        result += format!(
            "{:<20} {:>20}\n",
            "Used Memory",
            format_size(self.main_cache.used_bytes())
        )
        .as_str();
        result += format!(
            "{:<20} {:>20}\n",
            "Max Memory",
            format_size(self.main_cache.max_bytes())
        )
        .as_str();
        result += format!("{:<20} {:>20}\n", "Gets", self.stats.gets()).as_str();
        result += format!("{:<20} {:>18.2} %\n", "Hit Rate", self.stats.hit_rate()).as_str();
        result += format!("{:<20} {:>20}\n", "Local Loads", self.stats.local_loads()).as_str();
        result += format!("{:<20} {:>20}\n", "Peer Loads", self.stats.peer_loads()).as_str();
        result += format!("{:<20} {:>20}\n", "Peer Errors", self.stats.peer_errors()).as_str();

        result
    }

    async fn load(&self, key: &str) -> anyhow::Result<Value> {
        let result = self.loader.execute(key, || self.load_uncached(key)).await;

        result.map_err(|error| anyhow::anyhow!(error))
    }

    /// Performs the actual load once per single-flight window.
    ///
    /// If a remote peer owns the key, it is asked first. A peer failure is logged and falls
    /// through to the local loader, so a degraded cluster degrades to origin load instead of
    /// failing lookups.
    async fn load_uncached(&self, key: &str) -> anyhow::Result<Value> {
        if let Some(peer) = self.pick_peer(key) {
            match peer.fetch(&self.name, key).await {
                Ok(bytes) => {
                    self.stats.record_peer_load();
                    // The owning peer caches authoritatively; this node intentionally does
                    // not keep a local copy of remotely owned values.
                    return Ok(Value::from_vec(bytes));
                }
                Err(error) => {
                    self.stats.record_peer_error();
                    log::warn!(
                        "[{}] Fetching {} from its owning peer failed: {}. Falling back to the local loader...",
                        self.name,
                        key,
                        error
                    );
                }
            }
        }

        self.load_locally(key).await
    }

    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let peers = self.peers.read().unwrap();
        peers.as_ref().and_then(|picker| picker.pick(key))
    }

    async fn load_locally(&self, key: &str) -> anyhow::Result<Value> {
        let bytes = self.getter.get(key).await?;
        let value = Value::from_vec(bytes);

        self.stats.record_local_load();
        self.main_cache.add(key, value.clone());

        Ok(value)
    }
}

/// Keeps track of all groups of a process by name.
///
/// The process wide instance behind [new_group] and [get_group] is what a transport uses to
/// resolve incoming cache requests. Embedding applications which prefer dependency injection
/// over globals can create and pass around their own registry.
pub struct Registry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Registry {
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a group and registers it under its name.
    ///
    /// Registering a second group under an existing name replaces the previous one
    /// (last-writer-wins); lookups by name always observe the latest registration.
    pub fn create(&self, name: &str, cache_bytes: usize, getter: Arc<dyn Getter>) -> Arc<Group> {
        let group = Group::new(name, cache_bytes, getter);

        let mut groups = self.groups.write().unwrap();
        if groups.insert(name.to_owned(), group.clone()).is_some() {
            log::info!("Replacing previously registered cache group {}...", name);
        }

        group
    }

    /// Resolves a group by name.
    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        let groups = self.groups.read().unwrap();
        groups.get(name).cloned()
    }

    #[cfg(test)]
    pub(crate) fn clear(&self) {
        self.groups.write().unwrap().clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    static ref GROUPS: Registry = Registry::new();
}

/// Creates a group in the process wide registry.
///
/// See [Registry::create] for the semantics; notably, re-using a name replaces the previous
/// group.
pub fn new_group(name: &str, cache_bytes: usize, getter: Arc<dyn Getter>) -> Arc<Group> {
    GROUPS.create(name, cache_bytes, getter)
}

/// Resolves a group from the process wide registry.
pub fn get_group(name: &str) -> Option<Arc<Group>> {
    GROUPS.get(name)
}

#[cfg(test)]
pub(crate) fn reset_registry() {
    GROUPS.clear();
}
