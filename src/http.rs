//! Provides the HTTP transport connecting the cache nodes of a cluster.
//!
//! Every node runs an [HttpPool] which plays both sides of the peer protocol: it serves the
//! values this node owns via [HttpPool::serve] and it implements
//! [PeerPicker](crate::peers::PeerPicker) so that local groups can route misses to their
//! owning peers.
//!
//! On the wire, a request for a value is a plain `GET <peer><base>/<group>/<key>` with both
//! path segments percent-escaped; the base path defaults to `/zcache`. A 200 response carries
//! the raw value bytes without any framing, every other status is treated as an error by the
//! fetching side.
//!
//! Peers are identified by their base URL (e.g. `http://10.0.0.2:8008`). The pool has no
//! notion of membership: [HttpPool::set_peers] is invoked with the full peer list whenever
//! the cluster topology changes, and rebuilds ring and client set wholesale. The snapshot is
//! swapped atomically, so concurrent picks always observe a consistent ring.
use crate::group::get_group;
use crate::peers::{PeerGetter, PeerPicker};
use crate::ring::HashRing;
use anyhow::Context;
use arc_swap::ArcSwap;
use hyper::client::HttpConnector;
use hyper::header::HeaderValue;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Client, Request, Response, StatusCode, Uri};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// The default path prefix under which cache values are served.
pub const DEFAULT_BASE_PATH: &str = "/zcache";

/// The default number of virtual nodes placed on the ring per peer.
pub const DEFAULT_REPLICAS: usize = 50;

/// The consistent view a pool has of its cluster.
///
/// Ring and clients always belong together - they are built from the same peer list and are
/// therefore kept in one snapshot which is replaced as a whole.
struct PoolState {
    ring: HashRing,
    getters: HashMap<String, Arc<HttpPeer>>,
}

impl PoolState {
    fn empty() -> Self {
        PoolState {
            ring: HashRing::new(DEFAULT_REPLICAS),
            getters: HashMap::new(),
        }
    }
}

/// Connects the local cache groups to an HTTP cluster.
///
/// # Examples
/// ```no_run
/// # use std::sync::Arc;
/// # use callisto::group::{new_group, FnGetter};
/// # use callisto::http::HttpPool;
/// #[tokio::main]
/// async fn main() {
///     let group = new_group(
///         "users",
///         64 * 1024 * 1024,
///         Arc::new(FnGetter(|key: &str| -> anyhow::Result<Vec<u8>> {
///             Ok(key.as_bytes().to_vec())
///         })),
///     );
///
///     // Wire the group into the cluster...
///     let pool = HttpPool::new("http://10.0.0.1:8008");
///     pool.set_peers(&[
///         "http://10.0.0.1:8008",
///         "http://10.0.0.2:8008",
///         "http://10.0.0.3:8008",
///     ]);
///     group.register_peers(pool.clone());
///
///     // ...and serve the keys this node owns to the other peers.
///     pool.serve("0.0.0.0:8008".parse().unwrap()).await.unwrap();
/// }
/// ```
pub struct HttpPool {
    self_address: String,
    base_path: String,
    state: ArcSwap<PoolState>,
}

impl HttpPool {
    /// Creates a pool for the node reachable under the given base URL.
    ///
    /// The address must match the entry for this node in the peer lists passed to
    /// [set_peers](HttpPool::set_peers), as it is how the pool recognizes itself on the ring.
    pub fn new(self_address: &str) -> Arc<HttpPool> {
        Self::with_base_path(self_address, DEFAULT_BASE_PATH)
    }

    /// Creates a pool serving and fetching under a custom path prefix.
    pub fn with_base_path(self_address: &str, base_path: &str) -> Arc<HttpPool> {
        Arc::new(HttpPool {
            self_address: self_address.to_owned(),
            base_path: base_path.to_owned(),
            state: ArcSwap::from_pointee(PoolState::empty()),
        })
    }

    /// Installs the given peer list, replacing the previous cluster view.
    ///
    /// This rebuilds the hash ring and the per-peer HTTP clients from scratch and swaps the
    /// snapshot in atomically - in-flight picks either see the old or the new cluster, never
    /// a mix.
    pub fn set_peers<S: AsRef<str>>(&self, peers: &[S]) {
        let mut ring = HashRing::new(DEFAULT_REPLICAS);
        ring.add(peers);

        let mut getters = HashMap::new();
        for peer in peers {
            let peer = peer.as_ref();
            let _ = getters.insert(
                peer.to_owned(),
                Arc::new(HttpPeer::new(format!("{}{}", peer, self.base_path))),
            );
        }

        log::info!(
            "[{}] Installing a cluster view with {} peer(s)...",
            self.self_address,
            getters.len()
        );
        self.state.store(Arc::new(PoolState { ring, getters }));
    }

    /// Answers a single request of the peer protocol.
    ///
    /// The request path must have the form `<base>/<group>/<key>`. A malformed path yields a
    /// 400, an unknown group a 404 and a failed load a 500. Otherwise the raw bytes of the
    /// value are returned.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let path = request.uri().path().to_owned();
        if !path.starts_with(self.base_path.as_str()) {
            return error_response(StatusCode::BAD_REQUEST, "bad request");
        }

        log::debug!("[{}] {} {}...", self.self_address, request.method(), path);

        let parts: Vec<&str> = path[self.base_path.len()..]
            .trim_start_matches('/')
            .split('/')
            .collect();
        if parts.len() != 2 || parts[0].is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "bad request");
        }

        let group_name = match percent_decode_str(parts[0]).decode_utf8() {
            Ok(group_name) => group_name.into_owned(),
            Err(_) => return error_response(StatusCode::BAD_REQUEST, "bad request"),
        };
        let key = match percent_decode_str(parts[1]).decode_utf8() {
            Ok(key) => key.into_owned(),
            Err(_) => return error_response(StatusCode::BAD_REQUEST, "bad request"),
        };

        let group = match get_group(&group_name) {
            Some(group) => group,
            None => {
                return error_response(
                    StatusCode::NOT_FOUND,
                    &format!("no such group: {}", group_name),
                )
            }
        };

        match group.get(&key).await {
            Ok(value) => {
                let mut response = Response::new(Body::from(value.to_vec()));
                let _ = response.headers_mut().insert(
                    hyper::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
                response
            }
            Err(error) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string()),
        }
    }

    /// Serves the peer protocol on the given address until the server fails.
    ///
    /// This is typically spawned as its own task next to the event loop of the embedding
    /// application.
    pub async fn serve(self: Arc<Self>, address: SocketAddr) -> anyhow::Result<()> {
        let pool = self.clone();
        let service = make_service_fn(move |_conn| {
            let pool = pool.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    let pool = pool.clone();
                    async move { Ok::<_, Infallible>(pool.handle(request).await) }
                }))
            }
        });

        log::info!(
            "[{}] Serving cache requests on {}...",
            self.self_address,
            address
        );
        hyper::server::Server::bind(&address)
            .serve(service)
            .await
            .context("The cache HTTP endpoint terminated abnormally.")
    }
}

impl PeerPicker for HttpPool {
    fn pick(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.state.load();
        match state.ring.get(key) {
            Some(peer) if peer != self.self_address => {
                log::debug!("[{}] Routing {} to peer {}...", self.self_address, key, peer);
                match state.getters.get(peer) {
                    Some(getter) => {
                        let getter: Arc<dyn PeerGetter> = getter.clone();
                        Some(getter)
                    }
                    None => None,
                }
            }
            _ => None,
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_owned()));
    *response.status_mut() = status;

    response
}

/// Fetches values from a single remote peer via HTTP.
pub struct HttpPeer {
    base_url: String,
    client: Client<HttpConnector>,
}

impl HttpPeer {
    /// Creates a getter fetching from the given base URL (peer address plus base path).
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpPeer {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl PeerGetter for HttpPeer {
    async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        let uri = format!(
            "{}/{}/{}",
            self.base_url,
            utf8_percent_encode(group, NON_ALPHANUMERIC),
            utf8_percent_encode(key, NON_ALPHANUMERIC)
        )
        .parse::<Uri>()
        .context("Failed to assemble the peer URI.")?;

        let response = self
            .client
            .get(uri)
            .await
            .context("Failed to reach the peer.")?;

        if response.status() != StatusCode::OK {
            return Err(anyhow::anyhow!(
                "The peer responded with status {}.",
                response.status()
            ));
        }

        let body = hyper::body::to_bytes(response.into_body())
            .await
            .context("Failed to read the peer response.")?;

        Ok(body.to_vec())
    }
}
