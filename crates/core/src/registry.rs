use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use log::info;
use parking_lot::RwLock;

use crate::error::{ManagerError, ManagerResult};
use crate::ids::alloc_id;

/// Identity of a registered storage replica (spec §3 `ServerNode`).
#[derive(Debug, Clone)]
pub struct ServerNode {
    pub id: u32,
    pub host: String,
    pub port: String,
    pub token: String,
}

impl ServerNode {
    /// The wire address: `host` concatenated with `port`, no separator --
    /// this is part of the tested wire contract (spec §3, scenario S3).
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.host, self.port)
    }
}

/// `client_id -> endpoint` binding (spec §3 `ClientBinding`).
pub type ClientBinding = String;

/// Node Registry (C1) + Client Registry (C2) + the derived EndpointSet,
/// bundled the way the source keeps `servermap`/`clientmap`/`APImap` side by
/// side on one service object. Guarded by `parking_lot::RwLock`, matching
/// `turn-balance/server/src/cluster.rs`'s `Cluster(Mutex<AHashMap<..>>)` and
/// `crates/service/src/session/mod.rs`'s `Table<K, V>`.
pub struct Registries {
    nodes: RwLock<HashMap<u32, ServerNode>>,
    endpoints: RwLock<HashSet<String>>,
    clients: RwLock<HashMap<u32, ClientBinding>>,
}

impl Registries {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            endpoints: RwLock::new(HashSet::new()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    // ---- C1: Node Registry ----

    /// Registers a new storage node, allocating a fresh id. Fails with
    /// `DuplicateEndpoint` if `host+port` is already registered, and with
    /// `IdExhausted` if no free id could be sampled.
    pub fn online(&self, host: String, port: String, token: String) -> ManagerResult<u32> {
        let mut nodes = self.nodes.write();
        let mut endpoints = self.endpoints.write();

        let endpoint = format!("{host}{port}");
        if endpoints.contains(&endpoint) {
            return Err(ManagerError::DuplicateEndpoint);
        }

        let id = alloc_id(&nodes).ok_or(ManagerError::IdExhausted)?;
        endpoints.insert(endpoint.clone());
        nodes.insert(
            id,
            ServerNode {
                id,
                host,
                port,
                token,
            },
        );

        info!("storage node {endpoint} registered, assigned id {id}");
        Ok(id)
    }

    /// Removes a storage node. Fails with `UnknownNode` if no such id is
    /// registered, `Unauthorized` if the token does not match. A caller that
    /// wants "missing node is not fatal" (the liveness checker) should use
    /// [`Registries::evict`] instead.
    pub fn offline(&self, server_id: u32, token: &str) -> ManagerResult<()> {
        let mut nodes = self.nodes.write();
        let node = nodes.get(&server_id).ok_or(ManagerError::UnknownNode)?;
        if node.token != token {
            return Err(ManagerError::Unauthorized);
        }

        let endpoint = node.endpoint();
        nodes.remove(&server_id);
        self.endpoints.write().remove(&endpoint);
        info!("storage node {server_id} ({endpoint}) deregistered");
        Ok(())
    }

    /// Removes a storage node without a token check, as performed by the
    /// liveness checker (spec invariant 5: observationally equivalent to a
    /// nested `offline`). Returns `true` if a node was actually removed.
    pub fn evict(&self, server_id: u32) -> bool {
        let mut nodes = self.nodes.write();
        if let Some(node) = nodes.remove(&server_id) {
            self.endpoints.write().remove(&node.endpoint());
            true
        } else {
            false
        }
    }

    pub fn contains_node(&self, server_id: u32) -> bool {
        self.nodes.read().contains_key(&server_id)
    }

    /// Snapshot of every registered node, used by the coordinator and
    /// reconciler to fan out. Returned as an owned `Vec` so callers never
    /// hold the registry lock across an `.await`.
    pub fn all_nodes(&self) -> Vec<ServerNode> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    // ---- derived EndpointSet ----

    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.read().iter().cloned().collect()
    }

    pub fn has_endpoint(&self, endpoint: &str) -> bool {
        self.endpoints.read().contains(endpoint)
    }

    // ---- C2: Client Registry ----

    /// Binds a fresh client id to `endpoint`. Caller (C4) has already
    /// picked `endpoint` from the EndpointSet.
    pub fn connect(&self, endpoint: String) -> ManagerResult<u32> {
        let mut clients = self.clients.write();
        let id = alloc_id(&clients).ok_or(ManagerError::IdExhausted)?;
        clients.insert(id, endpoint.clone());
        info!("client connected to {endpoint}, assigned id {id}");
        Ok(id)
    }

    /// Idempotent: removing an unknown id is not an error.
    pub fn disconnect(&self, client_id: u32) {
        self.clients.write().remove(&client_id);
        info!("client {client_id} disconnected");
    }

    pub fn rebind(&self, client_id: u32, endpoint: String) {
        self.clients.write().insert(client_id, endpoint.clone());
        info!("client {client_id} rebound to {endpoint}");
    }

    pub fn client_endpoint(&self, client_id: u32) -> Option<String> {
        self.clients.read().get(&client_id).cloned()
    }
}
