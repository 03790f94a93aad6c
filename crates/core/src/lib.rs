//! Node registry, two-phase coordinator, and read reconciler for the
//! key-value store Manager: everything the RPC surface needs that isn't
//! wire plumbing.

pub mod assign;
pub mod coordinator;
pub mod error;
pub mod ids;
pub mod liveness;
pub mod peer;
pub mod reconcile;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

pub use coordinator::{MutationLock, Op, TwoPhaseCoordinator};
pub use error::{ManagerError, ManagerResult};
pub use liveness::LivenessChecker;
pub use peer::{GrpcPeerDialer, PeerDialer, StorageNodePeer};
pub use registry::{ClientBinding, Registries, ServerNode};

/// Tunables that govern rounds and probes, all with the defaults pinned in
/// the configuration surface.
#[derive(Debug, Clone)]
pub struct ManagerTuning {
    pub peer_timeout: Duration,
    pub liveness_period: Duration,
    pub liveness_timeout: Duration,
}

impl Default for ManagerTuning {
    fn default() -> Self {
        Self {
            peer_timeout: Duration::from_secs(1),
            liveness_period: Duration::from_secs(5),
            liveness_timeout: Duration::from_secs(1),
        }
    }
}

/// Everything the RPC handlers in the binary crate need, bundled behind one
/// handle: the registries, the coordinator, and the dialer used to reach
/// storage nodes. A single `ManagerState` is shared (via `Arc`) across every
/// connection the gRPC server accepts.
pub struct ManagerState {
    pub registries: Arc<Registries>,
    pub coordinator: TwoPhaseCoordinator,
    pub dialer: Arc<dyn PeerDialer>,
    pub mutation_lock: MutationLock,
    pub tuning: ManagerTuning,
}

impl ManagerState {
    pub fn new(dialer: Arc<dyn PeerDialer>, tuning: ManagerTuning) -> Self {
        let mutation_lock = coordinator::new_mutation_lock();
        Self {
            registries: Arc::new(Registries::new()),
            coordinator: TwoPhaseCoordinator::new(mutation_lock.clone()),
            dialer,
            mutation_lock,
            tuning,
        }
    }

    /// Builds the liveness checker bound to this state's registries, dialer,
    /// and mutation lock. Call `.spawn()` on the result to start the sweep.
    pub fn liveness_checker(&self) -> LivenessChecker {
        LivenessChecker::new(
            self.registries.clone(),
            self.dialer.clone(),
            self.mutation_lock.clone(),
            self.tuning.liveness_period,
            self.tuning.liveness_timeout,
        )
    }

    pub async fn put(&self, initiator_id: u32, key: String, value: String) -> ManagerResult<()> {
        self.coordinator
            .run(
                &self.registries,
                self.dialer.as_ref(),
                initiator_id,
                Op::Put { key, value },
                self.tuning.peer_timeout,
            )
            .await
    }

    pub async fn del(&self, initiator_id: u32, key: String) -> ManagerResult<()> {
        self.coordinator
            .run(
                &self.registries,
                self.dialer.as_ref(),
                initiator_id,
                Op::Del { key },
                self.tuning.peer_timeout,
            )
            .await
    }

    pub async fn get(&self, requester_id: u32, key: &str) -> ManagerResult<String> {
        reconcile::reconcile_read(
            &self.registries,
            self.dialer.as_ref(),
            requester_id,
            key,
            self.tuning.peer_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as PMutex;
    use std::collections::HashMap;
    use tonic::Status;

    #[derive(Default)]
    struct Store {
        committed: HashMap<String, String>,
        staged: HashMap<String, String>,
    }

    struct InMemoryPeer {
        store: Arc<PMutex<Store>>,
    }

    #[async_trait]
    impl StorageNodePeer for InMemoryPeer {
        async fn get_data(&self, key: &str) -> Result<Option<String>, Status> {
            Ok(self.store.lock().committed.get(key).cloned())
        }
        async fn prepare_put(&self, key: &str, value: &str) -> Result<bool, Status> {
            self.store
                .lock()
                .staged
                .insert(key.to_string(), value.to_string());
            Ok(true)
        }
        async fn prepare_del(&self, _key: &str) -> Result<bool, Status> {
            Ok(true)
        }
        async fn commit(&self, key: &str, delete: bool) -> Result<(), Status> {
            let mut store = self.store.lock();
            if delete {
                store.committed.remove(key);
            } else if let Some(value) = store.staged.remove(key) {
                store.committed.insert(key.to_string(), value);
            }
            Ok(())
        }
        async fn abort(&self, key: &str, _delete: bool) -> Result<(), Status> {
            self.store.lock().staged.remove(key);
            Ok(())
        }
    }

    struct InMemoryDialer {
        stores: PMutex<HashMap<String, Arc<PMutex<Store>>>>,
    }

    impl InMemoryDialer {
        fn new() -> Self {
            Self {
                stores: PMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl PeerDialer for InMemoryDialer {
        async fn dial(&self, endpoint: &str) -> Result<Box<dyn StorageNodePeer>, Status> {
            let mut stores = self.stores.lock();
            let store = stores
                .entry(endpoint.to_string())
                .or_insert_with(|| Arc::new(PMutex::new(Store::default())))
                .clone();
            Ok(Box::new(InMemoryPeer { store }))
        }
    }

    #[tokio::test]
    async fn put_then_reconciled_get_round_trips() {
        let dialer: Arc<dyn PeerDialer> = Arc::new(InMemoryDialer::new());
        let state = ManagerState::new(dialer.clone(), ManagerTuning::default());
        let a = state
            .registries
            .online("a".into(), String::new(), "t".into())
            .unwrap();
        let b = state
            .registries
            .online("b".into(), String::new(), "t".into())
            .unwrap();

        state.put(a, "k".into(), "v".into()).await.unwrap();

        let value = state.get(b, "k").await.unwrap();
        assert_eq!(value, "v");
    }

    #[tokio::test]
    async fn unregistered_node_cannot_initiate_mutation() {
        let dialer: Arc<dyn PeerDialer> = Arc::new(InMemoryDialer::new());
        let state = ManagerState::new(dialer, ManagerTuning::default());

        let err = state.put(42, "k".into(), "v".into()).await.unwrap_err();
        assert_eq!(err, ManagerError::UnregisteredNode);
    }

    #[tokio::test]
    async fn get_on_empty_cluster_reports_absent() {
        let dialer: Arc<dyn PeerDialer> = Arc::new(InMemoryDialer::new());
        let state = ManagerState::new(dialer, ManagerTuning::default());
        let a = state
            .registries
            .online("a".into(), String::new(), "t".into())
            .unwrap();

        let err = state.get(a, "missing").await.unwrap_err();
        assert_eq!(err, ManagerError::KeyAbsent("missing".to_string()));
    }

    #[tokio::test]
    async fn unregistered_node_cannot_get() {
        let dialer: Arc<dyn PeerDialer> = Arc::new(InMemoryDialer::new());
        let state = ManagerState::new(dialer, ManagerTuning::default());

        let err = state.get(42, "k").await.unwrap_err();
        assert_eq!(err, ManagerError::UnregisteredNode);
    }
}
