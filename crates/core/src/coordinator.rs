use std::sync::Arc;
use std::time::Duration;

use ahash::HashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use log::info;
use tokio::sync::Mutex;

use crate::error::{ManagerError, ManagerResult};
use crate::peer::PeerDialer;
use crate::registry::Registries;

/// The two mutation kinds the coordinator runs a round for (spec §4.6).
#[derive(Debug, Clone)]
pub enum Op {
    Put { key: String, value: String },
    Del { key: String },
}

impl Op {
    fn key(&self) -> &str {
        match self {
            Op::Put { key, .. } => key,
            Op::Del { key } => key,
        }
    }

    fn is_delete(&self) -> bool {
        matches!(self, Op::Del { .. })
    }

    fn refused_error(&self) -> ManagerError {
        match self {
            Op::Put { .. } => ManagerError::PrepareRefused,
            Op::Del { .. } => ManagerError::DeleteRefused,
        }
    }
}

/// The single Manager-wide mutation lock (spec §5 invariant 4): held across
/// an entire Put/Del round by [`TwoPhaseCoordinator::run`], and across every
/// eviction by the liveness checker, so the two never interleave.
pub type MutationLock = Arc<Mutex<()>>;

pub fn new_mutation_lock() -> MutationLock {
    Arc::new(Mutex::new(()))
}

/// C6: serializes every `Put`/`Del` round behind one Manager-wide mutation
/// lock (spec §5 invariant 4), so no two mutation rounds -- for any key --
/// are ever in flight together.
pub struct TwoPhaseCoordinator {
    mutation_lock: MutationLock,
}

impl TwoPhaseCoordinator {
    pub fn new(mutation_lock: MutationLock) -> Self {
        Self { mutation_lock }
    }

    /// Runs one full `Authorizing -> Preparing -> (Committing | Aborting) ->
    /// Done` round for `op`, initiated by `initiator_id`. Holds the mutation
    /// lock for the entire round, matching the source's
    /// `self.mu.acquire()/release()` span around prepare+commit/abort.
    pub async fn run(
        &self,
        registries: &Registries,
        dialer: &dyn PeerDialer,
        initiator_id: u32,
        op: Op,
        peer_timeout: Duration,
    ) -> ManagerResult<()> {
        if !registries.contains_node(initiator_id) {
            return Err(ManagerError::UnregisteredNode);
        }

        let _guard = self.mutation_lock.lock().await;

        let nodes = registries.all_nodes();
        info!(
            "server {initiator_id} broadcasting {} for key={} to {} nodes",
            if op.is_delete() { "delete" } else { "put" },
            op.key(),
            nodes.len()
        );

        let mut prepares = FuturesUnordered::new();
        for node in &nodes {
            let endpoint = node.endpoint();
            let sid = node.id;
            let op = op.clone();
            prepares.push(async move {
                let attempt = async {
                    let peer = dialer.dial(&endpoint).await.map_err(|_| ())?;
                    match &op {
                        Op::Put { key, value } => {
                            peer.prepare_put(key, value).await.map_err(|_| ())
                        }
                        Op::Del { key } => peer.prepare_del(key).await.map_err(|_| ()),
                    }
                };
                let outcome = tokio::time::timeout(peer_timeout, attempt).await;
                (sid, endpoint, outcome)
            });
        }

        // responded: sid -> endpoint, populated only for peers actually
        // reached within their timeout (spec §9: "respond-means-reached").
        let mut responded: HashMap<u32, String> = HashMap::default();
        let mut all_accepted = true;
        while let Some((sid, endpoint, outcome)) = prepares.next().await {
            match outcome {
                Ok(Ok(accepted)) => {
                    responded.insert(sid, endpoint);
                    if !accepted {
                        all_accepted = false;
                    }
                }
                _ => {
                    // unreachable or refused at the transport layer: not
                    // recorded as responded, and consensus is lost.
                    all_accepted = false;
                }
            }
        }

        let should_commit = all_accepted && responded.len() == nodes.len();

        if should_commit {
            info!("key={} reached consensus, committing", op.key());
            for endpoint in responded.values() {
                let _ = run_terminal(dialer, endpoint, &op, true).await;
            }
            Ok(())
        } else {
            info!("key={} failed to reach consensus, aborting", op.key());
            for endpoint in responded.values() {
                let _ = run_terminal(dialer, endpoint, &op, false).await;
            }
            Err(op.refused_error())
        }
    }
}

async fn run_terminal(
    dialer: &dyn PeerDialer,
    endpoint: &str,
    op: &Op,
    commit: bool,
) -> Result<(), ()> {
    let peer = dialer.dial(endpoint).await.map_err(|_| ())?;
    let result = if commit {
        peer.commit(op.key(), op.is_delete()).await
    } else {
        peer.abort(op.key(), op.is_delete()).await
    };
    result.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::StorageNodePeer;
    use async_trait::async_trait;
    use parking_lot::Mutex as PMutex;
    use std::sync::Arc;
    use tonic::Status;

    #[derive(Default)]
    struct Calls {
        commits: Vec<String>,
        aborts: Vec<String>,
    }

    struct RecordingPeer {
        endpoint: String,
        accept: bool,
        calls: Arc<PMutex<Calls>>,
    }

    #[async_trait]
    impl StorageNodePeer for RecordingPeer {
        async fn get_data(&self, _key: &str) -> Result<Option<String>, Status> {
            Ok(None)
        }
        async fn prepare_put(&self, _key: &str, _value: &str) -> Result<bool, Status> {
            Ok(self.accept)
        }
        async fn prepare_del(&self, _key: &str) -> Result<bool, Status> {
            Ok(self.accept)
        }
        async fn commit(&self, _key: &str, _delete: bool) -> Result<(), Status> {
            self.calls.lock().commits.push(self.endpoint.clone());
            Ok(())
        }
        async fn abort(&self, _key: &str, _delete: bool) -> Result<(), Status> {
            self.calls.lock().aborts.push(self.endpoint.clone());
            Ok(())
        }
    }

    struct FleetDialer {
        accept: HashMap<String, bool>,
        calls: Arc<PMutex<Calls>>,
    }

    #[async_trait]
    impl PeerDialer for FleetDialer {
        async fn dial(&self, endpoint: &str) -> Result<Box<dyn StorageNodePeer>, Status> {
            let accept = *self
                .accept
                .get(endpoint)
                .ok_or_else(|| Status::unavailable("unknown peer"))?;
            Ok(Box::new(RecordingPeer {
                endpoint: endpoint.to_string(),
                accept,
                calls: self.calls.clone(),
            }))
        }
    }

    fn registry_with(endpoints: &[&str]) -> (Registries, u32) {
        let reg = Registries::new();
        let mut initiator = 0;
        for (i, ep) in endpoints.iter().enumerate() {
            let sid = reg
                .online(ep.to_string(), String::new(), format!("t{i}"))
                .unwrap();
            if i == 0 {
                initiator = sid;
            }
        }
        (reg, initiator)
    }

    #[tokio::test]
    async fn all_accept_commits_and_never_aborts() {
        let (reg, initiator) = registry_with(&["a", "b", "c"]);
        let calls = Arc::new(PMutex::new(Calls::default()));
        let mut accept = HashMap::default();
        accept.insert("a".to_string(), true);
        accept.insert("b".to_string(), true);
        accept.insert("c".to_string(), true);
        let dialer = FleetDialer {
            accept,
            calls: calls.clone(),
        };

        let coordinator = TwoPhaseCoordinator::new(new_mutation_lock());
        let result = coordinator
            .run(
                &reg,
                &dialer,
                initiator,
                Op::Put {
                    key: "k".into(),
                    value: "v".into(),
                },
                Duration::from_millis(200),
            )
            .await;

        assert!(result.is_ok());
        let calls = calls.lock();
        assert_eq!(calls.commits.len(), 3);
        assert!(calls.aborts.is_empty());
    }

    #[tokio::test]
    async fn one_refusal_aborts_everyone_and_never_commits() {
        let (reg, initiator) = registry_with(&["a", "b", "c"]);
        let calls = Arc::new(PMutex::new(Calls::default()));
        let mut accept = HashMap::default();
        accept.insert("a".to_string(), true);
        accept.insert("b".to_string(), true);
        accept.insert("c".to_string(), false);
        let dialer = FleetDialer {
            accept,
            calls: calls.clone(),
        };

        let coordinator = TwoPhaseCoordinator::new(new_mutation_lock());
        let result = coordinator
            .run(
                &reg,
                &dialer,
                initiator,
                Op::Put {
                    key: "k".into(),
                    value: "v".into(),
                },
                Duration::from_millis(200),
            )
            .await;

        assert_eq!(result.unwrap_err(), ManagerError::PrepareRefused);
        let calls = calls.lock();
        assert_eq!(calls.aborts.len(), 3);
        assert!(calls.commits.is_empty());
    }

    #[tokio::test]
    async fn unregistered_initiator_is_rejected_before_any_rpc() {
        let (reg, _initiator) = registry_with(&["a"]);
        let calls = Arc::new(PMutex::new(Calls::default()));
        let mut accept = HashMap::default();
        accept.insert("a".to_string(), true);
        let dialer = FleetDialer {
            accept,
            calls: calls.clone(),
        };

        let coordinator = TwoPhaseCoordinator::new(new_mutation_lock());
        let result = coordinator
            .run(
                &reg,
                &dialer,
                9999,
                Op::Del { key: "k".into() },
                Duration::from_millis(200),
            )
            .await;

        assert_eq!(result.unwrap_err(), ManagerError::UnregisteredNode);
        assert!(calls.lock().commits.is_empty());
        assert!(calls.lock().aborts.is_empty());
    }

    #[tokio::test]
    async fn unreachable_peer_forces_abort_without_receiving_one() {
        let (reg, initiator) = registry_with(&["a", "b"]);
        let calls = Arc::new(PMutex::new(Calls::default()));
        // "b" is not in the accept map, so dialing it fails -- it never
        // responded and must not receive abort either.
        let mut accept = HashMap::default();
        accept.insert("a".to_string(), true);
        let dialer = FleetDialer {
            accept,
            calls: calls.clone(),
        };

        let coordinator = TwoPhaseCoordinator::new(new_mutation_lock());
        let result = coordinator
            .run(
                &reg,
                &dialer,
                initiator,
                Op::Del { key: "k".into() },
                Duration::from_millis(200),
            )
            .await;

        assert_eq!(result.unwrap_err(), ManagerError::DeleteRefused);
        let calls = calls.lock();
        assert_eq!(calls.aborts, vec!["a".to_string()]);
        assert!(calls.commits.is_empty());
    }
}
