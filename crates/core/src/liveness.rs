use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::coordinator::MutationLock;
use crate::peer::PeerDialer;
use crate::registry::Registries;

/// C3: periodically probes every registered node and evicts the ones that
/// don't answer within `probe_timeout`. Grounded on
/// `turn-balance/server/src/cluster.rs`'s background sweep (`tokio::spawn` +
/// `tokio::time::interval`), generalized from the balance server's
/// last-seen-timestamp check to an active probe, since the Manager has no
/// heartbeat RPC of its own (spec §4.3: "Manager actively probes").
pub struct LivenessChecker {
    registries: Arc<Registries>,
    dialer: Arc<dyn PeerDialer>,
    mutation_lock: MutationLock,
    probe_period: Duration,
    probe_timeout: Duration,
}

impl LivenessChecker {
    pub fn new(
        registries: Arc<Registries>,
        dialer: Arc<dyn PeerDialer>,
        mutation_lock: MutationLock,
        probe_period: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registries,
            dialer,
            mutation_lock,
            probe_period,
            probe_timeout,
        }
    }

    /// Spawns the background sweep loop and returns its handle. Dropping (or
    /// aborting) the handle stops the sweep.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.probe_period);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }

    /// Runs one probe round over the current node set, under the mutation
    /// lock, and evicts every node that failed to answer (spec §5: eviction
    /// is a mutation, and must not interleave with a Put/Del round).
    async fn sweep(&self) {
        let nodes = self.registries.all_nodes();
        if nodes.is_empty() {
            return;
        }

        let mut unreachable = Vec::new();
        for node in &nodes {
            let endpoint = node.endpoint();
            let reachable = self.probe_one(&endpoint).await;
            if !reachable {
                unreachable.push((node.id, endpoint));
            }
        }

        if unreachable.is_empty() {
            return;
        }

        let _guard = self.mutation_lock.lock().await;
        for (sid, endpoint) in unreachable {
            if self.registries.evict(sid) {
                warn!("evicting unresponsive node {sid} ({endpoint})");
            }
        }
    }

    async fn probe_one(&self, endpoint: &str) -> bool {
        let attempt = async {
            let peer = self.dialer.dial(endpoint).await.map_err(|_| ())?;
            // any reserved key works here: the probe cares only about
            // whether the node answers, not what it holds.
            peer.get_data("__liveness_probe__").await.map_err(|_| ())
        };
        matches!(
            tokio::time::timeout(self.probe_timeout, attempt).await,
            Ok(Ok(_))
        )
    }
}
