use std::time::Duration;

use ahash::HashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use log::info;

use crate::error::{ManagerError, ManagerResult};
use crate::peer::PeerDialer;
use crate::registry::Registries;

/// C5: fan out `getdata(key)` to every live node except `requester_id`,
/// collect responses within `per_peer_timeout`, and return the strict
/// majority value among *responders* -- not among the full registered set
/// (spec §4.5, pinned open question in §9).
pub async fn reconcile_read(
    registries: &Registries,
    dialer: &dyn PeerDialer,
    requester_id: u32,
    key: &str,
    per_peer_timeout: Duration,
) -> ManagerResult<String> {
    if !registries.contains_node(requester_id) {
        return Err(ManagerError::UnregisteredNode);
    }

    let peers: Vec<_> = registries
        .all_nodes()
        .into_iter()
        .filter(|node| node.id != requester_id)
        .collect();

    info!("collecting key={key} from {} other nodes", peers.len());

    let mut futs = FuturesUnordered::new();
    for node in peers {
        let endpoint = node.endpoint();
        futs.push(async move {
            let fetch = async {
                let peer = dialer.dial(&endpoint).await.ok()?;
                peer.get_data(key).await.ok().flatten()
            };
            tokio::time::timeout(per_peer_timeout, fetch)
                .await
                .ok()
                .flatten()
        });
    }

    let mut values = Vec::new();
    while let Some(value) = futs.next().await {
        if let Some(v) = value {
            values.push(v);
        }
    }

    if values.is_empty() {
        return Err(ManagerError::KeyAbsent(key.to_string()));
    }

    let mut counts: HashMap<String, usize> = HashMap::default();
    let mut winner = String::new();
    let mut best = 0usize;
    for v in &values {
        let entry = counts.entry(v.clone()).or_insert(0);
        *entry += 1;
        if *entry > best {
            best = *entry;
            winner = v.clone();
        }
    }

    if best > values.len() / 2 {
        info!("key={key} reached consensus on value");
        Ok(winner)
    } else {
        Err(ManagerError::NoConsensus(key.to_string()))
    }
}
