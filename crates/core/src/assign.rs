use rand::seq::SliceRandom;

use crate::error::{ManagerError, ManagerResult};
use crate::registry::Registries;

/// C4: pick one endpoint uniformly at random from the current EndpointSet.
/// Grounded on the source's `getServerInfo` (`random.choice`).
pub fn pick_endpoint(registries: &Registries) -> ManagerResult<String> {
    let endpoints = registries.endpoints();
    endpoints
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or(ManagerError::NoNodesAvailable)
}
