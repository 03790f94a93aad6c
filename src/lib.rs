pub mod config;
pub mod grpc;
pub mod logger;

use std::sync::Arc;
use std::time::Duration;

use tonic::transport::Server;

use kv_core::{GrpcPeerDialer, ManagerState, ManagerTuning, PeerDialer};

use self::config::Config;
use self::grpc::RpcService;

/// Builds the shared [`ManagerState`] from a loaded [`Config`], wiring in
/// the production gRPC dialer used to reach storage nodes.
pub fn build_state(config: &Config) -> Arc<ManagerState> {
    let dialer: Arc<dyn PeerDialer> = Arc::new(GrpcPeerDialer {
        connect_timeout: config.mutation.peer_timeout(),
    });

    let tuning = ManagerTuning {
        peer_timeout: config.mutation.peer_timeout(),
        liveness_period: config.liveness.probe_period(),
        liveness_timeout: config.liveness.probe_timeout(),
    };

    Arc::new(ManagerState::new(dialer, tuning))
}

/// Starts the liveness sweep and serves `ManagerService` until the process
/// is killed. Exposed as a function (rather than folded into `main`) so
/// integration tests can start a real server on an ephemeral port, the way
/// the teacher's `turn_server::startup` is used by its own integration
/// tests.
pub async fn startup(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config);
    let _liveness = state.liveness_checker().spawn();

    log::info!(
        "manager listening: listen={}, worker_threads={}",
        config.server.listen,
        config.server.worker_threads
    );

    Server::builder()
        .timeout(Duration::from_secs(config.mutation.peer_timeout_secs))
        .add_service(RpcService::new(state).into_server())
        .serve(config.server.listen)
        .await?;

    Ok(())
}
