use async_trait::async_trait;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use proto::storage_node_service_client::StorageNodeServiceClient;
use proto::{AbortRequest, CommitRequest, GetDataRequest, PrepareDelRequest, PreparePutRequest};

/// The Manager's view of a single storage node as an RPC peer: the five
/// calls defined on `StorageNodeService` (spec §6). A `Status` return means
/// the peer was unreachable or the call otherwise failed at the transport
/// layer -- the coordinator and reconciler treat that identically to an
/// explicit refusal, per spec §4.5/§4.6.
#[async_trait]
pub trait StorageNodePeer: Send + Sync {
    async fn get_data(&self, key: &str) -> Result<Option<String>, Status>;
    async fn prepare_put(&self, key: &str, value: &str) -> Result<bool, Status>;
    async fn prepare_del(&self, key: &str) -> Result<bool, Status>;
    async fn commit(&self, key: &str, delete: bool) -> Result<(), Status>;
    async fn abort(&self, key: &str, delete: bool) -> Result<(), Status>;
}

/// Dials a fresh connection to a storage node endpoint. Kept separate from
/// [`StorageNodePeer`] so the coordinator/reconciler can be driven by a
/// mock in tests without any networking.
#[async_trait]
pub trait PeerDialer: Send + Sync {
    async fn dial(&self, endpoint: &str) -> Result<Box<dyn StorageNodePeer>, Status>;
}

/// Production dialer: opens a gRPC channel to `http://<endpoint>` with the
/// configured connect timeout, grounded on `src/grpc.rs`'s
/// `RpcHooksService::new` (`Channel::builder(..).connect_timeout(..)`).
pub struct GrpcPeerDialer {
    pub connect_timeout: Duration,
}

#[async_trait]
impl PeerDialer for GrpcPeerDialer {
    async fn dial(&self, endpoint: &str) -> Result<Box<dyn StorageNodePeer>, Status> {
        let uri = format!("http://{endpoint}");
        let channel = Endpoint::from_shared(uri)
            .map_err(|e| Status::invalid_argument(e.to_string()))?
            .connect_timeout(self.connect_timeout)
            .connect()
            .await
            .map_err(|e| Status::unavailable(e.to_string()))?;

        Ok(Box::new(GrpcStorageNodePeer {
            client: StorageNodeServiceClient::new(channel),
        }))
    }
}

struct GrpcStorageNodePeer {
    client: StorageNodeServiceClient<Channel>,
}

#[async_trait]
impl StorageNodePeer for GrpcStorageNodePeer {
    async fn get_data(&self, key: &str) -> Result<Option<String>, Status> {
        let reply = self
            .client
            .clone()
            .get_data(Request::new(GetDataRequest {
                cli_id: 0,
                key: key.to_string(),
            }))
            .await?
            .into_inner();

        Ok(if reply.errno { Some(reply.value) } else { None })
    }

    async fn prepare_put(&self, key: &str, value: &str) -> Result<bool, Status> {
        let ack = self
            .client
            .clone()
            .prepare_put(Request::new(PreparePutRequest {
                key: key.to_string(),
                value: value.to_string(),
            }))
            .await?
            .into_inner();

        Ok(ack.errno)
    }

    async fn prepare_del(&self, key: &str) -> Result<bool, Status> {
        let ack = self
            .client
            .clone()
            .prepare_del(Request::new(PrepareDelRequest {
                key: key.to_string(),
            }))
            .await?
            .into_inner();

        Ok(ack.errno)
    }

    async fn commit(&self, key: &str, delete: bool) -> Result<(), Status> {
        self.client
            .clone()
            .commit(Request::new(CommitRequest {
                key: key.to_string(),
                delete,
            }))
            .await?;
        Ok(())
    }

    async fn abort(&self, key: &str, delete: bool) -> Result<(), Status> {
        self.client
            .clone()
            .abort(Request::new(AbortRequest {
                key: key.to_string(),
                delete,
            }))
            .await?;
        Ok(())
    }
}
