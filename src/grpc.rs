use std::sync::Arc;

use log::{info, warn};
use tonic::{Request, Response, Status};

use kv_core::{ManagerError, ManagerState};

use proto::manager_service_server::{ManagerService, ManagerServiceServer};
use proto::{
    Ack, ChangeServerReply, ChangeServerRequest, ClientId, ConnectReply, DelRequest, Empty,
    GetReply, GetRequest, OfflineRequest, OnlineReply, OnlineRequest, PutRequest,
};

fn ack_ok() -> Ack {
    Ack {
        errno: true,
        errmes: String::new(),
    }
}

fn ack_err(err: ManagerError) -> Ack {
    let (errno, errmes) = err.into_parts();
    Ack { errno, errmes }
}

/// Implements `ManagerService` over a shared [`ManagerState`], translating
/// every application error into the wire's `errno`/`errmes` pair rather than
/// a `tonic::Status` failure (spec §7). Grounded on `src/grpc.rs`'s
/// `RpcService` (a tonic server trait impl holding the shared service
/// state).
pub struct RpcService {
    state: Arc<ManagerState>,
}

impl RpcService {
    pub fn new(state: Arc<ManagerState>) -> Self {
        Self { state }
    }

    pub fn into_server(self) -> ManagerServiceServer<Self> {
        ManagerServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl ManagerService for RpcService {
    async fn connect(&self, _request: Request<Empty>) -> Result<Response<ConnectReply>, Status> {
        let reply = match kv_core::assign::pick_endpoint(&self.state.registries) {
            Ok(endpoint) => {
                let node = self
                    .state
                    .registries
                    .all_nodes()
                    .into_iter()
                    .find(|node| node.endpoint() == endpoint);

                match node {
                    Some(node) => match self.state.registries.connect(endpoint) {
                        Ok(cli_id) => ConnectReply {
                            host: node.host,
                            port: node.port,
                            cli_id,
                            errno: true,
                            errmes: String::new(),
                        },
                        Err(err) => {
                            let (errno, errmes) = err.into_parts();
                            ConnectReply {
                                host: String::new(),
                                port: String::new(),
                                cli_id: 0,
                                errno,
                                errmes,
                            }
                        }
                    },
                    None => {
                        let (errno, errmes) = ManagerError::UnknownEndpoint.into_parts();
                        ConnectReply {
                            host: String::new(),
                            port: String::new(),
                            cli_id: 0,
                            errno,
                            errmes,
                        }
                    }
                }
            }
            Err(err) => {
                warn!("client attempted to connect but no storage nodes are registered");
                let (errno, errmes) = err.into_parts();
                ConnectReply {
                    host: String::new(),
                    port: String::new(),
                    cli_id: 0,
                    errno,
                    errmes,
                }
            }
        };

        Ok(Response::new(reply))
    }

    async fn disconnect(&self, request: Request<ClientId>) -> Result<Response<Ack>, Status> {
        let cli_id = request.into_inner().cli_id;
        info!("client {cli_id} requesting disconnect");
        self.state.registries.disconnect(cli_id);
        Ok(Response::new(ack_ok()))
    }

    async fn change_server(
        &self,
        request: Request<ChangeServerRequest>,
    ) -> Result<Response<ChangeServerReply>, Status> {
        let req = request.into_inner();
        info!("client {} requesting change to {}", req.cli_id, req.api);

        if !self.state.registries.has_endpoint(&req.api) {
            warn!(
                "cannot change client {} to {}: unknown endpoint",
                req.cli_id, req.api
            );
            let (errno, errmes) = ManagerError::UnknownEndpoint.into_parts();
            return Ok(Response::new(ChangeServerReply {
                api: String::new(),
                errno,
                errmes,
            }));
        }

        self.state.registries.rebind(req.cli_id, req.api.clone());
        Ok(Response::new(ChangeServerReply {
            api: req.api,
            errno: true,
            errmes: String::new(),
        }))
    }

    async fn change_server_random(
        &self,
        request: Request<ClientId>,
    ) -> Result<Response<ChangeServerReply>, Status> {
        let cli_id = request.into_inner().cli_id;
        let reply = match kv_core::assign::pick_endpoint(&self.state.registries) {
            Ok(endpoint) => {
                self.state.registries.rebind(cli_id, endpoint.clone());
                ChangeServerReply {
                    api: endpoint,
                    errno: true,
                    errmes: String::new(),
                }
            }
            Err(err) => {
                warn!("client {cli_id} attempted to change server but no storage nodes are registered");
                let (errno, errmes) = err.into_parts();
                ChangeServerReply {
                    api: String::new(),
                    errno,
                    errmes,
                }
            }
        };

        Ok(Response::new(reply))
    }

    async fn online(
        &self,
        request: Request<OnlineRequest>,
    ) -> Result<Response<OnlineReply>, Status> {
        let req = request.into_inner();
        let endpoint = format!("{}{}", req.host, req.port);
        let reply = match self.state.registries.online(req.host, req.port, req.token) {
            Ok(server_id) => OnlineReply {
                server_id,
                errno: true,
                errmes: String::new(),
            },
            Err(err) => {
                warn!("storage node {endpoint} failed to register: {err}");
                let (errno, errmes) = err.into_parts();
                OnlineReply {
                    server_id: 0,
                    errno,
                    errmes,
                }
            }
        };

        Ok(Response::new(reply))
    }

    async fn offline(&self, request: Request<OfflineRequest>) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        info!("storage node {} requesting deregistration", req.server_id);
        let ack = match self.state.registries.offline(req.server_id, &req.token) {
            Ok(()) => ack_ok(),
            Err(err) => {
                warn!("storage node {} failed to deregister: {err}", req.server_id);
                ack_err(err)
            }
        };

        Ok(Response::new(ack))
    }

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetReply>, Status> {
        let req = request.into_inner();
        let reply = match self.state.get(req.server_id, &req.key).await {
            Ok(value) => GetReply {
                value,
                errno: true,
                errmes: String::new(),
            },
            Err(err) => {
                let (errno, errmes) = err.into_parts();
                GetReply {
                    value: String::new(),
                    errno,
                    errmes,
                }
            }
        };

        Ok(Response::new(reply))
    }

    async fn put(&self, request: Request<PutRequest>) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        let ack = match self.state.put(req.server_id, req.key, req.value).await {
            Ok(()) => ack_ok(),
            Err(err) => ack_err(err),
        };

        Ok(Response::new(ack))
    }

    async fn del(&self, request: Request<DelRequest>) -> Result<Response<Ack>, Status> {
        let req = request.into_inner();
        let ack = match self.state.del(req.server_id, req.key).await {
            Ok(()) => ack_ok(),
            Err(err) => ack_err(err),
        };

        Ok(Response::new(ack))
    }
}
