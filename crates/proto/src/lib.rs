//! Generated gRPC types and service traits for the Manager's two protocols:
//! the client/node-facing `ManagerService`, and the `StorageNodeService` the
//! Manager consumes on every registered storage node.

tonic::include_proto!("kv.manager");
