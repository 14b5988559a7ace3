//! Network communication layer.

pub mod client;
pub mod rpc;
pub mod server;

pub use client::{RpcClient, RpcClientConfig, RpcConnector, TcpConnector, TcpRpcClient};
pub use rpc::{
    DirectRequest, DirectResponse, DirectStatus, IndirectRequest, Message, MessageRegistry,
    ReplicationRequest, ReplicationResponse, ReplicationStatus,
};
pub use server::{MessageHandler, NetworkServer};
