//! TCP server dispatching incoming RPC messages to a handler.

use crate::error::{NetworkError, Result};
use crate::network::rpc::{read_frame, write_frame, Message, MessageRegistry};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Handler for incoming messages. Every request gets exactly one response.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, peer: SocketAddr, msg: Message) -> Message;
}

/// TCP server for node-to-node RPC.
pub struct NetworkServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<MessageRegistry>,
    max_frame_size: usize,
    shutdown_rx: mpsc::Receiver<()>,
}

impl NetworkServer {
    /// Bind the listener. The server does not accept until [`run`](Self::run),
    /// so callers can learn the bound port before building the handler.
    pub async fn bind(
        bind_addr: SocketAddr,
        registry: Arc<MessageRegistry>,
        max_frame_size: usize,
    ) -> Result<(Self, mpsc::Sender<()>)> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(NetworkError::Io)?;
        let local_addr = listener.local_addr().map_err(NetworkError::Io)?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let server = Self {
            listener,
            local_addr,
            registry,
            max_frame_size,
            shutdown_rx,
        };

        Ok((server, shutdown_tx))
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until a shutdown signal arrives.
    pub async fn run(mut self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        info!(addr = %self.local_addr, "RPC server listening");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "Accepted connection");
                            let handler = handler.clone();
                            let registry = self.registry.clone();
                            let max_frame_size = self.max_frame_size;
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(
                                    stream, peer_addr, handler, registry, max_frame_size,
                                ).await {
                                    debug!(peer = %peer_addr, error = %e, "Connection handler error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    info!("RPC server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(
        mut stream: TcpStream,
        peer: SocketAddr,
        handler: Arc<dyn MessageHandler>,
        registry: Arc<MessageRegistry>,
        max_frame_size: usize,
    ) -> Result<()> {
        while let Some(data) = read_frame(&mut stream, max_frame_size).await? {
            let msg = registry.decode(&data)?;
            let response = handler.handle(peer, msg).await;
            let encoded = registry.encode(&response)?;
            write_frame(&mut stream, &encoded).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::client::{RpcClientConfig, TcpRpcClient};
    use crate::network::rpc::{DirectResponse, DEFAULT_MAX_FRAME_SIZE};
    use crate::network::RpcClient;

    struct EchoHandler;

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn handle(&self, _peer: SocketAddr, msg: Message) -> Message {
            match msg {
                Message::Empty => Message::DirectResponse(DirectResponse::ok(vec![42])),
                other => other,
            }
        }
    }

    #[tokio::test]
    async fn test_server_roundtrip() {
        let registry = Arc::new(MessageRegistry::standard());
        let (server, shutdown_tx) = NetworkServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            registry.clone(),
            DEFAULT_MAX_FRAME_SIZE,
        )
        .await
        .unwrap();
        let addr = server.local_addr();
        let server_handle = tokio::spawn(server.run(Arc::new(EchoHandler)));

        let client = TcpRpcClient::new(addr, registry, RpcClientConfig::default());
        let response = client.call(Message::Empty).await.unwrap();
        assert_eq!(response, Message::DirectResponse(DirectResponse::ok(vec![42])));

        // The connection is reused for the next call.
        let response = client.call(Message::Empty).await.unwrap();
        assert!(matches!(response, Message::DirectResponse(_)));

        let _ = shutdown_tx.send(()).await;
        let _ = server_handle.await;
    }
}
