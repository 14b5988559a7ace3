//! Outbound RPC clients.

use crate::error::{NetworkError, Result};
use crate::network::rpc::{read_frame, write_frame, Message, MessageRegistry, DEFAULT_MAX_FRAME_SIZE};
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Handle to a remote node's RPC server.
#[async_trait]
pub trait RpcClient: Send + Sync + fmt::Debug {
    /// Send a request and wait for its response.
    async fn call(&self, msg: Message) -> Result<Message>;

    /// Send a request without waiting for, or reporting, its outcome.
    fn send(&self, msg: Message);

    /// Address this client talks to.
    fn addr(&self) -> SocketAddr;
}

/// Factory for [`RpcClient`] handles.
pub trait RpcConnector: Send + Sync + 'static {
    /// Create a handle for `addr`. Must not block or dial.
    fn connect(&self, addr: SocketAddr) -> Arc<dyn RpcClient>;
}

/// Configuration for outbound RPC behavior.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Largest accepted response frame.
    pub max_frame_size: usize,
    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,
    /// Deadline for a whole call, including waiting for the connection.
    pub request_timeout: Duration,
    /// Fire-and-forget sends allowed in flight per peer; further sends are dropped.
    pub max_pending_sends: usize,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(20),
            max_pending_sends: 1024,
        }
    }
}

/// Creates [`TcpRpcClient`]s sharing one message registry.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    registry: Arc<MessageRegistry>,
    config: RpcClientConfig,
}

impl TcpConnector {
    pub fn new(registry: Arc<MessageRegistry>, config: RpcClientConfig) -> Self {
        Self { registry, config }
    }
}

impl RpcConnector for TcpConnector {
    fn connect(&self, addr: SocketAddr) -> Arc<dyn RpcClient> {
        Arc::new(TcpRpcClient::new(
            addr,
            self.registry.clone(),
            self.config.clone(),
        ))
    }
}

struct ClientInner {
    addr: SocketAddr,
    registry: Arc<MessageRegistry>,
    config: RpcClientConfig,
    /// Cached connection; calls are serialized over it.
    stream: Mutex<Option<TcpStream>>,
    pending_sends: AtomicUsize,
}

/// RPC client over a single lazily dialed TCP connection.
///
/// The connection is taken out of the cache for the duration of an exchange
/// and only put back once a response has been decoded. A failed, timed out
/// or cancelled call therefore drops the connection, and the next call
/// redials instead of reading a stale response.
#[derive(Clone)]
pub struct TcpRpcClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for TcpRpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpRpcClient")
            .field("addr", &self.inner.addr)
            .finish()
    }
}

impl TcpRpcClient {
    pub fn new(addr: SocketAddr, registry: Arc<MessageRegistry>, config: RpcClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                addr,
                registry,
                config,
                stream: Mutex::new(None),
                pending_sends: AtomicUsize::new(0),
            }),
        }
    }

    /// Fire-and-forget sends not yet finished.
    pub fn pending_sends(&self) -> usize {
        self.inner.pending_sends.load(Ordering::SeqCst)
    }

    async fn call_with_timeout(inner: &ClientInner, msg: &Message) -> Result<Message> {
        tokio::time::timeout(inner.config.request_timeout, Self::roundtrip(inner, msg))
            .await
            .map_err(|_| NetworkError::Timeout(format!("request to {}", inner.addr)))?
    }

    async fn roundtrip(inner: &ClientInner, msg: &Message) -> Result<Message> {
        let request = inner.registry.encode(msg)?;
        let mut guard = inner.stream.lock().await;

        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => Self::dial(inner).await?,
        };

        let data = Self::exchange(&mut stream, &request, inner.config.max_frame_size).await?;
        let response = inner.registry.decode(&data)?;
        *guard = Some(stream);
        Ok(response)
    }

    async fn dial(inner: &ClientInner) -> std::result::Result<TcpStream, NetworkError> {
        let stream = tokio::time::timeout(inner.config.connect_timeout, TcpStream::connect(inner.addr))
            .await
            .map_err(|_| NetworkError::ConnectionFailed {
                addr: inner.addr.to_string(),
                reason: "connection timeout".to_string(),
            })?
            .map_err(|e| NetworkError::ConnectionFailed {
                addr: inner.addr.to_string(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true).map_err(NetworkError::Io)?;
        debug!(addr = %inner.addr, "Connected to peer");
        Ok(stream)
    }

    async fn exchange(
        stream: &mut TcpStream,
        request: &[u8],
        max_frame_size: usize,
    ) -> std::result::Result<Vec<u8>, NetworkError> {
        write_frame(stream, request).await?;
        read_frame(stream, max_frame_size)
            .await?
            .ok_or(NetworkError::ConnectionClosed)
    }
}

#[async_trait]
impl RpcClient for TcpRpcClient {
    async fn call(&self, msg: Message) -> Result<Message> {
        Self::call_with_timeout(&self.inner, &msg).await
    }

    fn send(&self, msg: Message) {
        let inner = self.inner.clone();
        if inner.pending_sends.fetch_add(1, Ordering::SeqCst) >= inner.config.max_pending_sends {
            inner.pending_sends.fetch_sub(1, Ordering::SeqCst);
            trace!(addr = %inner.addr, message = msg.name(), "Send queue full, dropping");
            return;
        }
        tokio::spawn(async move {
            if let Err(e) = Self::call_with_timeout(&inner, &msg).await {
                trace!(addr = %inner.addr, error = %e, "Fire-and-forget send failed");
            }
            inner.pending_sends.fetch_sub(1, Ordering::SeqCst);
        });
    }

    fn addr(&self) -> SocketAddr {
        self.inner.addr
    }
}
