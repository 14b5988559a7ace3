//! Test doubles and helpers.
//!
//! - [`MockRpcClient`] records calls and fire-and-forget sends, and can be
//!   told to fail or to answer with a canned message.
//! - [`MockConnector`] hands out one [`MockRpcClient`] per address and keeps
//!   them reachable for assertions.
//! - [`FaultyStore`] is a [`KvStore`] that fails every batch or commits
//!   without running it.

mod utils;


pub use utils::wait_for;

use crate::error::{Error, NetworkError, Result, StorageError};
use crate::network::rpc::Message;
use crate::network::{RpcClient, RpcConnector};
use crate::storage::{KvStore, Transaction};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-process [`RpcClient`] that never touches the network.
#[derive(Debug)]
pub struct MockRpcClient {
    addr: SocketAddr,
    fail: AtomicBool,
    response: Mutex<Option<Message>>,
    calls: Mutex<Vec<Message>>,
    sent: Mutex<Vec<Message>>,
}

impl MockRpcClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            fail: AtomicBool::new(false),
            response: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Make every subsequent `call` fail with a transport error.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Answer every subsequent `call` with `msg`. Defaults to `Empty`.
    pub fn respond_with(&self, msg: Message) {
        *self.response.lock() = Some(msg);
    }

    /// Messages passed to `call`, in order.
    pub fn calls(&self) -> Vec<Message> {
        self.calls.lock().clone()
    }

    /// Messages passed to `send`, in order.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl RpcClient for MockRpcClient {
    async fn call(&self, msg: Message) -> Result<Message> {
        self.calls.lock().push(msg);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Network(NetworkError::ConnectionFailed {
                addr: self.addr.to_string(),
                reason: "mock failure".to_string(),
            }));
        }
        Ok(self.response.lock().clone().unwrap_or(Message::Empty))
    }

    fn send(&self, msg: Message) {
        self.sent.lock().push(msg);
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// [`RpcConnector`] producing [`MockRpcClient`]s.
#[derive(Debug, Default)]
pub struct MockConnector {
    clients: Mutex<HashMap<SocketAddr, Arc<MockRpcClient>>>,
    connected: Mutex<Vec<SocketAddr>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every address passed to `connect`, in order.
    pub fn connected(&self) -> Vec<SocketAddr> {
        self.connected.lock().clone()
    }

    /// The most recent client created for `addr`.
    pub fn client(&self, addr: SocketAddr) -> Option<Arc<MockRpcClient>> {
        self.clients.lock().get(&addr).cloned()
    }
}

impl RpcConnector for MockConnector {
    fn connect(&self, addr: SocketAddr) -> Arc<dyn RpcClient> {
        let client = Arc::new(MockRpcClient::new(addr));
        self.clients.lock().insert(addr, client.clone());
        self.connected.lock().push(addr);
        client
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Fail,
    Skip,
}

/// Store whose batches never apply anything.
#[derive(Debug)]
pub struct FaultyStore {
    fault: Fault,
}

impl FaultyStore {
    /// Every batch fails with a commit error.
    pub fn failing() -> Self {
        Self { fault: Fault::Fail }
    }

    /// Every batch reports success without running its closure.
    pub fn skipping() -> Self {
        Self { fault: Fault::Skip }
    }
}

impl KvStore for FaultyStore {
    fn batch(
        &self,
        _bucket: &str,
        _f: &mut dyn FnMut(&mut dyn Transaction) -> std::result::Result<(), StorageError>,
    ) -> std::result::Result<(), StorageError> {
        match self.fault {
            Fault::Fail => Err(StorageError::CommitFailed("injected failure".to_string())),
            Fault::Skip => Ok(()),
        }
    }

    fn get(&self, _bucket: &str, _key: &[u8]) -> std::result::Result<Option<Vec<u8>>, StorageError> {
        Ok(None)
    }
}
