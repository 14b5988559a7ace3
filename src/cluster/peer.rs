//! A cluster member as seen by this node.

use crate::cluster::descriptor::ClusterNodeDescriptor;
use crate::network::RpcClient;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

/// Position value meaning "not in the broadcast list".
pub const NOT_LISTED: isize = -1;

/// A joined member: its advertised descriptor plus local bookkeeping.
#[derive(Debug)]
pub struct PeerEntry {
    descriptor: ClusterNodeDescriptor,
    name: String,
    /// Absent for the local node, present for every accepted remote node.
    rpc: Option<Arc<dyn RpcClient>>,
    /// Index into the broadcast list. Only touched under the list's lock.
    position: AtomicIsize,
}

impl PeerEntry {
    pub fn new(
        descriptor: ClusterNodeDescriptor,
        name: impl Into<String>,
        rpc: Option<Arc<dyn RpcClient>>,
    ) -> Self {
        Self {
            descriptor,
            name: name.into(),
            rpc,
            position: AtomicIsize::new(NOT_LISTED),
        }
    }

    pub fn descriptor(&self) -> &ClusterNodeDescriptor {
        &self.descriptor
    }

    pub fn marker(&self) -> &str {
        &self.descriptor.marker
    }

    pub fn rpc_port(&self) -> u16 {
        self.descriptor.rpc_port
    }

    pub fn node_id(&self) -> &[u8] {
        &self.descriptor.node_id
    }

    /// Gossip-level member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rpc(&self) -> Option<&Arc<dyn RpcClient>> {
        self.rpc.as_ref()
    }

    /// The local node is the only entry without an RPC handle.
    pub fn is_local(&self) -> bool {
        self.rpc.is_none()
    }

    /// Current broadcast list index, or [`NOT_LISTED`].
    pub fn list_position(&self) -> isize {
        self.position.load(Ordering::Acquire)
    }

    pub(crate) fn set_list_position(&self, pos: isize) {
        self.position.store(pos, Ordering::Release);
    }
}
