//! Membership adapter: keeps the hash ring, the name table and the broadcast
//! list in step with gossip join/leave notifications.
//!
//! The name table and the broadcast list are guarded by two independent
//! locks. Routing only reads the ring; replication only walks a snapshot of
//! the list; neither contends with the other. Neither lock is held across an
//! RPC or storage call.

use crate::cluster::broadcast::BroadcastList;
use crate::cluster::delegate::MembershipDelegate;
use crate::cluster::descriptor::ClusterNodeDescriptor;
use crate::cluster::events::{MemberEvent, MemberEventListener};
use crate::cluster::peer::PeerEntry;
use crate::error::MembershipError;
use crate::metrics::MembershipMetrics;
use crate::network::RpcConnector;
use crate::partitioning::HashRing;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info};

/// Ring whose entries point at shared peer records.
pub type ClusterRing = HashRing<Arc<PeerEntry>>;

/// The local view of cluster membership.
pub struct ClusterMembership {
    local: ClusterNodeDescriptor,
    ring: ClusterRing,
    /// Member name -> entry.
    nodes: Mutex<HashMap<String, Arc<PeerEntry>>>,
    broadcast: BroadcastList,
    connector: Arc<dyn RpcConnector>,
    listeners: RwLock<Vec<Arc<dyn MemberEventListener>>>,
    metrics: MembershipMetrics,
}

impl ClusterMembership {
    /// Create the adapter for the local node described by `local`.
    pub fn new(local: ClusterNodeDescriptor, connector: Arc<dyn RpcConnector>) -> Self {
        Self {
            local,
            ring: HashRing::new(),
            nodes: Mutex::new(HashMap::new()),
            broadcast: BroadcastList::new(),
            connector,
            listeners: RwLock::new(Vec::new()),
            metrics: MembershipMetrics::new(),
        }
    }

    /// The local descriptor.
    pub fn local(&self) -> &ClusterNodeDescriptor {
        &self.local
    }

    /// Cluster namespace tag.
    pub fn marker(&self) -> &str {
        &self.local.marker
    }

    pub fn ring(&self) -> &ClusterRing {
        &self.ring
    }

    pub fn metrics(&self) -> &MembershipMetrics {
        &self.metrics
    }

    /// Look up a member by gossip name.
    pub fn peer(&self, name: &str) -> Option<Arc<PeerEntry>> {
        self.nodes.lock().get(name).cloned()
    }

    pub fn peer_count(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Snapshot of every member that receives replication pushes.
    pub fn broadcast_targets(&self) -> Vec<Arc<PeerEntry>> {
        self.broadcast.snapshot()
    }

    pub fn add_listener(&self, listener: Arc<dyn MemberEventListener>) {
        self.listeners.write().push(listener);
    }

    fn notify(&self, event: MemberEvent) {
        for listener in self.listeners.read().iter() {
            listener.on_event(&event);
        }
    }

    fn decode(&self, meta: &[u8]) -> Option<ClusterNodeDescriptor> {
        ClusterNodeDescriptor::decode_for(meta, self.marker())
    }

    /// Build the entry for an accepted peer, or `None` if it is not accepted.
    ///
    /// A descriptor carrying the local node id is the local node and never
    /// gets an RPC handle. A remote node must advertise an RPC port.
    fn admit(&self, name: &str, desc: ClusterNodeDescriptor, addr: IpAddr) -> Option<PeerEntry> {
        if desc.node_id == self.local.node_id {
            return Some(PeerEntry::new(desc, name, None));
        }
        if desc.rpc_port == 0 {
            debug!(peer = %name, "Ignoring remote peer without RPC port");
            return None;
        }
        let rpc = self
            .connector
            .connect(SocketAddr::new(addr, desc.rpc_port));
        Some(PeerEntry::new(desc, name, Some(rpc)))
    }

    /// Drop `entry`'s ring slot unless another member has since taken it
    /// over by joining with the same node id.
    fn release_ring_slot(&self, entry: &Arc<PeerEntry>) {
        self.ring
            .remove_if(entry.node_id(), |held| Arc::ptr_eq(held, entry));
    }

    fn update_member_gauge(&self, count: usize) {
        self.metrics.members.set(count as i64);
    }
}

impl MembershipDelegate for ClusterMembership {
    fn node_meta(&self, limit: usize) -> Option<Vec<u8>> {
        let data = self.local.to_bytes().ok()?;
        if data.len() > limit {
            debug!(
                size = data.len(),
                limit, "Local descriptor exceeds metadata limit, not advertising"
            );
            return None;
        }
        Some(data)
    }

    fn notify_join(&self, name: &str, meta: &[u8], addr: IpAddr) {
        let Some(desc) = self.decode(meta) else {
            debug!(peer = %name, "Ignoring peer with invalid or foreign metadata");
            self.metrics.ignored_joins.inc();
            return;
        };
        let Some(entry) = self.admit(name, desc, addr) else {
            self.metrics.ignored_joins.inc();
            return;
        };
        let entry = Arc::new(entry);
        let local = entry.is_local();

        if local {
            self.ring.set_local(entry.node_id(), entry.clone());
        } else {
            self.ring.add_remote(entry.node_id(), entry.clone());
        }

        let (previous, count) = {
            let mut nodes = self.nodes.lock();
            let previous = nodes.insert(name.to_string(), entry.clone());
            (previous, nodes.len())
        };
        self.update_member_gauge(count);

        // A rejoin under the same name without a leave in between.
        if let Some(previous) = previous {
            self.broadcast.remove(&previous);
            if previous.node_id() != entry.node_id() {
                self.release_ring_slot(&previous);
            }
        }

        self.broadcast.insert(entry.clone());
        self.metrics.joins.inc();

        info!(
            peer = %name,
            local,
            rpc = ?entry.rpc().map(|c| c.addr()),
            "Member joined"
        );
        self.notify(MemberEvent::Joined {
            name: name.to_string(),
            node_id: entry.node_id().to_vec(),
            local,
        });
    }

    fn notify_leave(&self, name: &str) {
        let (removed, count) = {
            let mut nodes = self.nodes.lock();
            let removed = nodes.remove(name);
            (removed, nodes.len())
        };
        let Some(entry) = removed else {
            return;
        };
        self.update_member_gauge(count);

        self.release_ring_slot(&entry);
        self.broadcast.remove(&entry);
        self.metrics.leaves.inc();

        info!(peer = %name, "Member left");
        self.notify(MemberEvent::Left {
            name: name.to_string(),
            node_id: entry.node_id().to_vec(),
        });
    }

    fn notify_alive(&self, meta: &[u8]) -> Result<(), MembershipError> {
        if self.decode(meta).is_none() {
            self.metrics.rejected_admissions.inc();
            return Err(MembershipError::InvalidNode);
        }
        Ok(())
    }

    fn notify_merge(&self, peers: &[&[u8]]) -> Result<(), MembershipError> {
        if peers.iter().any(|meta| self.decode(meta).is_none()) {
            self.metrics.rejected_admissions.inc();
            return Err(MembershipError::InvalidNode);
        }
        Ok(())
    }
}
