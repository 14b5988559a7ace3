//! Metadata a node advertises to its peers through the gossip layer.

use serde::{Deserialize, Serialize};

/// Positional record `(marker, rpc_port, node_id)`.
///
/// Field order is the wire format; there is no field tagging, so any change
/// here breaks every peer at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNodeDescriptor {
    /// Cluster namespace tag. Peers with a different marker are invisible.
    pub marker: String,
    /// Port of the node's RPC server; `0` means the node serves no RPC.
    pub rpc_port: u16,
    /// Opaque node identifier, hashed to place the node on the ring.
    pub node_id: Vec<u8>,
}

impl ClusterNodeDescriptor {
    pub fn new(marker: impl Into<String>, rpc_port: u16, node_id: impl Into<Vec<u8>>) -> Self {
        Self {
            marker: marker.into(),
            rpc_port,
            node_id: node_id.into(),
        }
    }

    /// Serialize the descriptor for the gossip metadata slot.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode a descriptor, returning `None` on any malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bincode::deserialize(bytes).ok()
    }

    /// Decode and require a matching cluster marker.
    pub fn decode_for(bytes: &[u8], marker: &str) -> Option<Self> {
        Self::from_bytes(bytes).filter(|d| d.marker == marker)
    }
}
