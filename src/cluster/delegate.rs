//! Event-sink interface driven by the gossip layer.

use crate::error::MembershipError;
use std::net::IpAddr;

/// Callbacks a gossip/failure-detection layer invokes on membership changes.
///
/// Callbacks may fire concurrently with each other and with request
/// handling. Only the join/leave/metadata channel carries meaning here; the
/// payload-broadcast and state-sync channels default to no-ops.
pub trait MembershipDelegate: Send + Sync {
    /// Encoded local metadata, or `None` when it does not fit in `limit` bytes.
    fn node_meta(&self, limit: usize) -> Option<Vec<u8>>;

    /// A member joined.
    fn notify_join(&self, name: &str, meta: &[u8], addr: IpAddr);

    /// A member left or was declared dead.
    fn notify_leave(&self, name: &str);

    /// A member changed its metadata. Ignored: nodes rejoin to change it.
    fn notify_update(&self, _name: &str, _meta: &[u8]) {}

    /// Admission gate for a single peer.
    fn notify_alive(&self, meta: &[u8]) -> Result<(), MembershipError>;

    /// Admission gate for a remote membership view.
    fn notify_merge(&self, peers: &[&[u8]]) -> Result<(), MembershipError>;

    fn local_state(&self, _join: bool) -> Vec<u8> {
        Vec::new()
    }

    fn merge_remote_state(&self, _buf: &[u8], _join: bool) {}

    fn notify_message(&self, _msg: &[u8]) {}

    fn broadcast_messages(&self, _overhead: usize, _limit: usize) -> Vec<Vec<u8>> {
        Vec::new()
    }
}
