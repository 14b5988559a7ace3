//! Cluster membership: peer descriptors, the membership adapter that keeps
//! the hash ring in sync with gossip events, and the optional gossip bridge.

pub mod broadcast;
pub mod delegate;
pub mod descriptor;
pub mod events;
pub mod membership;
#[cfg(feature = "memberlist")]
pub mod memberlist_cluster;
pub mod peer;

pub use broadcast::BroadcastList;
pub use delegate::MembershipDelegate;
pub use descriptor::ClusterNodeDescriptor;
pub use events::{MemberEvent, MemberEventListener};
pub use membership::{ClusterMembership, ClusterRing};
#[cfg(feature = "memberlist")]
pub use memberlist_cluster::{MemberlistCluster, MemberlistClusterConfig};
pub use peer::PeerEntry;
