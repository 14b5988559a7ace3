//! Gossip bridge: drives [`ClusterMembership`] from a `memberlist` instance.
//!
//! The event delegate forwards join/leave/update notifications and the node
//! delegate serves the local descriptor as node metadata. The alive and merge
//! delegates run the adapter's admission checks, so peers carrying foreign or
//! undecodable metadata are refused by the gossip layer itself. Payload
//! broadcast and push/pull state stay empty.

#![cfg(feature = "memberlist")]

use crate::cluster::delegate::MembershipDelegate;
use crate::cluster::membership::ClusterMembership;
use crate::error::MembershipError;
use memberlist::delegate::{
    AliveDelegate, CompositeDelegate, EventDelegate, MergeDelegate, NodeDelegate,
};
use memberlist::net::resolver::socket_addr::SocketAddrResolver;
use memberlist::net::stream_layer::tcp::Tcp;
use memberlist::net::{NetTransport, NetTransportOptions};
use memberlist::proto::Meta;
use memberlist::tokio::TokioRuntime;
use memberlist::{Memberlist, Options};
use smol_str::SmolStr;
use std::borrow::Cow;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type Transport = NetTransport<
    SmolStr,
    SocketAddrResolver<TokioRuntime>,
    Tcp<TokioRuntime>,
    TokioRuntime,
>;

/// CompositeDelegate<I, Address, A, C, E, M, N, P> with the alive (A), event
/// (E), merge (M) and node (N) slots filled.
type GossipDelegate = CompositeDelegate<
    SmolStr,
    SocketAddr,
    GossipAliveDelegate,
    memberlist::delegate::VoidDelegate<SmolStr, SocketAddr>,
    GossipEventDelegate,
    GossipMergeDelegate,
    GossipNodeDelegate,
    memberlist::delegate::VoidDelegate<SmolStr, SocketAddr>,
>;

/// Gossip transport settings.
#[derive(Debug, Clone)]
pub struct MemberlistClusterConfig {
    pub node_name: String,
    pub bind_addr: SocketAddr,
    pub advertise_addr: Option<SocketAddr>,
    pub seed_nodes: Vec<SocketAddr>,
}

impl MemberlistClusterConfig {
    pub fn new(node_name: impl Into<String>, bind_addr: SocketAddr) -> Self {
        Self {
            node_name: node_name.into(),
            bind_addr,
            advertise_addr: None,
            seed_nodes: Vec::new(),
        }
    }

    pub fn with_seed_nodes(mut self, seeds: Vec<SocketAddr>) -> Self {
        self.seed_nodes = seeds;
        self
    }

    pub fn with_advertise_addr(mut self, addr: SocketAddr) -> Self {
        self.advertise_addr = Some(addr);
        self
    }
}

/// Forwards membership events to the adapter.
pub struct GossipEventDelegate {
    membership: Arc<ClusterMembership>,
}

impl EventDelegate for GossipEventDelegate {
    type Id = SmolStr;
    type Address = SocketAddr;

    fn notify_join(
        &self,
        node: Arc<memberlist::proto::NodeState<Self::Id, Self::Address>>,
    ) -> impl Future<Output = ()> + Send {
        self.membership
            .notify_join(node.id().as_str(), node.meta(), node.address().ip());
        async {}
    }

    fn notify_leave(
        &self,
        node: Arc<memberlist::proto::NodeState<Self::Id, Self::Address>>,
    ) -> impl Future<Output = ()> + Send {
        self.membership.notify_leave(node.id().as_str());
        async {}
    }

    fn notify_update(
        &self,
        node: Arc<memberlist::proto::NodeState<Self::Id, Self::Address>>,
    ) -> impl Future<Output = ()> + Send {
        self.membership.notify_update(node.id().as_str(), node.meta());
        async {}
    }
}

/// Refuses alive messages from peers outside this cluster.
pub struct GossipAliveDelegate {
    membership: Arc<ClusterMembership>,
}

impl AliveDelegate for GossipAliveDelegate {
    type Id = SmolStr;
    type Address = SocketAddr;
    type Error = MembershipError;

    fn notify_alive(
        &self,
        peer: Arc<memberlist::proto::NodeState<Self::Id, Self::Address>>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let result = self.membership.notify_alive(peer.meta());
        if result.is_err() {
            debug!(peer = %peer.id(), "Refused alive message");
        }
        async move { result }
    }
}

/// Refuses a push/pull merge when any remote peer is outside this cluster.
pub struct GossipMergeDelegate {
    membership: Arc<ClusterMembership>,
}

impl MergeDelegate for GossipMergeDelegate {
    type Id = SmolStr;
    type Address = SocketAddr;
    type Error = MembershipError;

    fn notify_merge(
        &self,
        peers: Arc<[memberlist::proto::NodeState<Self::Id, Self::Address>]>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let metas: Vec<&[u8]> = peers.iter().map(|peer| &**peer.meta()).collect();
        let result = self.membership.notify_merge(&metas);
        if result.is_err() {
            debug!(peers = peers.len(), "Refused cluster merge");
        }
        async move { result }
    }
}

/// Serves the local descriptor as gossip metadata.
pub struct GossipNodeDelegate {
    membership: Arc<ClusterMembership>,
}

impl NodeDelegate for GossipNodeDelegate {
    fn node_meta(&self, limit: usize) -> impl Future<Output = Meta> + Send {
        let meta = match self.membership.node_meta(limit) {
            Some(bytes) => Meta::try_from(bytes).unwrap_or_else(|_| Meta::empty()),
            None => {
                warn!(limit, "Local descriptor does not fit in gossip metadata");
                Meta::empty()
            }
        };
        async move { meta }
    }

    fn notify_message(&self, _msg: Cow<'_, [u8]>) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn broadcast_messages<F>(
        &self,
        _limit: usize,
        _encoded_len: F,
    ) -> impl Future<Output = impl Iterator<Item = bytes::Bytes> + Send> + Send
    where
        F: Fn(bytes::Bytes) -> (usize, bytes::Bytes) + Send + Sync + 'static,
    {
        async { std::iter::empty() }
    }

    fn local_state(&self, _join: bool) -> impl Future<Output = bytes::Bytes> + Send {
        async { bytes::Bytes::new() }
    }

    fn merge_remote_state(&self, _buf: &[u8], _join: bool) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// A running (or not yet started) gossip member.
pub struct MemberlistCluster {
    config: MemberlistClusterConfig,
    membership: Arc<ClusterMembership>,
    memberlist: Option<Arc<Memberlist<Transport, GossipDelegate>>>,
}

impl MemberlistCluster {
    pub fn new(config: MemberlistClusterConfig, membership: Arc<ClusterMembership>) -> Self {
        Self {
            config,
            membership,
            memberlist: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.memberlist.is_some()
    }

    pub fn membership(&self) -> &Arc<ClusterMembership> {
        &self.membership
    }

    /// Bind the gossip transport and join the configured seeds.
    ///
    /// Seeds that cannot be reached are logged and skipped.
    pub async fn start(&mut self) -> Result<(), MembershipError> {
        info!(
            node = %self.config.node_name,
            bind_addr = %self.config.bind_addr,
            "Starting memberlist"
        );

        let delegate: GossipDelegate = CompositeDelegate::new()
            .with_alive_delegate(GossipAliveDelegate {
                membership: self.membership.clone(),
            })
            .with_merge_delegate(GossipMergeDelegate {
                membership: self.membership.clone(),
            })
            .with_node_delegate(GossipNodeDelegate {
                membership: self.membership.clone(),
            })
            .with_event_delegate(GossipEventDelegate {
                membership: self.membership.clone(),
            });

        let node_name: SmolStr = self.config.node_name.as_str().into();
        let mut transport_opts = NetTransportOptions::<
            SmolStr,
            SocketAddrResolver<TokioRuntime>,
            Tcp<TokioRuntime>,
        >::new(node_name);
        transport_opts.add_bind_address(self.config.bind_addr.into());
        if let Some(advertise_addr) = self.config.advertise_addr {
            transport_opts = transport_opts.with_advertise_address(advertise_addr.into());
        }

        let memberlist = Memberlist::with_delegate(delegate, transport_opts, Options::local())
            .await
            .map_err(|e| MembershipError::Gossip(e.to_string()))?;

        for seed in &self.config.seed_nodes {
            let node = memberlist::transport::Node::new(
                format!("seed-{}", seed).into(),
                memberlist::proto::MaybeResolvedAddress::Resolved(*seed),
            );
            match memberlist.join(node).await {
                Ok(_) => debug!(seed = %seed, "Joined seed node"),
                Err(e) => warn!(seed = %seed, error = %e, "Failed to join seed node"),
            }
        }

        self.memberlist = Some(Arc::new(memberlist));
        Ok(())
    }

    /// Announce departure and stop gossiping.
    pub async fn shutdown(&mut self) -> Result<(), MembershipError> {
        if let Some(memberlist) = self.memberlist.take() {
            info!(node = %self.config.node_name, "Leaving memberlist");
            memberlist
                .leave(Duration::from_secs(5))
                .await
                .map_err(|e| MembershipError::Gossip(e.to_string()))?;
            memberlist
                .shutdown()
                .await
                .map_err(|e| MembershipError::Gossip(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterNodeDescriptor;
    use crate::testing::MockConnector;

    #[test]
    fn test_config_builder() {
        let bind: SocketAddr = "127.0.0.1:7946".parse().unwrap();
        let seed: SocketAddr = "127.0.0.1:7947".parse().unwrap();
        let config = MemberlistClusterConfig::new("node-01", bind)
            .with_seed_nodes(vec![seed])
            .with_advertise_addr(bind);
        assert_eq!(config.seed_nodes, vec![seed]);
        assert_eq!(config.advertise_addr, Some(bind));
    }

    #[tokio::test]
    async fn test_not_started_until_start() {
        let membership = Arc::new(ClusterMembership::new(
            ClusterNodeDescriptor::new("blue", 7000, b"a".to_vec()),
            Arc::new(MockConnector::new()),
        ));
        let mut cluster = MemberlistCluster::new(
            MemberlistClusterConfig::new("node-a", "127.0.0.1:0".parse().unwrap()),
            membership,
        );
        assert!(!cluster.is_initialized());
        cluster.shutdown().await.unwrap();
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn member(marker: &str, id: &[u8], rpc_port: u16) -> Arc<ClusterMembership> {
        Arc::new(ClusterMembership::new(
            ClusterNodeDescriptor::new(marker, rpc_port, id.to_vec()),
            Arc::new(MockConnector::new()),
        ))
    }

    #[tokio::test]
    async fn test_foreign_cluster_is_refused_by_gossip() {
        let blue = member("blue", b"a", 7001);
        let red = member("red", b"b", 7002);

        let blue_addr: SocketAddr = format!("127.0.0.1:{}", free_port()).parse().unwrap();
        let mut blue_gossip =
            MemberlistCluster::new(MemberlistClusterConfig::new("node-a", blue_addr), blue.clone());
        blue_gossip.start().await.unwrap();

        let red_addr: SocketAddr = format!("127.0.0.1:{}", free_port()).parse().unwrap();
        let mut red_gossip = MemberlistCluster::new(
            MemberlistClusterConfig::new("node-b", red_addr).with_seed_nodes(vec![blue_addr]),
            red.clone(),
        );
        red_gossip.start().await.unwrap();

        let refused = crate::testing::wait_for(
            || blue.metrics().rejected_admissions.get() > 0 || red.metrics().rejected_admissions.get() > 0,
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await;
        assert!(refused);
        assert!(blue.peer("node-b").is_none());
        assert!(red.peer("node-a").is_none());

        let _ = red_gossip.shutdown().await;
        let _ = blue_gossip.shutdown().await;
    }

    #[tokio::test]
    async fn test_same_cluster_is_admitted_by_gossip() {
        let a = member("blue", b"a", 7001);
        let b = member("blue", b"b", 7002);

        let a_addr: SocketAddr = format!("127.0.0.1:{}", free_port()).parse().unwrap();
        let mut a_gossip =
            MemberlistCluster::new(MemberlistClusterConfig::new("node-a", a_addr), a.clone());
        a_gossip.start().await.unwrap();

        let b_addr: SocketAddr = format!("127.0.0.1:{}", free_port()).parse().unwrap();
        let mut b_gossip = MemberlistCluster::new(
            MemberlistClusterConfig::new("node-b", b_addr).with_seed_nodes(vec![a_addr]),
            b.clone(),
        );
        b_gossip.start().await.unwrap();

        let joined = crate::testing::wait_for(
            || a.peer("node-b").is_some() && b.peer("node-a").is_some(),
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await;
        assert!(joined);
        assert_eq!(a.metrics().rejected_admissions.get(), 0);

        let _ = b_gossip.shutdown().await;
        let _ = a_gossip.shutdown().await;
    }
}
