//! Configuration for a counter node.

use crate::counter::DEFAULT_BUCKET;
use crate::error::{Error, Result};
use crate::network::client::RpcClientConfig;
use crate::network::rpc::DEFAULT_MAX_FRAME_SIZE;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Main configuration for a counter node.
#[derive(Debug, Clone)]
pub struct CounterConfig {
    /// Cluster marker; peers with a different marker are ignored.
    pub marker: String,

    /// Node identifier; its digest is the node's ring position.
    pub node_id: Vec<u8>,

    /// Address to bind for node-to-node RPC.
    pub rpc_addr: SocketAddr,

    /// Address other nodes use to reach this one. Defaults to the RPC bind IP.
    pub advertise_ip: Option<IpAddr>,

    /// Storage bucket holding counter entries.
    pub bucket: String,

    /// Largest accepted RPC frame.
    pub max_frame_size: usize,

    /// Deadline for dialing a peer.
    pub connect_timeout: Duration,

    /// Deadline for a whole peer RPC, including the dial.
    pub request_timeout: Duration,

    /// Replication sends allowed in flight per peer before new ones are dropped.
    pub max_pending_sends: usize,

    /// Gossip-level member name (defaults to "node-<hex of first 4 id bytes>").
    pub node_name: Option<String>,

    /// Memberlist gossip configuration.
    #[cfg(feature = "memberlist")]
    pub memberlist: MemberlistConfig,
}

impl CounterConfig {
    pub fn new(marker: impl Into<String>, node_id: impl Into<Vec<u8>>, rpc_addr: SocketAddr) -> Self {
        Self {
            marker: marker.into(),
            node_id: node_id.into(),
            rpc_addr,
            advertise_ip: None,
            bucket: DEFAULT_BUCKET.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(20),
            max_pending_sends: 1024,
            node_name: None,
            #[cfg(feature = "memberlist")]
            memberlist: MemberlistConfig::default(),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_advertise_ip(mut self, ip: IpAddr) -> Self {
        self.advertise_ip = Some(ip);
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_pending_sends(mut self, max: usize) -> Self {
        self.max_pending_sends = max;
        self
    }

    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = Some(name.into());
        self
    }

    /// Enable memberlist gossip bound to `addr`.
    #[cfg(feature = "memberlist")]
    pub fn with_memberlist_addr(mut self, addr: SocketAddr) -> Self {
        self.memberlist.bind_addr = Some(addr);
        self
    }

    /// Gossip addresses to join on start.
    #[cfg(feature = "memberlist")]
    pub fn with_seed_nodes(mut self, seeds: Vec<SocketAddr>) -> Self {
        self.memberlist.seed_addrs = seeds;
        self
    }

    /// The member name used on the gossip layer.
    pub fn node_name(&self) -> String {
        match &self.node_name {
            Some(name) => name.clone(),
            None => {
                let hex: String = self
                    .node_id
                    .iter()
                    .take(4)
                    .map(|b| format!("{b:02x}"))
                    .collect();
                format!("node-{hex}")
            }
        }
    }

    /// The IP peers should use for this node.
    pub fn advertise_ip(&self) -> IpAddr {
        self.advertise_ip.unwrap_or_else(|| self.rpc_addr.ip())
    }

    /// Settings for outbound peer RPCs.
    pub fn rpc_client_config(&self) -> RpcClientConfig {
        RpcClientConfig {
            max_frame_size: self.max_frame_size,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            max_pending_sends: self.max_pending_sends,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.marker.is_empty() {
            return Err(Error::Config("marker must not be empty".to_string()));
        }
        if self.node_id.is_empty() {
            return Err(Error::Config("node id must not be empty".to_string()));
        }
        if self.bucket.is_empty() {
            return Err(Error::Config("bucket must not be empty".to_string()));
        }
        if self.max_frame_size == 0 {
            return Err(Error::Config("max frame size must be positive".to_string()));
        }
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(Error::Config("rpc timeouts must be positive".to_string()));
        }
        Ok(())
    }
}

/// Memberlist gossip configuration.
#[cfg(feature = "memberlist")]
#[derive(Debug, Clone, Default)]
pub struct MemberlistConfig {
    /// Address to bind for gossip. Gossip is disabled when unset.
    pub bind_addr: Option<SocketAddr>,

    /// Seed nodes to join (addresses only).
    pub seed_addrs: Vec<SocketAddr>,
}
