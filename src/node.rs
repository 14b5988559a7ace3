//! Process wiring for a counter node.

use crate::cluster::{ClusterMembership, ClusterNodeDescriptor, MembershipDelegate};
use crate::config::CounterConfig;
use crate::counter::{CounterClient, CounterEngine};
use crate::error::{Error, Result};
use crate::metrics::MetricsSnapshot;
use crate::network::{MessageRegistry, NetworkServer, TcpConnector, TcpRpcClient};
use crate::storage::KvStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

#[cfg(feature = "memberlist")]
use crate::cluster::{MemberlistCluster, MemberlistClusterConfig};

/// A started node: RPC server, membership adapter and counter engine.
pub struct CounterNode {
    config: CounterConfig,
    registry: Arc<MessageRegistry>,
    cluster: Arc<ClusterMembership>,
    engine: Arc<CounterEngine>,
    rpc_addr: SocketAddr,
}

/// Stops a node's background tasks.
pub struct ShutdownHandle {
    shutdown_tx: mpsc::Sender<()>,
    server: JoinHandle<Result<()>>,
    #[cfg(feature = "memberlist")]
    gossip: Option<MemberlistCluster>,
}

impl ShutdownHandle {
    /// Leave the gossip cluster, stop accepting RPCs and wait for the
    /// accept loop to exit.
    pub async fn shutdown(self) -> Result<()> {
        #[cfg(feature = "memberlist")]
        if let Some(mut gossip) = self.gossip {
            gossip.shutdown().await?;
        }

        let _ = self.shutdown_tx.send(()).await;
        self.server
            .await
            .map_err(|e| Error::Internal(format!("server task failed: {e}")))?
    }
}

impl CounterNode {
    /// Bind the RPC listener, build the membership adapter and engine, and
    /// run the server in a background task.
    ///
    /// The local node joins its own ring immediately. Remote peers arrive
    /// through [`cluster`](Self::cluster) callbacks, driven by the gossip
    /// bridge when enabled or by the host process otherwise.
    pub async fn start(
        config: CounterConfig,
        store: Arc<dyn KvStore>,
    ) -> Result<(Self, ShutdownHandle)> {
        config.validate()?;

        let registry = Arc::new(MessageRegistry::standard());
        let (server, shutdown_tx) =
            NetworkServer::bind(config.rpc_addr, registry.clone(), config.max_frame_size).await?;
        let rpc_addr = server.local_addr();

        let descriptor = ClusterNodeDescriptor::new(
            config.marker.clone(),
            rpc_addr.port(),
            config.node_id.clone(),
        );
        let connector = Arc::new(TcpConnector::new(registry.clone(), config.rpc_client_config()));
        let cluster = Arc::new(ClusterMembership::new(descriptor, connector));
        let engine = Arc::new(CounterEngine::with_bucket(
            cluster.clone(),
            store,
            config.bucket.clone(),
        ));

        let server = tokio::spawn(server.run(engine.clone()));

        let meta = cluster.local().to_bytes()?;
        cluster.notify_join(&config.node_name(), &meta, config.advertise_ip());

        #[cfg(feature = "memberlist")]
        let gossip = match config.memberlist.bind_addr {
            Some(bind_addr) => {
                let gossip_config = MemberlistClusterConfig::new(config.node_name(), bind_addr)
                    .with_seed_nodes(config.memberlist.seed_addrs.clone());
                let mut gossip = MemberlistCluster::new(gossip_config, cluster.clone());
                if let Err(e) = gossip.start().await {
                    let _ = shutdown_tx.send(()).await;
                    let _ = server.await;
                    return Err(e.into());
                }
                Some(gossip)
            }
            None => None,
        };

        info!(
            node = %config.node_name(),
            marker = %config.marker,
            rpc_addr = %rpc_addr,
            "Counter node started"
        );

        let node = Self {
            config,
            registry,
            cluster,
            engine,
            rpc_addr,
        };
        let handle = ShutdownHandle {
            shutdown_tx,
            server,
            #[cfg(feature = "memberlist")]
            gossip,
        };
        Ok((node, handle))
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// The bound RPC address.
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    /// Membership adapter; gossip callbacks are delivered here.
    pub fn cluster(&self) -> &Arc<ClusterMembership> {
        &self.cluster
    }

    pub fn engine(&self) -> &Arc<CounterEngine> {
        &self.engine
    }

    /// Descriptor bytes other nodes expect in `notify_join`.
    pub fn node_meta(&self) -> Result<Vec<u8>> {
        Ok(self.cluster.local().to_bytes()?)
    }

    /// Client issuing requests through this node.
    pub fn client(&self) -> CounterClient {
        self.client_for(self.rpc_addr)
    }

    /// Client issuing requests through the node at `addr`.
    pub fn client_for(&self, addr: SocketAddr) -> CounterClient {
        CounterClient::new(Arc::new(TcpRpcClient::new(
            addr,
            self.registry.clone(),
            self.config.rpc_client_config(),
        )))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::capture(self.engine.metrics(), self.cluster.metrics())
    }
}
