//! The replicated counter engine.
//!
//! Every node evaluates `select_owners(key, 1)` against its own ring to find
//! a key's master. The master applies commands inside one storage batch and
//! then pushes the resulting entry to every member of the broadcast list
//! without waiting for acknowledgments.

use crate::cluster::ClusterMembership;
use crate::counter::entry::CounterEntry;
use crate::counter::CounterCommand;
use crate::error::StorageError;
use crate::metrics::EngineMetrics;
use crate::network::rpc::{
    DirectRequest, DirectResponse, DirectStatus, IndirectRequest, Message, ReplicationRequest,
    ReplicationResponse, ReplicationStatus,
};
use crate::network::MessageHandler;
use crate::storage::KvStore;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Default storage bucket for counter entries.
pub const DEFAULT_BUCKET: &str = "counter";

/// Metric label for direct requests naming no known command.
pub const UNKNOWN_COMMAND_LABEL: &str = "unknown";

/// Request handler for counter RPCs.
pub struct CounterEngine {
    cluster: Arc<ClusterMembership>,
    store: Arc<dyn KvStore>,
    bucket: String,
    metrics: EngineMetrics,
}

impl CounterEngine {
    pub fn new(cluster: Arc<ClusterMembership>, store: Arc<dyn KvStore>) -> Self {
        Self::with_bucket(cluster, store, DEFAULT_BUCKET)
    }

    pub fn with_bucket(
        cluster: Arc<ClusterMembership>,
        store: Arc<dyn KvStore>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            store,
            bucket: bucket.into(),
            metrics: EngineMetrics::new(),
        }
    }

    pub fn cluster(&self) -> &Arc<ClusterMembership> {
        &self.cluster
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// The locally stored entry for `key`. Absent or corrupt values read as
    /// empty.
    pub fn read(&self, key: &[u8]) -> Result<CounterEntry, StorageError> {
        let stored = self.store.get(&self.bucket, key)?;
        Ok(CounterEntry::from_stored(stored.as_deref()))
    }

    /// Route a request to the key's master, executing it here if this node
    /// is the master.
    pub async fn handle_indirect(&self, req: IndirectRequest) -> DirectResponse {
        let direct = req.to_master;
        let owner = match self.cluster.ring().master(&direct.key) {
            Some(owner) => owner,
            None => {
                self.metrics.routing_errors.inc();
                return DirectResponse::error(DirectStatus::NoRing);
            }
        };

        if !owner.is_remote() {
            return self.handle_direct(direct).await;
        }

        let peer = owner.into_payload();
        let rpc = match peer.rpc() {
            Some(rpc) => rpc.clone(),
            None => {
                warn!(peer = %peer.name(), "Remote master has no RPC client");
                self.metrics.forward_failures.inc();
                return DirectResponse::error(DirectStatus::NetworkError);
            }
        };

        self.metrics.forwarded.inc();
        debug!(peer = %peer.name(), key = ?direct.key, command = %direct.command, "Forwarding to master");

        match rpc.call(Message::Direct(direct)).await {
            Ok(Message::DirectResponse(resp)) => resp,
            Ok(other) => {
                warn!(peer = %peer.name(), response = other.name(), "Unexpected forward response");
                self.metrics.forward_failures.inc();
                DirectResponse::error(DirectStatus::NetworkError)
            }
            Err(e) => {
                warn!(peer = %peer.name(), error = %e, "Forward to master failed");
                self.metrics.forward_failures.inc();
                DirectResponse::error(DirectStatus::NetworkError)
            }
        }
    }

    /// Execute a command on a key this node must own.
    pub async fn handle_direct(&self, req: DirectRequest) -> DirectResponse {
        match self.cluster.ring().master(&req.key) {
            None => {
                self.metrics.routing_errors.inc();
                return DirectResponse::error(DirectStatus::NoRing);
            }
            Some(owner) if owner.is_remote() => {
                debug!(key = ?req.key, master = %owner.payload().name(), "Direct request for a key owned elsewhere");
                self.metrics.routing_errors.inc();
                return DirectResponse::error(DirectStatus::NotMaster);
            }
            Some(_) => {}
        }

        let command = req.command();
        let mut written: Option<Vec<u8>> = None;
        let mut result = Vec::new();

        let outcome = self.store.batch(&self.bucket, &mut |tx| {
            let mut entry = CounterEntry::from_stored(tx.get(&req.key)?.as_deref());
            result = match command {
                Some(cmd) => cmd
                    .apply(&mut entry, &req.args)
                    .map_err(|e| StorageError::Io(e.to_string()))?,
                None => Vec::new(),
            };
            let value = entry.to_bytes().map_err(|e| StorageError::Io(e.to_string()))?;
            tx.put(&req.key, &value)?;
            written = Some(value);
            Ok(())
        });

        if let Err(e) = outcome {
            warn!(key = ?req.key, command = %req.command, error = %e, "Counter update failed");
            self.metrics.storage_errors.inc();
            return DirectResponse::error(DirectStatus::IoError);
        }
        let value = match written {
            Some(value) => value,
            None => {
                warn!(key = ?req.key, command = %req.command, "Batch committed without writing");
                self.metrics.storage_errors.inc();
                return DirectResponse::error(DirectStatus::UpdateFailed);
            }
        };

        // Unrecognized names are client-controlled; keep them out of the label set.
        let label = command.map(CounterCommand::name).unwrap_or(UNKNOWN_COMMAND_LABEL);
        self.metrics.direct_requests.inc(label);
        self.replicate(&req.key, value);
        DirectResponse::ok(result)
    }

    /// Overwrite the stored entry with a master's value.
    pub async fn handle_replication(&self, req: ReplicationRequest) -> ReplicationResponse {
        let outcome = self
            .store
            .batch(&self.bucket, &mut |tx| tx.put(&req.key, &req.value));

        match outcome {
            Ok(()) => {
                self.metrics.replications_applied.inc();
                ReplicationResponse::new(ReplicationStatus::Ok)
            }
            Err(e) => {
                warn!(key = ?req.key, error = %e, "Replication apply failed");
                self.metrics.storage_errors.inc();
                ReplicationResponse::new(ReplicationStatus::IoError)
            }
        }
    }

    /// Push `value` to every broadcast target with an RPC client.
    fn replicate(&self, key: &[u8], value: Vec<u8>) {
        for peer in self.cluster.broadcast_targets() {
            let Some(rpc) = peer.rpc() else {
                continue;
            };
            trace!(peer = %peer.name(), key = ?key, "Replicating counter");
            rpc.send(Message::Replication(ReplicationRequest {
                key: key.to_vec(),
                value: value.clone(),
            }));
            self.metrics.replications_sent.inc();
        }
    }
}

#[async_trait]
impl MessageHandler for CounterEngine {
    async fn handle(&self, peer: SocketAddr, msg: Message) -> Message {
        match msg {
            Message::Indirect(req) => Message::DirectResponse(self.handle_indirect(req).await),
            Message::Direct(req) => Message::DirectResponse(self.handle_direct(req).await),
            Message::Replication(req) => {
                Message::ReplicationResponse(self.handle_replication(req).await)
            }
            other => {
                trace!(peer = %peer, message = other.name(), "Ignoring message");
                Message::Empty
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterNodeDescriptor, MembershipDelegate};
    use crate::partitioning::NodeKey;
    use crate::storage::{MemoryStore, Transaction};
    use crate::testing::{FaultyStore, MockConnector};
    use std::net::{IpAddr, Ipv4Addr};

    const MARKER: &str = "blue";

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))
    }

    fn peer_addr() -> SocketAddr {
        "10.0.0.9:4000".parse().unwrap()
    }

    fn meta(port: u16, id: &[u8]) -> Vec<u8> {
        ClusterNodeDescriptor::new(MARKER, port, id.to_vec())
            .to_bytes()
            .unwrap()
    }

    struct Fixture {
        engine: CounterEngine,
        connector: Arc<MockConnector>,
        store: Arc<MemoryStore>,
    }

    /// Local node "a" plus remote node "b" on port 7001.
    fn fixture(with_remote: bool) -> Fixture {
        let connector = Arc::new(MockConnector::new());
        let cluster = Arc::new(ClusterMembership::new(
            ClusterNodeDescriptor::new(MARKER, 7000, b"a".to_vec()),
            connector.clone(),
        ));
        cluster.notify_join("a", &meta(7000, b"a"), ip());
        if with_remote {
            cluster.notify_join("b", &meta(7001, b"b"), ip());
        }
        let store = Arc::new(MemoryStore::new());
        let engine = CounterEngine::new(cluster, store.clone());
        Fixture {
            engine,
            connector,
            store,
        }
    }

    /// A key whose master is the node with id `owner` in a ring of "a" and "b".
    fn key_owned_by(owner: &[u8]) -> Vec<u8> {
        let (a, b) = (NodeKey::digest(b"a"), NodeKey::digest(b"b"));
        (0u32..)
            .map(|i| format!("key-{i}").into_bytes())
            .find(|k| {
                let h = NodeKey::digest(k);
                let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                let master = if h > lo && h <= hi { hi } else { lo };
                master == NodeKey::digest(owner)
            })
            .unwrap()
    }

    fn ticket(resp: &DirectResponse) -> i64 {
        bincode::deserialize(&resp.result).unwrap()
    }

    fn increment(key: &[u8]) -> DirectRequest {
        DirectRequest::new(key.to_vec(), CounterCommand::Increment, Vec::new())
    }

    #[tokio::test]
    async fn test_empty_ring_is_no_ring() {
        let connector = Arc::new(MockConnector::new());
        let cluster = Arc::new(ClusterMembership::new(
            ClusterNodeDescriptor::new(MARKER, 7000, b"a".to_vec()),
            connector,
        ));
        let engine = CounterEngine::new(cluster, Arc::new(MemoryStore::new()));

        let resp = engine.handle_direct(increment(b"k")).await;
        assert_eq!(resp.status(), DirectStatus::NoRing);
        let resp = engine
            .handle_indirect(IndirectRequest::new(increment(b"k")))
            .await;
        assert_eq!(resp.errno, 1);
        assert_eq!(engine.metrics().routing_errors.get(), 2);
    }

    #[tokio::test]
    async fn test_direct_on_non_owner_is_not_master() {
        let f = fixture(true);
        let key = key_owned_by(b"b");
        let resp = f.engine.handle_direct(increment(&key)).await;
        assert_eq!(resp.status(), DirectStatus::NotMaster);
        assert_eq!(f.store.get("counter", &key).unwrap(), None);
    }

    #[tokio::test]
    async fn test_indirect_forward_failure_leaves_storage_untouched() {
        let f = fixture(true);
        let key = key_owned_by(b"b");
        let remote = f.connector.client(SocketAddr::new(ip(), 7001)).unwrap();
        remote.set_fail(true);

        let resp = f
            .engine
            .handle_indirect(IndirectRequest::new(increment(&key)))
            .await;

        assert_eq!(resp.errno, 5);
        assert_eq!(remote.calls().len(), 1);
        assert!(matches!(&remote.calls()[0], Message::Direct(d) if d.key == key));
        assert!(!f.store.has_bucket("counter"));
        assert_eq!(f.engine.metrics().forward_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_indirect_forward_relays_response() {
        let f = fixture(true);
        let key = key_owned_by(b"b");
        let remote = f.connector.client(SocketAddr::new(ip(), 7001)).unwrap();
        remote.respond_with(Message::DirectResponse(DirectResponse::ok(vec![7])));

        let resp = f
            .engine
            .handle_indirect(IndirectRequest::new(increment(&key)))
            .await;
        assert_eq!(resp, DirectResponse::ok(vec![7]));
        assert_eq!(f.engine.metrics().forwarded.get(), 1);
    }

    #[tokio::test]
    async fn test_indirect_for_local_key_executes_here() {
        let f = fixture(true);
        let key = key_owned_by(b"a");

        let resp = f
            .engine
            .handle_indirect(IndirectRequest::new(increment(&key)))
            .await;
        assert!(resp.is_ok());
        assert_eq!(ticket(&resp), 1);
        assert_eq!(f.engine.read(&key).unwrap(), CounterEntry::new(1, 1, 1));
    }

    #[tokio::test]
    async fn test_increment_rollback_lifecycle() {
        let f = fixture(false);
        let key = b"k".to_vec();

        assert_eq!(ticket(&f.engine.handle_direct(increment(&key)).await), 1);
        assert_eq!(ticket(&f.engine.handle_direct(increment(&key)).await), 2);
        assert_eq!(f.engine.read(&key).unwrap(), CounterEntry::new(1, 2, 2));

        let rollback = |t: i64| {
            DirectRequest::new(
                key.clone(),
                CounterCommand::Rollback,
                bincode::serialize(&t).unwrap(),
            )
        };
        assert!(f.engine.handle_direct(rollback(2)).await.is_ok());
        assert_eq!(f.engine.read(&key).unwrap(), CounterEntry::new(1, 1, 1));
        assert!(f.engine.handle_direct(rollback(1)).await.is_ok());
        assert!(f.engine.read(&key).unwrap().is_empty());

        let snapshot = f.engine.metrics().direct_requests.get_all();
        assert_eq!(
            snapshot,
            vec![("Increment".to_string(), 2), ("Rollback".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_replace_and_remold() {
        let f = fixture(false);
        let key = b"k".to_vec();
        let args = CounterEntry::new(3, 9, 4).to_bytes().unwrap();

        let resp = f
            .engine
            .handle_direct(DirectRequest::new(key.clone(), CounterCommand::Replace, args))
            .await;
        assert!(resp.is_ok());
        assert!(resp.result.is_empty());
        assert_eq!(f.engine.read(&key).unwrap(), CounterEntry::new(3, 9, 4));

        let baseline = CounterEntry::new(5, 0, 1).to_bytes().unwrap();
        f.engine
            .handle_direct(DirectRequest::new(key.clone(), CounterCommand::Remold, baseline))
            .await;
        assert_eq!(f.engine.read(&key).unwrap(), CounterEntry::new(5, 9, 3));
    }

    #[tokio::test]
    async fn test_unknown_command_leaves_entry_unchanged() {
        let f = fixture(false);
        let key = b"k".to_vec();
        f.engine.handle_direct(increment(&key)).await;

        let mut req = increment(&key);
        req.command = "Explode".to_string();
        let resp = f.engine.handle_direct(req).await;
        assert!(resp.is_ok());
        assert!(resp.result.is_empty());
        assert_eq!(f.engine.read(&key).unwrap(), CounterEntry::new(1, 1, 1));
    }

    #[tokio::test]
    async fn test_unknown_commands_share_one_metric_label() {
        let f = fixture(false);
        let key = b"k".to_vec();
        for i in 0..50 {
            let mut req = increment(&key);
            req.command = format!("Bogus{i}");
            assert!(f.engine.handle_direct(req).await.is_ok());
        }
        f.engine.handle_direct(increment(&key)).await;

        let snapshot = f.engine.metrics().direct_requests.get_all();
        assert_eq!(
            snapshot,
            vec![("Increment".to_string(), 1), ("unknown".to_string(), 50)]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_hand_out_unique_tickets() {
        const TASKS: i64 = 8;
        const PER_TASK: i64 = 50;

        let engine = Arc::new(fixture(false).engine);
        let handles: Vec<_> = (0..TASKS)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let mut tickets = Vec::new();
                    for _ in 0..PER_TASK {
                        let resp = engine.handle_direct(increment(b"shared")).await;
                        assert!(resp.is_ok());
                        tickets.push(ticket(&resp));
                    }
                    tickets
                })
            })
            .collect();

        let mut tickets = Vec::new();
        for handle in handles {
            tickets.extend(handle.await.unwrap());
        }
        tickets.sort_unstable();

        let expected: Vec<i64> = (1..=TASKS * PER_TASK).collect();
        assert_eq!(tickets, expected);
        assert_eq!(
            engine.read(b"shared").unwrap(),
            CounterEntry::new(1, TASKS * PER_TASK, TASKS * PER_TASK)
        );
    }

    #[tokio::test]
    async fn test_corrupt_stored_value_reads_as_empty() {
        let f = fixture(false);
        f.store
            .batch("counter", &mut |tx: &mut dyn Transaction| tx.put(b"k", b"\x01"))
            .unwrap();

        let resp = f.engine.handle_direct(increment(b"k")).await;
        assert_eq!(ticket(&resp), 1);
    }

    #[tokio::test]
    async fn test_success_replicates_to_every_remote_target() {
        let f = fixture(true);
        let key = key_owned_by(b"a");
        let remote = f.connector.client(SocketAddr::new(ip(), 7001)).unwrap();

        let resp = f.engine.handle_direct(increment(&key)).await;
        assert!(resp.is_ok());

        let expected = CounterEntry::new(1, 1, 1).to_bytes().unwrap();
        assert_eq!(
            remote.sent(),
            vec![Message::Replication(ReplicationRequest {
                key: key.clone(),
                value: expected,
            })]
        );
        // The local broadcast entry has no client and is skipped.
        assert_eq!(f.engine.metrics().replications_sent.get(), 1);
    }

    #[tokio::test]
    async fn test_failed_update_does_not_replicate() {
        let f = fixture(true);
        let remote = f.connector.client(SocketAddr::new(ip(), 7001)).unwrap();
        let key = key_owned_by(b"a");
        let engine = CounterEngine::new(f.engine.cluster().clone(), Arc::new(FaultyStore::failing()));

        let resp = engine.handle_direct(increment(&key)).await;
        assert_eq!(resp.status(), DirectStatus::IoError);
        assert!(remote.sent().is_empty());
    }

    #[tokio::test]
    async fn test_commit_without_write_is_update_failed() {
        let f = fixture(false);
        let engine = CounterEngine::new(f.engine.cluster().clone(), Arc::new(FaultyStore::skipping()));

        let resp = engine.handle_direct(increment(b"k")).await;
        assert_eq!(resp.status(), DirectStatus::UpdateFailed);
        assert_eq!(engine.metrics().storage_errors.get(), 1);
    }

    #[tokio::test]
    async fn test_replication_overwrites_unconditionally() {
        let f = fixture(false);
        f.engine.handle_direct(increment(b"k")).await;

        let value = CounterEntry::new(1, 5, 3).to_bytes().unwrap();
        let resp = f
            .engine
            .handle(
                peer_addr(),
                Message::Replication(ReplicationRequest {
                    key: b"k".to_vec(),
                    value,
                }),
            )
            .await;

        assert_eq!(
            resp,
            Message::ReplicationResponse(ReplicationResponse::new(ReplicationStatus::Ok))
        );
        assert_eq!(f.engine.read(b"k").unwrap(), CounterEntry::new(1, 5, 3));
    }

    #[tokio::test]
    async fn test_replication_failure_reports_io_error() {
        let f = fixture(false);
        let engine = CounterEngine::new(f.engine.cluster().clone(), Arc::new(FaultyStore::failing()));
        let resp = engine
            .handle_replication(ReplicationRequest {
                key: b"k".to_vec(),
                value: vec![],
            })
            .await;
        assert!(!resp.is_ok());
        assert_eq!(resp.errno, 1);
    }

    #[tokio::test]
    async fn test_other_messages_get_empty_ack() {
        let f = fixture(false);
        let resp = f.engine.handle(peer_addr(), Message::Empty).await;
        assert_eq!(resp, Message::Empty);
        let resp = f
            .engine
            .handle(peer_addr(), Message::DirectResponse(DirectResponse::ok(vec![])))
            .await;
        assert_eq!(resp, Message::Empty);
    }
}
