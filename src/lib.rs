//! Cluster-aware replicated counter store.
//!
//! Nodes discover each other through a gossip layer and place themselves on
//! a consistent-hash ring keyed by a digest of their node id. Every counter
//! key has exactly one master, the first ring node at or after the key's
//! digest. Any node accepts a request and forwards it to the master, which
//! applies the command in one storage transaction and pushes the resulting
//! value to every other member without waiting for acknowledgments.
//!
//! Counters are ticket allocators: `increment` hands out the next ticket,
//! `rollback` returns one, `remold` folds in a baseline and `replace`
//! overwrites the stored entry.
//!
//! # Example
//!
//! ```rust,no_run
//! use counterdb::{CounterConfig, CounterNode, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CounterConfig::new("orders", b"node-1".to_vec(), "127.0.0.1:9000".parse()?);
//!     let (node, shutdown) = CounterNode::start(config, Arc::new(MemoryStore::new())).await?;
//!
//!     let client = node.client();
//!     let ticket = client.increment("invoice").await?;
//!     client.rollback("invoice", ticket).await?;
//!
//!     shutdown.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Consistency Model
//!
//! - **Writes**: serialized per key by the master's storage transaction
//! - **Replicas**: best effort; a missed push is repaired only by the next
//!   successful write of the same key
//! - **Membership churn**: ownership moves with the ring; there is no
//!   handoff of existing values

pub mod cluster;
pub mod config;
pub mod counter;
pub mod error;
pub mod metrics;
pub mod network;
pub mod node;
pub mod partitioning;
pub mod storage;
pub mod testing;

pub use cluster::{ClusterMembership, ClusterNodeDescriptor, MemberEvent, MembershipDelegate};
pub use config::CounterConfig;
pub use counter::{CounterClient, CounterCommand, CounterEngine, CounterEntry};
pub use error::{Error, Result};
pub use metrics::MetricsSnapshot;
pub use network::{DirectStatus, Message, MessageRegistry};
pub use node::{CounterNode, ShutdownHandle};
pub use partitioning::{HashRing, NodeKey};
pub use storage::{KvStore, MemoryStore};

#[cfg(feature = "rocksdb-storage")]
pub use storage::{RocksDbStore, RocksDbStoreConfig};

#[cfg(feature = "memberlist")]
pub use cluster::{MemberlistCluster, MemberlistClusterConfig};
