//! Partitioning module for assigning counter keys to master nodes.
//!
//! Every node is placed on the ring at the digest of its node identifier.
//! A key is owned by the first node found walking forward from the key's
//! digest, wrapping around at the end of the ring.
//!
//! ```text
//!          digest(key)
//!               │
//!   ┌─────┐     ▼     ┌─────┐         ┌─────┐
//!   │  A  │ ────────▶ │  B  │ ──────▶ │  C  │ ──┐
//!   └─────┘           └─────┘         └─────┘   │
//!      ▲                 master                 │
//!      └────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use counterdb::partitioning::HashRing;
//!
//! let ring = HashRing::new();
//! ring.set_local(b"node-a", "a");
//! ring.add_remote(b"node-b", "b");
//!
//! let master = ring.master(b"user:123").unwrap();
//! println!("master is {} (remote: {})", master.payload(), master.is_remote());
//! ```

mod hashring;
mod query;

pub use hashring::{HashRing, NodeKey, NodeRole, RingNode, NODE_KEY_LEN};
pub use query::RingQuery;
