//! Consistent hash ring keyed by node digests.
//!
//! Each physical node occupies exactly one position on the ring: the 128-bit
//! digest of its raw node identifier. The owner of a key is the first node
//! whose digest is greater than or equal to the key's digest, wrapping around
//! to the smallest digest when none is.

use super::query::RingQuery;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;

/// Width of a node key in bytes.
pub const NODE_KEY_LEN: usize = 16;

/// A 128-bit digest used as the total-order sort key of the ring.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey([u8; NODE_KEY_LEN]);

impl NodeKey {
    /// Derive the key for a raw identifier (node id or counter key).
    pub fn digest(raw: &[u8]) -> Self {
        let hash = blake3::hash(raw);
        let mut key = [0u8; NODE_KEY_LEN];
        key.copy_from_slice(&hash.as_bytes()[..NODE_KEY_LEN]);
        Self(key)
    }

    /// Wrap an already computed digest.
    pub const fn from_bytes(bytes: [u8; NODE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NODE_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({})", self)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Whether a ring entry is this process or a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Local,
    Remote,
}

/// An entry on the ring.
#[derive(Debug, Clone)]
pub struct RingNode<T> {
    key: NodeKey,
    role: NodeRole,
    payload: T,
}

impl<T> RingNode<T> {
    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_remote(&self) -> bool {
        self.role == NodeRole::Remote
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

#[derive(Debug)]
struct RingState<T> {
    tree: BTreeMap<NodeKey, RingNode<T>>,
    local: Option<NodeKey>,
}

/// Thread-safe ordered set of nodes.
///
/// Writers (`set_local`, `add_remote`, `remove`) take the lock exclusively;
/// `select_owners` and `lookup` only need shared access so routing lookups
/// run concurrently.
#[derive(Debug)]
pub struct HashRing<T> {
    state: RwLock<RingState<T>>,
}

impl<T: Clone> HashRing<T> {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RingState {
                tree: BTreeMap::new(),
                local: None,
            }),
        }
    }

    /// Designate the local node, removing any previous local entry first.
    pub fn set_local(&self, id: &[u8], payload: T) {
        let key = NodeKey::digest(id);
        let mut state = self.state.write();
        if let Some(old) = state.local.take() {
            state.tree.remove(&old);
        }
        state.tree.insert(
            key,
            RingNode {
                key,
                role: NodeRole::Local,
                payload,
            },
        );
        state.local = Some(key);
    }

    /// Insert a remote node. A node with the same digest is replaced.
    pub fn add_remote(&self, id: &[u8], payload: T) {
        let key = NodeKey::digest(id);
        let mut state = self.state.write();
        if state.local == Some(key) {
            state.local = None;
        }
        state.tree.insert(
            key,
            RingNode {
                key,
                role: NodeRole::Remote,
                payload,
            },
        );
    }

    /// Remove the node with the given raw identifier.
    pub fn remove(&self, id: &[u8]) -> Option<RingNode<T>> {
        let key = NodeKey::digest(id);
        let mut state = self.state.write();
        let removed = state.tree.remove(&key);
        if removed.is_some() && state.local == Some(key) {
            state.local = None;
        }
        removed
    }

    /// Remove the node for `id` only if `holds` accepts its payload.
    ///
    /// Check and removal happen under one write lock.
    pub fn remove_if(&self, id: &[u8], holds: impl FnOnce(&T) -> bool) -> Option<RingNode<T>> {
        let key = NodeKey::digest(id);
        let mut state = self.state.write();
        if !state.tree.get(&key).is_some_and(|node| holds(node.payload())) {
            return None;
        }
        let removed = state.tree.remove(&key);
        if state.local == Some(key) {
            state.local = None;
        }
        removed
    }

    /// Exact-match lookup by raw identifier.
    pub fn lookup(&self, id: &[u8]) -> Option<RingNode<T>> {
        let key = NodeKey::digest(id);
        self.state.read().tree.get(&key).cloned()
    }

    /// Walk the ring forward from the digest of `key`, returning up to `count`
    /// nodes. The first entry is the master for `key`.
    pub fn select_owners(&self, key: &[u8], count: usize) -> Vec<RingNode<T>> {
        self.select_owners_at(NodeKey::digest(key), count)
    }

    /// Like [`select_owners`](Self::select_owners) with a precomputed position.
    pub fn select_owners_at(&self, position: NodeKey, count: usize) -> Vec<RingNode<T>> {
        let state = self.state.read();
        RingQuery::new(position, count)
            .apply(&state.tree)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The master for `key`, if the ring is non-empty.
    pub fn master(&self, key: &[u8]) -> Option<RingNode<T>> {
        self.select_owners(key, 1).into_iter().next()
    }

    /// The current local entry.
    pub fn local(&self) -> Option<RingNode<T>> {
        let state = self.state.read();
        state.local.and_then(|k| state.tree.get(&k).cloned())
    }

    /// All entries in ring order.
    pub fn nodes(&self) -> Vec<RingNode<T>> {
        self.state.read().tree.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().tree.is_empty()
    }
}

impl<T: Clone> Default for HashRing<T> {
    fn default() -> Self {
        Self::new()
    }
}
