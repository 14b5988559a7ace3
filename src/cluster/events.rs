//! Cluster membership events.

/// A change applied to the local membership view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberEvent {
    /// A member was accepted into the ring.
    Joined {
        /// Gossip-level member name.
        name: String,
        /// Raw node identifier.
        node_id: Vec<u8>,
        /// Whether the member is this process.
        local: bool,
    },

    /// A member was removed from the ring.
    Left {
        name: String,
        node_id: Vec<u8>,
    },
}

impl MemberEvent {
    pub fn name(&self) -> &str {
        match self {
            MemberEvent::Joined { name, .. } => name,
            MemberEvent::Left { name, .. } => name,
        }
    }

    pub fn node_id(&self) -> &[u8] {
        match self {
            MemberEvent::Joined { node_id, .. } => node_id,
            MemberEvent::Left { node_id, .. } => node_id,
        }
    }

    pub fn is_join(&self) -> bool {
        matches!(self, MemberEvent::Joined { .. })
    }
}

/// Observer of membership changes, e.g. for ownership-change hooks.
pub trait MemberEventListener: Send + Sync {
    fn on_event(&self, event: &MemberEvent);
}
