//! Flat list of members that receive replication pushes.
//!
//! Each entry remembers its own index so removal is O(1): the removed slot is
//! filled with the last element, whose stored index is updated, and the list
//! shrinks by one.

use crate::cluster::peer::{PeerEntry, NOT_LISTED};
use parking_lot::Mutex;
use std::sync::Arc;

/// Swap-remove list of peers guarded by its own lock.
#[derive(Debug, Default)]
pub struct BroadcastList {
    entries: Mutex<Vec<Arc<PeerEntry>>>,
}

impl BroadcastList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and record its index.
    pub fn insert(&self, entry: Arc<PeerEntry>) {
        let mut entries = self.entries.lock();
        entry.set_list_position(entries.len() as isize);
        entries.push(entry);
    }

    /// Remove an entry by its stored index.
    ///
    /// Returns `false` without touching the list when the stored index is out
    /// of range or points at a different entry.
    pub fn remove(&self, entry: &Arc<PeerEntry>) -> bool {
        let mut entries = self.entries.lock();
        let pos = entry.list_position();
        if pos < 0 {
            return false;
        }
        let pos = pos as usize;
        if pos >= entries.len() || !Arc::ptr_eq(&entries[pos], entry) {
            return false;
        }

        let removed = entries.swap_remove(pos);
        if let Some(moved) = entries.get(pos) {
            moved.set_list_position(pos as isize);
        }
        removed.set_list_position(NOT_LISTED);
        true
    }

    /// Copy of the current list, for iteration without holding the lock.
    pub fn snapshot(&self) -> Vec<Arc<PeerEntry>> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
