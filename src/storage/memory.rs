//! In-memory store.

use super::{KvStore, Transaction};
use crate::error::StorageError;
use parking_lot::Mutex;
use std::collections::HashMap;

type Bucket = HashMap<Vec<u8>, Vec<u8>>;

/// Volatile store; one mutex serializes all batches.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `bucket` has been created.
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.lock().contains_key(bucket)
    }

    /// Number of keys in `bucket`.
    pub fn len(&self, bucket: &str) -> usize {
        self.buckets.lock().get(bucket).map_or(0, |b| b.len())
    }
}

struct MemoryTransaction<'a> {
    base: Option<&'a Bucket>,
    writes: Bucket,
}

impl Transaction for MemoryTransaction<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(v) = self.writes.get(key) {
            return Ok(Some(v.clone()));
        }
        Ok(self.base.and_then(|b| b.get(key).cloned()))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.writes.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

impl KvStore for MemoryStore {
    fn batch(
        &self,
        bucket: &str,
        f: &mut dyn FnMut(&mut dyn Transaction) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        let mut buckets = self.buckets.lock();
        let mut tx = MemoryTransaction {
            base: buckets.get(bucket),
            writes: HashMap::new(),
        };
        f(&mut tx)?;

        let MemoryTransaction { writes, .. } = tx;
        if !writes.is_empty() {
            buckets.entry(bucket.to_string()).or_default().extend(writes);
        }
        Ok(())
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .buckets
            .lock()
            .get(bucket)
            .and_then(|b| b.get(key).cloned()))
    }
}
