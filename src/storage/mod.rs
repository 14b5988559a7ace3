//! Transactional key-value storage used by the counter engine.
//!
//! Storage is organised in named buckets. A [`KvStore::batch`] runs a closure
//! as one atomic read-modify-write: its writes are applied only when the
//! closure returns `Ok`, and concurrent batches are serialized by the store.
//! Buckets come into existence on the first committed write.

mod memory;
#[cfg(feature = "rocksdb-storage")]
mod rocksdb;

pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-storage")]
pub use self::rocksdb::{RocksDbStore, RocksDbStoreConfig};

use crate::error::StorageError;

/// Read/write view inside a batch.
pub trait Transaction {
    /// Read a key, observing writes staged earlier in the same batch.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Stage a write.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
}

/// A transactional bucketed key-value store.
pub trait KvStore: Send + Sync + 'static {
    /// Run `f` atomically against `bucket`.
    fn batch(
        &self,
        bucket: &str,
        f: &mut dyn FnMut(&mut dyn Transaction) -> Result<(), StorageError>,
    ) -> Result<(), StorageError>;

    /// Read a committed value outside any batch.
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
}
