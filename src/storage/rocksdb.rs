//! RocksDB-backed store.
//!
//! Each bucket maps to a column family. Column families are created on the
//! first committed write to a bucket and reopened on restart.

#![cfg(feature = "rocksdb-storage")]

use super::{KvStore, Transaction};
use crate::error::StorageError;
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, DBWithThreadMode, Options, SingleThreaded, WriteBatch, WriteOptions};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Configuration for [`RocksDbStore`].
#[derive(Debug, Clone)]
pub struct RocksDbStoreConfig {
    /// Path to the database directory.
    pub path: String,

    /// Whether to sync writes to disk before a batch returns.
    pub sync_writes: bool,

    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Maximum number of open files for RocksDB.
    pub max_open_files: i32,
}

impl Default for RocksDbStoreConfig {
    fn default() -> Self {
        Self {
            path: "counter-storage".to_string(),
            sync_writes: true,
            create_if_missing: true,
            max_open_files: 1000,
        }
    }
}

impl RocksDbStoreConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }
}

/// Persistent store. Batches are serialized by a mutex around the database,
/// which also guards column family creation.
pub struct RocksDbStore {
    db: Mutex<DBWithThreadMode<SingleThreaded>>,
    write_opts: WriteOptions,
}

impl std::fmt::Debug for RocksDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbStore").finish_non_exhaustive()
    }
}

impl RocksDbStore {
    pub fn open(config: RocksDbStoreConfig) -> Result<Self, StorageError> {
        let path = Path::new(&config.path);

        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);

        // A fresh directory has no column family list yet.
        let families = DBWithThreadMode::<SingleThreaded>::list_cf(&opts, path)
            .unwrap_or_else(|_| vec![rocksdb::DEFAULT_COLUMN_FAMILY_NAME.to_string()]);

        let db = DBWithThreadMode::<SingleThreaded>::open_cf(&opts, path, &families)
            .map_err(|e| StorageError::RocksDb(e.to_string()))?;

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(config.sync_writes);

        info!(path = %config.path, buckets = families.len(), "RocksDB store opened");

        Ok(Self {
            db: Mutex::new(db),
            write_opts,
        })
    }

    /// Whether a column family exists for `bucket`.
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.db.lock().cf_handle(bucket).is_some()
    }
}

struct RocksTransaction<'a> {
    db: &'a DBWithThreadMode<SingleThreaded>,
    cf: Option<&'a ColumnFamily>,
    writes: HashMap<Vec<u8>, Vec<u8>>,
}

impl Transaction for RocksTransaction<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(v) = self.writes.get(key) {
            return Ok(Some(v.clone()));
        }
        match self.cf {
            Some(cf) => self
                .db
                .get_cf(cf, key)
                .map_err(|e| StorageError::RocksDb(e.to_string())),
            None => Ok(None),
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.writes.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

impl KvStore for RocksDbStore {
    fn batch(
        &self,
        bucket: &str,
        f: &mut dyn FnMut(&mut dyn Transaction) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::InvalidBucket(bucket.to_string()));
        }

        let mut db = self.db.lock();
        let writes = {
            let mut tx = RocksTransaction {
                db: &db,
                cf: db.cf_handle(bucket),
                writes: HashMap::new(),
            };
            f(&mut tx)?;
            tx.writes
        };
        if writes.is_empty() {
            return Ok(());
        }

        if db.cf_handle(bucket).is_none() {
            db.create_cf(bucket, &Options::default())
                .map_err(|e| StorageError::RocksDb(e.to_string()))?;
            debug!(bucket, "Created column family");
        }
        let cf = db
            .cf_handle(bucket)
            .ok_or_else(|| StorageError::InvalidBucket(bucket.to_string()))?;

        let mut batch = WriteBatch::default();
        for (key, value) in &writes {
            batch.put_cf(cf, key, value);
        }
        db.write_opt(batch, &self.write_opts)
            .map_err(|e| StorageError::CommitFailed(e.to_string()))
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let db = self.db.lock();
        match db.cf_handle(bucket) {
            Some(cf) => db
                .get_cf(cf, key)
                .map_err(|e| StorageError::RocksDb(e.to_string())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> RocksDbStore {
        let path = dir.path().to_str().unwrap();
        RocksDbStore::open(RocksDbStoreConfig::new(path).with_sync_writes(false)).unwrap()
    }

    #[test]
    fn test_lazy_bucket_and_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            assert!(!store.has_bucket("counter"));
            store.batch("counter", &mut |tx| tx.put(b"k", b"v")).unwrap();
            assert!(store.has_bucket("counter"));
        }

        let store = open(&dir);
        assert_eq!(store.get("counter", b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_failed_batch_discards_writes() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let result = store.batch("counter", &mut |tx| {
            tx.put(b"k", b"v")?;
            Err(StorageError::CommitFailed("aborted".into()))
        });
        assert!(result.is_err());
        assert!(!store.has_bucket("counter"));
        assert_eq!(store.get("counter", b"k").unwrap(), None);
    }

    #[test]
    fn test_empty_bucket_name_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(matches!(
            store.batch("", &mut |_tx| Ok(())),
            Err(StorageError::InvalidBucket(_))
        ));
    }
}
