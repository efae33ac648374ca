//! RocksDB-backed log storage
//!
//! # Schema Design
//!
//! **Entries Column Family:**
//! - Key: position (u64 big endian)
//! - Value: encoded record bytes
//!
//! **Metadata Column Family:**
//! - `first_position` → i64
//! - `last_position` → i64

use bytes::Bytes;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use super::errors::LogError;
use super::storage::LogStorage;

const CF_ENTRIES: &str = "entries";
const CF_METADATA: &str = "metadata";

const KEY_FIRST_POSITION: &[u8] = b"first_position";
const KEY_LAST_POSITION: &[u8] = b"last_position";

fn storage_err(e: rocksdb::Error) -> LogError {
    LogError::Storage(e.to_string())
}

fn position_key(position: i64) -> [u8; 8] {
    (position as u64).to_be_bytes()
}

/// RocksDB-backed persistent log storage
pub struct RocksDbLogStorage {
    db: Arc<DB>,

    /// Cached first position
    first_position_cache: AtomicI64,

    /// Cached last position
    last_position_cache: AtomicI64,

    /// Serializes writers so cache updates match the stored metadata
    write_lock: Mutex<()>,
}

impl RocksDbLogStorage {
    /// Open the log at `path`, creating an empty one if missing.
    ///
    /// # Arguments
    /// * `path` - Path to the RocksDB database directory
    ///
    /// # Returns
    /// * `Ok(RocksDbLogStorage)` - Successfully created/opened storage
    /// * `Err(LogError::Storage)` - Failed to open the database
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_ENTRIES, Options::default()),
            ColumnFamilyDescriptor::new(CF_METADATA, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path.as_ref(), cfs).map_err(storage_err)?;
        let storage = Self {
            db: Arc::new(db),
            first_position_cache: AtomicI64::new(1),
            last_position_cache: AtomicI64::new(0),
            write_lock: Mutex::new(()),
        };

        let first = storage.load_position(KEY_FIRST_POSITION)?.unwrap_or(1);
        let last = storage.load_position(KEY_LAST_POSITION)?.unwrap_or(0);
        storage.first_position_cache.store(first, Ordering::SeqCst);
        storage.last_position_cache.store(last, Ordering::SeqCst);

        Ok(storage)
    }

    fn load_position(&self, key: &[u8]) -> Result<Option<i64>, LogError> {
        let cf_metadata = self
            .db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| LogError::Storage("metadata column family unavailable".to_string()))?;
        match self.db.get_cf(cf_metadata, key).map_err(storage_err)? {
            Some(bytes) => {
                let array: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LogError::Storage("invalid position bytes".to_string()))?;
                Ok(Some(i64::from_be_bytes(array)))
            }
            None => Ok(None),
        }
    }
}

impl LogStorage for RocksDbLogStorage {
    /// Appends all records and the new last position in one `WriteBatch`.
    fn append(&self, records: &[(i64, Bytes)]) -> Result<(), LogError> {
        let Some((last_position, _)) = records.last() else {
            return Ok(());
        };

        let _lock = self
            .write_lock
            .lock()
            .map_err(|_| LogError::Storage("write lock poisoned".to_string()))?;
        let cf_entries = self
            .db
            .cf_handle(CF_ENTRIES)
            .ok_or_else(|| LogError::Storage("entries column family unavailable".to_string()))?;
        let cf_metadata = self
            .db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| LogError::Storage("metadata column family unavailable".to_string()))?;

        let mut previous = self.last_position_cache.load(Ordering::SeqCst);
        let mut batch = WriteBatch::default();
        for (position, bytes) in records {
            if *position <= previous {
                return Err(LogError::PositionOutOfOrder {
                    previous,
                    current: *position,
                });
            }
            previous = *position;
            batch.put_cf(cf_entries, position_key(*position), bytes);
        }
        batch.put_cf(cf_metadata, KEY_LAST_POSITION, last_position.to_be_bytes());

        self.db.write(batch).map_err(storage_err)?;
        self.last_position_cache.store(*last_position, Ordering::SeqCst);
        Ok(())
    }

    fn read_from(&self, position: i64, limit: usize) -> Result<Vec<(i64, Bytes)>, LogError> {
        let cf_entries = self
            .db
            .cf_handle(CF_ENTRIES)
            .ok_or_else(|| LogError::Storage("entries column family unavailable".to_string()))?;

        let start = position_key(position.max(0));
        let mut records = Vec::new();
        for item in self
            .db
            .iterator_cf(cf_entries, IteratorMode::From(&start, Direction::Forward))
            .take(limit)
        {
            let (key, value) = item.map_err(storage_err)?;
            let array: [u8; 8] = key
                .as_ref()
                .try_into()
                .map_err(|_| LogError::Storage("invalid entry key".to_string()))?;
            records.push((u64::from_be_bytes(array) as i64, Bytes::from(value.to_vec())));
        }
        Ok(records)
    }

    fn first_position(&self) -> i64 {
        self.first_position_cache.load(Ordering::SeqCst)
    }

    fn last_position(&self) -> i64 {
        self.last_position_cache.load(Ordering::SeqCst)
    }

    /// Compact entries through the given position
    ///
    /// Removes entries with position <= up_to and moves the first position past them.
    fn compact(&self, up_to: i64) -> Result<usize, LogError> {
        let _lock = self
            .write_lock
            .lock()
            .map_err(|_| LogError::Storage("write lock poisoned".to_string()))?;
        let cf_entries = self
            .db
            .cf_handle(CF_ENTRIES)
            .ok_or_else(|| LogError::Storage("entries column family unavailable".to_string()))?;
        let cf_metadata = self
            .db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| LogError::Storage("metadata column family unavailable".to_string()))?;

        let first = self.first_position_cache.load(Ordering::SeqCst);
        if up_to < first {
            return Ok(0);
        }

        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for position in first..=up_to {
            batch.delete_cf(cf_entries, position_key(position));
            removed += 1;
        }
        let new_first = up_to + 1;
        batch.put_cf(cf_metadata, KEY_FIRST_POSITION, new_first.to_be_bytes());
        self.db.write(batch).map_err(storage_err)?;
        self.first_position_cache.store(new_first, Ordering::SeqCst);

        let last = self.last_position_cache.load(Ordering::SeqCst);
        Ok(removed.min((last - first + 1).max(0) as usize))
    }
}

#[cfg(all(test, feature = "persistent-storage"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_positions_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let storage = RocksDbLogStorage::open_or_create(temp_dir.path()).unwrap();
            storage
                .append(&[(1, Bytes::from_static(b"a")), (2, Bytes::from_static(b"b"))])
                .unwrap();
            storage.compact(1).unwrap();
        }

        let storage = RocksDbLogStorage::open_or_create(temp_dir.path()).unwrap();
        assert_eq!(storage.first_position(), 2);
        assert_eq!(storage.last_position(), 2);
        let records = storage.read_from(0, 10).unwrap();
        assert_eq!(records, vec![(2, Bytes::from_static(b"b"))]);
    }
}
