//! RocksDB-backed keyed state store
//!
//! # Schema Design
//!
//! **State Column Family:**
//! - Key: column family id (u16, big endian) followed by the encoded typed key
//! - Value: MessagePack-encoded value
//!
//! **Metadata Column Family:**
//! - `format_version` → u32

use rocksdb::{ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::Arc;

use super::backend::{BatchOperation, KvBackend, WriteBatch};
use super::errors::{DbError, DbResult};

const CF_STATE: &str = "state";
const CF_METADATA: &str = "metadata";

const KEY_FORMAT_VERSION: &[u8] = b"format_version";
const FORMAT_VERSION: u32 = 1;

fn map_err(e: rocksdb::Error) -> DbError {
    match e.kind() {
        ErrorKind::Corruption => DbError::Corruption(e.to_string()),
        _ => DbError::Io(e.to_string()),
    }
}

/// RocksDB-backed persistent state storage
pub struct RocksDbBackend {
    db: Arc<DB>,
}

impl RocksDbBackend {
    /// Open the database at `path`, creating it if missing.
    ///
    /// # Arguments
    /// * `path` - Path to the RocksDB database directory
    ///
    /// # Returns
    /// * `Ok(RocksDbBackend)` - Successfully created/opened storage
    /// * `Err(DbError::Corruption)` - The directory holds an unknown format version
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_STATE, Options::default()),
            ColumnFamilyDescriptor::new(CF_METADATA, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path.as_ref(), cfs).map_err(map_err)?;
        let backend = Self { db: Arc::new(db) };
        backend.check_format_version()?;
        Ok(backend)
    }

    fn check_format_version(&self) -> DbResult<()> {
        let cf_metadata = self
            .db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| DbError::Io("metadata column family unavailable".to_string()))?;

        match self.db.get_cf(cf_metadata, KEY_FORMAT_VERSION).map_err(map_err)? {
            Some(bytes) if bytes.as_slice() == FORMAT_VERSION.to_be_bytes() => Ok(()),
            Some(bytes) => Err(DbError::Corruption(format!(
                "unsupported state format version {:?}",
                bytes
            ))),
            None => self
                .db
                .put_cf(cf_metadata, KEY_FORMAT_VERSION, FORMAT_VERSION.to_be_bytes())
                .map_err(map_err),
        }
    }
}

impl KvBackend for RocksDbBackend {
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        let cf_state = self
            .db
            .cf_handle(CF_STATE)
            .ok_or_else(|| DbError::Io("state column family unavailable".to_string()))?;
        self.db.get_cf(cf_state, key).map_err(map_err)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf_state = self
            .db
            .cf_handle(CF_STATE)
            .ok_or_else(|| DbError::Io("state column family unavailable".to_string()))?;

        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(cf_state, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(map_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    /// Applies all operations with one RocksDB `WriteBatch`.
    fn write_batch(&self, batch: WriteBatch) -> DbResult<()> {
        let cf_state = self
            .db
            .cf_handle(CF_STATE)
            .ok_or_else(|| DbError::Io("state column family unavailable".to_string()))?;

        let mut rocks_batch = rocksdb::WriteBatch::default();
        for operation in batch.operations() {
            match operation {
                BatchOperation::Put { key, value } => rocks_batch.put_cf(cf_state, key, value),
                BatchOperation::Delete { key } => rocks_batch.delete_cf(cf_state, key),
            }
        }
        self.db.write(rocks_batch).map_err(map_err)
    }
}

#[cfg(all(test, feature = "persistent-storage"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_batch_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let backend = RocksDbBackend::open_or_create(temp_dir.path()).unwrap();
            let mut batch = WriteBatch::new();
            batch.put(vec![0, 1, 7], b"seven".to_vec());
            batch.put(vec![0, 2, 1], b"other".to_vec());
            backend.write_batch(batch).unwrap();
        }

        let backend = RocksDbBackend::open_or_create(temp_dir.path()).unwrap();
        assert_eq!(backend.get(&[0, 1, 7]).unwrap(), Some(b"seven".to_vec()));
        assert_eq!(backend.scan_prefix(&[0, 1]).unwrap().len(), 1);
    }
}
