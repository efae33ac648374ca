//! Point-in-time snapshot export and restore
//!
//! A snapshot is a directory named `{partition}-{checkpoint}-{node}` holding:
//! - `metadata.json` → [`SnapshotMetadata`]
//! - `state.data` → length-prefixed `(key, value)` pairs of committed state
//!
//! The directory is first written under a temporary name and renamed into place,
//! so a crash never leaves a half-written snapshot under the final name.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::backend::{KvBackend, WriteBatch};
use super::errors::DbError;
use super::KeyedStateStore;

pub const SNAPSHOT_METADATA_FILE: &str = "metadata.json";
pub const SNAPSHOT_DATA_FILE: &str = "state.data";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid snapshot metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("snapshot {0} already exists")]
    AlreadyExists(SnapshotId),

    #[error("snapshot {0} not found")]
    NotFound(SnapshotId),

    #[error("snapshot id mismatch: expected {expected}, found {actual}")]
    IdMismatch {
        expected: SnapshotId,
        actual: SnapshotId,
    },

    #[error("snapshot checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("snapshot data is truncated or malformed: {0}")]
    Malformed(String),

    #[error("restore target backend is not empty")]
    TargetNotEmpty,

    #[error("cannot take a snapshot while {0} writes are uncommitted")]
    UncommittedWrites(usize),
}

/// Identity of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId {
    pub partition_id: u32,
    pub checkpoint_id: u64,
    pub node_id: u32,
}

impl SnapshotId {
    pub fn new(partition_id: u32, checkpoint_id: u64, node_id: u32) -> Self {
        Self {
            partition_id,
            checkpoint_id,
            node_id,
        }
    }

    pub fn directory_name(&self) -> String {
        format!("{}-{}-{}", self.partition_id, self.checkpoint_id, self.node_id)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.directory_name())
    }
}

/// Metadata stored next to the snapshot data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub id: SnapshotId,
    /// Position of the last record whose effects are contained in the snapshot
    pub last_processed_position: i64,
    pub entry_count: u64,
    /// CRC32 of `state.data`
    pub checksum: u32,
    /// Creation time in milliseconds since epoch (informational only)
    pub created_at: u64,
}

/// Files making up an exported snapshot
#[derive(Debug, Clone)]
pub struct SnapshotFileSet {
    pub metadata: SnapshotMetadata,
    pub directory: PathBuf,
    pub files: Vec<PathBuf>,
}

fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl KeyedStateStore {
    /// Export the committed state as a snapshot under `root`.
    ///
    /// # Arguments
    /// * `root` - Directory that holds all snapshots of this node
    /// * `id` - Snapshot identity; determines the directory name
    /// * `last_processed_position` - Position the exported state corresponds to
    ///
    /// # Returns
    /// * `Ok(SnapshotFileSet)` - The published snapshot
    /// * `Err(SnapshotError::UncommittedWrites)` - A transaction is still open
    pub fn export_snapshot(
        &self,
        root: &Path,
        id: SnapshotId,
        last_processed_position: i64,
    ) -> Result<SnapshotFileSet, SnapshotError> {
        let pending = self.transaction_context().pending_writes();
        if pending > 0 {
            return Err(SnapshotError::UncommittedWrites(pending));
        }

        let directory = root.join(id.directory_name());
        if directory.exists() {
            return Err(SnapshotError::AlreadyExists(id));
        }

        let entries = self.committed_entries()?;
        let mut data = Vec::new();
        for (key, value) in &entries {
            data.put_u32(key.len() as u32);
            data.put_slice(key);
            data.put_u32(value.len() as u32);
            data.put_slice(value);
        }

        let metadata = SnapshotMetadata {
            id,
            last_processed_position,
            entry_count: entries.len() as u64,
            checksum: crc32fast::hash(&data),
            created_at: current_timestamp(),
        };

        fs::create_dir_all(root)?;
        let staging = root.join(format!(".{}-{}", id.directory_name(), uuid::Uuid::new_v4()));
        fs::create_dir_all(&staging)?;
        fs::write(staging.join(SNAPSHOT_DATA_FILE), &data)?;
        fs::write(
            staging.join(SNAPSHOT_METADATA_FILE),
            serde_json::to_vec_pretty(&metadata)?,
        )?;
        fs::rename(&staging, &directory)?;

        Ok(SnapshotFileSet {
            files: vec![
                directory.join(SNAPSHOT_METADATA_FILE),
                directory.join(SNAPSHOT_DATA_FILE),
            ],
            directory,
            metadata,
        })
    }

    /// Restore the snapshot `id` from `root` into an empty backend.
    ///
    /// # Returns
    /// The restored store together with the snapshot metadata
    pub fn restore_snapshot(
        root: &Path,
        id: SnapshotId,
        backend: Arc<dyn KvBackend>,
    ) -> Result<(KeyedStateStore, SnapshotMetadata), SnapshotError> {
        let directory = root.join(id.directory_name());
        if !directory.is_dir() {
            return Err(SnapshotError::NotFound(id));
        }
        if !backend.is_empty()? {
            return Err(SnapshotError::TargetNotEmpty);
        }

        let metadata: SnapshotMetadata =
            serde_json::from_slice(&fs::read(directory.join(SNAPSHOT_METADATA_FILE))?)?;
        if metadata.id != id {
            return Err(SnapshotError::IdMismatch {
                expected: id,
                actual: metadata.id,
            });
        }

        let data = fs::read(directory.join(SNAPSHOT_DATA_FILE))?;
        let actual = crc32fast::hash(&data);
        if actual != metadata.checksum {
            return Err(SnapshotError::ChecksumMismatch {
                expected: metadata.checksum,
                actual,
            });
        }

        let mut batch = WriteBatch::new();
        let mut buf = data.as_slice();
        while buf.has_remaining() {
            let key = read_chunk(&mut buf)?;
            let value = read_chunk(&mut buf)?;
            batch.put(key, value);
        }
        if batch.len() as u64 != metadata.entry_count {
            return Err(SnapshotError::Malformed(format!(
                "expected {} entries, found {}",
                metadata.entry_count,
                batch.len()
            )));
        }

        backend.write_batch(batch)?;
        Ok((KeyedStateStore::new(backend), metadata))
    }
}

fn read_chunk(buf: &mut &[u8]) -> Result<Vec<u8>, SnapshotError> {
    if buf.remaining() < 4 {
        return Err(SnapshotError::Malformed("missing length prefix".to_string()));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(SnapshotError::Malformed(format!(
            "chunk of {} bytes exceeds remaining {}",
            len,
            buf.remaining()
        )));
    }
    let chunk = buf[..len].to_vec();
    buf.advance(len);
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnFamily, ColumnFamilyDef, MemoryBackend};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Copy)]
    struct Items;

    impl ColumnFamilyDef for Items {
        fn id(self) -> u16 {
            1
        }

        fn name(self) -> &'static str {
            "ITEMS"
        }
    }

    fn populated_store() -> KeyedStateStore {
        let store = KeyedStateStore::in_memory();
        let items: ColumnFamily<String, u64> = store.create_column_family(Items);
        items.insert(&"a".to_string(), &1).unwrap();
        items.insert(&"b".to_string(), &2).unwrap();
        store.transaction_context().commit().unwrap();
        store
    }

    #[test]
    fn test_export_and_restore() {
        let temp_dir = TempDir::new().unwrap();
        let store = populated_store();
        let id = SnapshotId::new(1, 7, 0);

        let files = store.export_snapshot(temp_dir.path(), id, 42).unwrap();
        assert_eq!(files.directory, temp_dir.path().join("1-7-0"));
        assert_eq!(files.metadata.entry_count, 2);
        assert!(files.files.iter().all(|f| f.exists()));

        let (restored, metadata) =
            KeyedStateStore::restore_snapshot(temp_dir.path(), id, Arc::new(MemoryBackend::new()))
                .unwrap();
        assert_eq!(metadata.last_processed_position, 42);
        assert_eq!(
            restored.committed_entries().unwrap(),
            store.committed_entries().unwrap()
        );
    }

    #[test]
    fn test_uncommitted_writes_block_export() {
        let temp_dir = TempDir::new().unwrap();
        let store = populated_store();
        let items: ColumnFamily<String, u64> = store.create_column_family(Items);
        items.upsert(&"c".to_string(), &3).unwrap();

        let result = store.export_snapshot(temp_dir.path(), SnapshotId::new(1, 1, 0), 1);
        assert!(matches!(result, Err(SnapshotError::UncommittedWrites(1))));
    }

    #[test]
    fn test_corrupted_data_is_detected() {
        let temp_dir = TempDir::new().unwrap();
        let id = SnapshotId::new(2, 1, 3);
        let files = populated_store()
            .export_snapshot(temp_dir.path(), id, 10)
            .unwrap();

        let data_file = files.directory.join(SNAPSHOT_DATA_FILE);
        let mut data = fs::read(&data_file).unwrap();
        data[5] ^= 0xFF;
        fs::write(&data_file, data).unwrap();

        let result =
            KeyedStateStore::restore_snapshot(temp_dir.path(), id, Arc::new(MemoryBackend::new()));
        assert!(matches!(result, Err(SnapshotError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_restore_requires_matching_id() {
        let temp_dir = TempDir::new().unwrap();
        populated_store()
            .export_snapshot(temp_dir.path(), SnapshotId::new(1, 1, 0), 1)
            .unwrap();

        let result = KeyedStateStore::restore_snapshot(
            temp_dir.path(),
            SnapshotId::new(1, 2, 0),
            Arc::new(MemoryBackend::new()),
        );
        assert!(matches!(result, Err(SnapshotError::NotFound(_))));
    }
}
