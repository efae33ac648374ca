//! Storage backends for the keyed state store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use super::errors::{DbError, DbResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// A set of writes applied atomically by [`KvBackend::write_batch`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    operations: Vec<BatchOperation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.operations.push(BatchOperation::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.operations.push(BatchOperation::Delete { key });
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }
}

/// Ordered byte-level key-value storage.
///
/// Implementations must apply a [`WriteBatch`] atomically: after a crash either all
/// of its operations are visible or none are.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>>;

    fn write_batch(&self, batch: WriteBatch) -> DbResult<()>;

    /// Every entry in key order.
    fn entries(&self) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.scan_prefix(&[])
    }

    fn is_empty(&self) -> DbResult<bool> {
        Ok(self.entries()?.is_empty())
    }
}

/// In-memory backend used for tests and for partitions without a data directory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    injected_write_failures: AtomicU32,
    injected_read_failures: AtomicU32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` batch writes fail with a transient I/O error.
    pub fn fail_next_writes(&self, count: u32) {
        self.injected_write_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` reads (`get` or `scan_prefix`) fail with a transient I/O error.
    pub fn fail_next_reads(&self, count: u32) {
        self.injected_read_failures.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        if Self::take_injected_failure(&self.injected_read_failures) {
            return Err(DbError::Io("injected read failure".to_string()));
        }
        let data = self.data.read().map_err(|_| DbError::Poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        if Self::take_injected_failure(&self.injected_read_failures) {
            return Err(DbError::Io("injected read failure".to_string()));
        }
        let data = self.data.read().map_err(|_| DbError::Poisoned)?;
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn write_batch(&self, batch: WriteBatch) -> DbResult<()> {
        if Self::take_injected_failure(&self.injected_write_failures) {
            return Err(DbError::Io("injected write failure".to_string()));
        }

        let mut data = self.data.write().map_err(|_| DbError::Poisoned)?;
        for operation in batch.operations {
            match operation {
                BatchOperation::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_prefix_is_ordered_and_bounded() {
        let backend = MemoryBackend::new();
        let mut batch = WriteBatch::new();
        batch.put(vec![1, 3], b"c".to_vec());
        batch.put(vec![1, 1], b"a".to_vec());
        batch.put(vec![2, 0], b"z".to_vec());
        backend.write_batch(batch).unwrap();

        let entries = backend.scan_prefix(&[1]).unwrap();
        assert_eq!(
            entries,
            vec![(vec![1, 1], b"a".to_vec()), (vec![1, 3], b"c".to_vec())]
        );
        assert_eq!(backend.entries().unwrap().len(), 3);
    }

    #[test]
    fn test_injected_failures_leave_data_untouched() {
        let backend = MemoryBackend::new();
        backend.fail_next_writes(1);

        let mut batch = WriteBatch::new();
        batch.put(vec![1], vec![1]);
        let err = backend.write_batch(batch.clone()).unwrap_err();
        assert!(err.is_transient());
        assert!(backend.is_empty().unwrap());

        backend.write_batch(batch).unwrap();
        assert_eq!(backend.get(&[1]).unwrap(), Some(vec![1]));
    }
}
