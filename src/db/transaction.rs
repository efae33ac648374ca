//! Transaction context shared by all column families of a store
//!
//! The stream processor opens one logical transaction per record: column family
//! writes land in an ordered overlay, reads see the overlay first, and `commit`
//! turns the overlay into a single atomic backend batch. `rollback` drops it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{KvBackend, WriteBatch};
use super::errors::{DbError, DbResult};

pub struct TransactionContext {
    backend: Arc<dyn KvBackend>,
    /// Uncommitted writes; `None` marks a deletion
    overlay: Mutex<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl TransactionContext {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            overlay: Mutex::new(BTreeMap::new()),
        }
    }

    fn overlay(&self) -> DbResult<MutexGuard<'_, BTreeMap<Vec<u8>, Option<Vec<u8>>>>> {
        self.overlay.lock().map_err(|_| DbError::Poisoned)
    }

    pub(crate) fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        if let Some(pending) = self.overlay()?.get(key) {
            return Ok(pending.clone());
        }
        self.backend.get(key)
    }

    pub(crate) fn put(&self, key: Vec<u8>, value: Vec<u8>) -> DbResult<()> {
        self.overlay()?.insert(key, Some(value));
        Ok(())
    }

    pub(crate) fn delete(&self, key: Vec<u8>) -> DbResult<()> {
        self.overlay()?.insert(key, None);
        Ok(())
    }

    /// Entries with the given prefix as seen by the current transaction.
    pub(crate) fn scan_prefix(&self, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.backend.scan_prefix(prefix)?.into_iter().collect();

        let overlay = self.overlay()?;
        for (key, pending) in overlay
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            match pending {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Write all pending changes as one atomic batch.
    ///
    /// On failure the pending changes are kept, so the caller decides between
    /// retrying the commit and rolling back.
    pub fn commit(&self) -> DbResult<()> {
        let mut overlay = self.overlay()?;
        if overlay.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::new();
        for (key, pending) in overlay.iter() {
            match pending {
                Some(value) => batch.put(key.clone(), value.clone()),
                None => batch.delete(key.clone()),
            }
        }
        self.backend.write_batch(batch)?;
        overlay.clear();
        Ok(())
    }

    /// Discard all pending changes.
    pub fn rollback(&self) -> DbResult<()> {
        self.overlay()?.clear();
        Ok(())
    }

    /// Number of keys touched since the last commit or rollback.
    pub fn pending_writes(&self) -> usize {
        self.overlay.lock().map(|o| o.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryBackend;

    fn context() -> (Arc<MemoryBackend>, TransactionContext) {
        let backend = Arc::new(MemoryBackend::new());
        let context = TransactionContext::new(backend.clone());
        (backend, context)
    }

    #[test]
    fn reads_see_uncommitted_writes() {
        let (backend, ctx) = context();
        ctx.put(vec![1], vec![10]).unwrap();

        assert_eq!(ctx.get(&[1]).unwrap(), Some(vec![10]));
        assert_eq!(backend.get(&[1]).unwrap(), None);

        ctx.commit().unwrap();
        assert_eq!(backend.get(&[1]).unwrap(), Some(vec![10]));
        assert_eq!(ctx.pending_writes(), 0);
    }

    #[test]
    fn rollback_discards_writes_and_deletes() {
        let (backend, ctx) = context();
        ctx.put(vec![1], vec![10]).unwrap();
        ctx.commit().unwrap();

        ctx.delete(vec![1]).unwrap();
        ctx.put(vec![2], vec![20]).unwrap();
        assert_eq!(ctx.get(&[1]).unwrap(), None);
        ctx.rollback().unwrap();

        assert_eq!(ctx.get(&[1]).unwrap(), Some(vec![10]));
        assert_eq!(backend.entries().unwrap(), vec![(vec![1], vec![10])]);
    }

    #[test]
    fn scan_merges_overlay_with_committed_state() {
        let (_backend, ctx) = context();
        ctx.put(vec![5, 1], vec![1]).unwrap();
        ctx.put(vec![5, 2], vec![2]).unwrap();
        ctx.commit().unwrap();

        ctx.delete(vec![5, 1]).unwrap();
        ctx.put(vec![5, 3], vec![3]).unwrap();
        ctx.put(vec![6, 0], vec![9]).unwrap();

        let keys: Vec<_> = ctx
            .scan_prefix(&[5])
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![vec![5, 2], vec![5, 3]]);
    }

    #[test]
    fn failed_commit_keeps_pending_writes() {
        let (backend, ctx) = context();
        backend.fail_next_writes(1);
        ctx.put(vec![1], vec![1]).unwrap();

        assert!(ctx.commit().unwrap_err().is_transient());
        assert_eq!(ctx.pending_writes(), 1);
        ctx.commit().unwrap();
        assert_eq!(backend.get(&[1]).unwrap(), Some(vec![1]));
    }
}
