//! Keyed State Store (Layer 1)
//!
//! A transactional, ordered key-value store organised into typed column families.
//! All column families share one ordered keyspace: every stored key starts with the
//! big-endian id of its column family followed by the order-preserving encoding of
//! the typed key. Writes are buffered in a [`TransactionContext`] and reach the
//! backend as one atomic batch on commit.

pub mod backend;
pub mod column_family;
pub mod errors;
pub mod key;
#[cfg(feature = "persistent-storage")]
pub mod rocksdb_backend;
pub mod snapshot;
pub mod transaction;
pub mod value;

use std::fmt;
use std::sync::Arc;

pub use backend::{BatchOperation, KvBackend, MemoryBackend, WriteBatch};
pub use column_family::ColumnFamily;
pub use errors::{DbError, DbResult};
pub use key::{CompositeKey, DbKey, TenantAwareKey};
#[cfg(feature = "persistent-storage")]
pub use rocksdb_backend::RocksDbBackend;
pub use snapshot::{SnapshotError, SnapshotFileSet, SnapshotId, SnapshotMetadata};
pub use transaction::TransactionContext;
pub use value::{DbNil, DbValue};

/// Identifies a column family inside the shared keyspace.
pub trait ColumnFamilyDef: Copy + fmt::Debug + Send + Sync + 'static {
    /// Stable numeric id, used as the key prefix. Never reuse an id for a different layout.
    fn id(self) -> u16;

    /// Human readable name used in errors and logs.
    fn name(self) -> &'static str;
}

/// Handle to one partition's keyed state store.
///
/// Cloning is cheap; clones share the backend and the transaction context.
#[derive(Clone)]
pub struct KeyedStateStore {
    backend: Arc<dyn KvBackend>,
    context: Arc<TransactionContext>,
}

impl KeyedStateStore {
    /// Create a store on top of the given backend.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        let context = Arc::new(TransactionContext::new(backend.clone()));
        Self { backend, context }
    }

    /// Create a store backed by an empty in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Create a typed view on a column family.
    ///
    /// # Arguments
    /// * `cf` - Column family definition (id and name)
    ///
    /// # Returns
    /// A [`ColumnFamily`] bound to this store's transaction context
    pub fn create_column_family<C, K, V>(&self, cf: C) -> ColumnFamily<K, V>
    where
        C: ColumnFamilyDef,
        K: DbKey,
        V: DbValue,
    {
        ColumnFamily::new(cf.name(), cf.id(), self.context.clone())
    }

    /// The transaction context all column families of this store write through.
    pub fn transaction_context(&self) -> &Arc<TransactionContext> {
        &self.context
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// All committed entries in key order. Uncommitted writes are not included.
    pub fn committed_entries(&self) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.backend.entries()
    }
}

impl fmt::Debug for KeyedStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedStateStore")
            .field("pending_writes", &self.context.pending_writes())
            .finish()
    }
}
