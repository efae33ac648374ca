use serde::{Deserialize, Serialize};

use crate::db::{ColumnFamily, CompositeKey, DbResult, KeyedStateStore, TenantAwareKey};
use crate::record::{HistoryDeletionRecord, HistoryDeletionType};

use super::ColumnFamilies;

/// Record of a deleted history resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedHistoryDeletion {
    pub resource_key: i64,
    pub resource_type: HistoryDeletionType,
    #[serde(default)]
    pub process_id: String,
    #[serde(default)]
    pub decision_definition_id: String,
    #[serde(default)]
    pub tenant_id: String,
}

impl From<&HistoryDeletionRecord> for PersistedHistoryDeletion {
    fn from(record: &HistoryDeletionRecord) -> Self {
        Self {
            resource_key: record.resource_key,
            resource_type: record.resource_type,
            process_id: record.process_id.clone(),
            decision_definition_id: record.decision_definition_id.clone(),
            tenant_id: record.tenant_id.clone(),
        }
    }
}

pub(crate) type HistoryDeletionKey = TenantAwareKey<CompositeKey<HistoryDeletionType, i64>>;

/// Deleted history resources, grouped by tenant.
pub struct HistoryDeletionState {
    deletions: ColumnFamily<HistoryDeletionKey, PersistedHistoryDeletion>,
}

impl HistoryDeletionState {
    pub(crate) fn new(store: &KeyedStateStore) -> Self {
        Self {
            deletions: store.create_column_family(ColumnFamilies::HistoryDeletions),
        }
    }

    pub(crate) fn key(
        tenant_id: &str,
        resource_type: HistoryDeletionType,
        resource_key: i64,
    ) -> HistoryDeletionKey {
        TenantAwareKey::new(tenant_id, CompositeKey::new(resource_type, resource_key))
    }

    pub fn is_deleted(
        &self,
        tenant_id: &str,
        resource_type: HistoryDeletionType,
        resource_key: i64,
    ) -> DbResult<bool> {
        self.deletions
            .exists(&Self::key(tenant_id, resource_type, resource_key))
    }

    pub fn get(
        &self,
        tenant_id: &str,
        resource_type: HistoryDeletionType,
        resource_key: i64,
    ) -> DbResult<Option<PersistedHistoryDeletion>> {
        self.deletions
            .get(&Self::key(tenant_id, resource_type, resource_key))
    }

    /// All deletions of one tenant, ordered by resource type and key.
    pub fn deletions_of_tenant(&self, tenant_id: &str) -> DbResult<Vec<PersistedHistoryDeletion>> {
        let mut deletions = Vec::new();
        self.deletions
            .while_equal_prefix(&tenant_id.to_string(), |_, deletion| {
                deletions.push(deletion);
                true
            })?;
        Ok(deletions)
    }

    pub fn insert(&mut self, deletion: PersistedHistoryDeletion) -> DbResult<()> {
        self.deletions.insert(
            &Self::key(&deletion.tenant_id, deletion.resource_type, deletion.resource_key),
            &deletion,
        )
    }
}
