use serde::{Deserialize, Serialize};

use crate::db::{ColumnFamily, CompositeKey, DbResult, KeyedStateStore};
use crate::record::{EntityType, GroupRecord};

use super::ColumnFamilies;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedGroup {
    pub group_key: i64,
    pub group_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Groups by id, and the entities registered under each group.
pub struct GroupState {
    groups: ColumnFamily<String, PersistedGroup>,
    /// [group id, entity id] → entity type
    entities: ColumnFamily<CompositeKey<String, String>, EntityType>,
}

impl GroupState {
    pub(crate) fn new(store: &KeyedStateStore) -> Self {
        Self {
            groups: store.create_column_family(ColumnFamilies::Groups),
            entities: store.create_column_family(ColumnFamilies::GroupEntities),
        }
    }

    pub fn get(&self, group_id: &str) -> DbResult<Option<PersistedGroup>> {
        self.groups.get(&group_id.to_string())
    }

    pub fn exists(&self, group_id: &str) -> DbResult<bool> {
        self.groups.exists(&group_id.to_string())
    }

    /// Entities registered under the group, ordered by entity id.
    pub fn entities(&self, group_id: &str) -> DbResult<Vec<(String, EntityType)>> {
        let mut entities = Vec::new();
        self.entities
            .while_equal_prefix(&group_id.to_string(), |key, entity_type| {
                entities.push((key.1, entity_type));
                true
            })?;
        Ok(entities)
    }

    pub fn has_entity(&self, group_id: &str, entity_id: &str) -> DbResult<bool> {
        self.entities
            .exists(&CompositeKey::new(group_id.to_string(), entity_id.to_string()))
    }

    pub fn create(&mut self, key: i64, group: &GroupRecord) -> DbResult<()> {
        self.groups.insert(
            &group.group_id,
            &PersistedGroup {
                group_key: key,
                group_id: group.group_id.clone(),
                name: group.name.clone(),
                description: group.description.clone(),
            },
        )
    }

    pub fn update(&mut self, group: &GroupRecord) -> DbResult<()> {
        let group_id = group.group_id.clone();
        let existing = self.groups.get(&group_id)?;
        let group_key = existing.map(|g| g.group_key).unwrap_or(group.group_key);
        self.groups.update(
            &group_id,
            &PersistedGroup {
                group_key,
                group_id: group.group_id.clone(),
                name: group.name.clone(),
                description: group.description.clone(),
            },
        )
    }

    /// Delete the group together with its remaining entity registrations.
    pub fn delete(&mut self, group_id: &str) -> DbResult<()> {
        for (entity_id, _) in self.entities(group_id)? {
            self.entities
                .delete_existing(&CompositeKey::new(group_id.to_string(), entity_id))?;
        }
        self.groups.delete_existing(&group_id.to_string())
    }

    pub fn add_entity(
        &mut self,
        group_id: &str,
        entity_id: &str,
        entity_type: EntityType,
    ) -> DbResult<()> {
        self.entities.insert(
            &CompositeKey::new(group_id.to_string(), entity_id.to_string()),
            &entity_type,
        )
    }

    pub fn remove_entity(&mut self, group_id: &str, entity_id: &str) -> DbResult<()> {
        self.entities
            .delete_existing(&CompositeKey::new(group_id.to_string(), entity_id.to_string()))
    }
}
