//! Membership relations between entities (users, mapping rules) and the groups,
//! roles or tenants they belong to. Stored in both directions.

use crate::db::{ColumnFamily, CompositeKey, DbNil, DbResult, KeyedStateStore};
use crate::record::{EntityType, RelationType};

use super::ColumnFamilies;

type EntityKey = CompositeKey<EntityType, String>;
type RelationKey = CompositeKey<RelationType, String>;

pub struct MembershipState {
    /// [[entity type, entity id], [relation type, relation id]]
    by_entity: ColumnFamily<CompositeKey<EntityKey, RelationKey>, DbNil>,
    /// [[relation type, relation id], [entity type, entity id]]
    by_relation: ColumnFamily<CompositeKey<RelationKey, EntityKey>, DbNil>,
}

fn entity(entity_type: EntityType, entity_id: &str) -> EntityKey {
    CompositeKey::new(entity_type, entity_id.to_string())
}

fn relation(relation_type: RelationType, relation_id: &str) -> RelationKey {
    CompositeKey::new(relation_type, relation_id.to_string())
}

impl MembershipState {
    pub(crate) fn new(store: &KeyedStateStore) -> Self {
        Self {
            by_entity: store.create_column_family(ColumnFamilies::Membership),
            by_relation: store.create_column_family(ColumnFamilies::MembershipByRelation),
        }
    }

    pub fn has_relation(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        relation_type: RelationType,
        relation_id: &str,
    ) -> DbResult<bool> {
        self.by_entity.exists(&CompositeKey::new(
            entity(entity_type, entity_id),
            relation(relation_type, relation_id),
        ))
    }

    /// Ids of all relations of the given type the entity belongs to, ordered.
    pub fn get_relations(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        relation_type: RelationType,
    ) -> DbResult<Vec<String>> {
        let mut relations = Vec::new();
        let prefix = CompositeKey::new(entity(entity_type, entity_id), relation_type);
        self.by_entity.while_equal_prefix(&prefix, |key, _| {
            relations.push(key.1 .1);
            true
        })?;
        Ok(relations)
    }

    /// All entities that belong to the relation, ordered by type and id.
    pub fn get_members(
        &self,
        relation_type: RelationType,
        relation_id: &str,
    ) -> DbResult<Vec<(EntityType, String)>> {
        let mut members = Vec::new();
        self.by_relation
            .while_equal_prefix(&relation(relation_type, relation_id), |key, _| {
                let CompositeKey(entity_type, entity_id) = key.1;
                members.push((entity_type, entity_id));
                true
            })?;
        Ok(members)
    }

    pub fn insert_relation(
        &mut self,
        entity_type: EntityType,
        entity_id: &str,
        relation_type: RelationType,
        relation_id: &str,
    ) -> DbResult<()> {
        self.by_entity.insert(
            &CompositeKey::new(
                entity(entity_type, entity_id),
                relation(relation_type, relation_id),
            ),
            &DbNil,
        )?;
        self.by_relation.insert(
            &CompositeKey::new(
                relation(relation_type, relation_id),
                entity(entity_type, entity_id),
            ),
            &DbNil,
        )
    }

    pub fn delete_relation(
        &mut self,
        entity_type: EntityType,
        entity_id: &str,
        relation_type: RelationType,
        relation_id: &str,
    ) -> DbResult<()> {
        self.by_entity.delete_existing(&CompositeKey::new(
            entity(entity_type, entity_id),
            relation(relation_type, relation_id),
        ))?;
        self.by_relation.delete_existing(&CompositeKey::new(
            relation(relation_type, relation_id),
            entity(entity_type, entity_id),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relations_are_indexed_both_ways() {
        let store = KeyedStateStore::in_memory();
        let mut membership = MembershipState::new(&store);
        membership
            .insert_relation(EntityType::User, "u1", RelationType::Group, "g2")
            .unwrap();
        membership
            .insert_relation(EntityType::User, "u1", RelationType::Group, "g1")
            .unwrap();
        membership
            .insert_relation(EntityType::User, "u10", RelationType::Group, "g1")
            .unwrap();
        membership
            .insert_relation(EntityType::User, "u1", RelationType::Role, "r1")
            .unwrap();

        assert_eq!(
            membership
                .get_relations(EntityType::User, "u1", RelationType::Group)
                .unwrap(),
            vec!["g1".to_string(), "g2".to_string()]
        );
        assert_eq!(
            membership.get_members(RelationType::Group, "g1").unwrap(),
            vec![
                (EntityType::User, "u1".to_string()),
                (EntityType::User, "u10".to_string())
            ]
        );

        membership
            .delete_relation(EntityType::User, "u1", RelationType::Group, "g1")
            .unwrap();
        assert!(!membership
            .has_relation(EntityType::User, "u1", RelationType::Group, "g1")
            .unwrap());
        assert_eq!(
            membership.get_members(RelationType::Group, "g1").unwrap().len(),
            1
        );
    }

    #[test]
    fn duplicate_relation_is_a_store_error() {
        let store = KeyedStateStore::in_memory();
        let mut membership = MembershipState::new(&store);
        membership
            .insert_relation(EntityType::User, "u1", RelationType::Group, "g1")
            .unwrap();
        assert!(membership
            .insert_relation(EntityType::User, "u1", RelationType::Group, "g1")
            .is_err());
    }
}
