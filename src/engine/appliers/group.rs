use crate::engine::applier::TypedEventApplier;
use crate::engine::errors::ApplierError;
use crate::record::{EntityType, GroupRecord, RelationType};
use crate::state::ProcessingState;

pub struct GroupCreatedApplier;

impl TypedEventApplier for GroupCreatedApplier {
    type Value = GroupRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        key: i64,
        value: &GroupRecord,
    ) -> Result<(), ApplierError> {
        Ok(state.groups_mut().create(key, value)?)
    }
}

pub struct GroupUpdatedApplier;

impl TypedEventApplier for GroupUpdatedApplier {
    type Value = GroupRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        _key: i64,
        value: &GroupRecord,
    ) -> Result<(), ApplierError> {
        Ok(state.groups_mut().update(value)?)
    }
}

pub struct GroupDeletedApplier;

impl TypedEventApplier for GroupDeletedApplier {
    type Value = GroupRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        _key: i64,
        value: &GroupRecord,
    ) -> Result<(), ApplierError> {
        Ok(state.groups_mut().delete(&value.group_id)?)
    }
}

fn cannot_add(value: &GroupRecord) -> ApplierError {
    ApplierError::IllegalState(format!(
        "Expected to add entity '{}' to group '{}', but entities of type '{}' cannot be added to groups.",
        value.entity_id, value.group_id, value.entity_type
    ))
}

fn cannot_remove(value: &GroupRecord) -> ApplierError {
    ApplierError::IllegalState(format!(
        "Expected to remove entity '{}' from group '{}', but entities of type '{}' cannot be removed from groups.",
        value.entity_id, value.group_id, value.entity_type
    ))
}

/// Adds users as group members and registers mapping rules under the group,
/// indexing the group on the mapping rule as well.
pub struct GroupEntityAddedApplier;

impl TypedEventApplier for GroupEntityAddedApplier {
    type Value = GroupRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        _key: i64,
        value: &GroupRecord,
    ) -> Result<(), ApplierError> {
        match value.entity_type {
            EntityType::User => state.membership_mut().insert_relation(
                EntityType::User,
                &value.entity_id,
                RelationType::Group,
                &value.group_id,
            )?,
            EntityType::Mapping => {
                state.groups_mut().add_entity(
                    &value.group_id,
                    &value.entity_id,
                    EntityType::Mapping,
                )?;
                state
                    .mapping_rules_mut()
                    .add_group(&value.entity_id, &value.group_id)?;
            }
            _ => return Err(cannot_add(value)),
        }
        Ok(())
    }
}

/// First version: mapping rules were only registered under the group.
pub struct GroupEntityAddedV1Applier;

impl TypedEventApplier for GroupEntityAddedV1Applier {
    type Value = GroupRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        _key: i64,
        value: &GroupRecord,
    ) -> Result<(), ApplierError> {
        match value.entity_type {
            EntityType::User => state.membership_mut().insert_relation(
                EntityType::User,
                &value.entity_id,
                RelationType::Group,
                &value.group_id,
            )?,
            EntityType::Mapping => state.groups_mut().add_entity(
                &value.group_id,
                &value.entity_id,
                EntityType::Mapping,
            )?,
            _ => return Err(cannot_add(value)),
        }
        Ok(())
    }
}

pub struct GroupEntityRemovedApplier;

impl TypedEventApplier for GroupEntityRemovedApplier {
    type Value = GroupRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        _key: i64,
        value: &GroupRecord,
    ) -> Result<(), ApplierError> {
        match value.entity_type {
            EntityType::User => state.membership_mut().delete_relation(
                EntityType::User,
                &value.entity_id,
                RelationType::Group,
                &value.group_id,
            )?,
            EntityType::Mapping => {
                state
                    .groups_mut()
                    .remove_entity(&value.group_id, &value.entity_id)?;
                state
                    .mapping_rules_mut()
                    .remove_group(&value.entity_id, &value.group_id)?;
            }
            _ => return Err(cannot_remove(value)),
        }
        Ok(())
    }
}

pub struct GroupEntityRemovedV1Applier;

impl TypedEventApplier for GroupEntityRemovedV1Applier {
    type Value = GroupRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        _key: i64,
        value: &GroupRecord,
    ) -> Result<(), ApplierError> {
        match value.entity_type {
            EntityType::User => state.membership_mut().delete_relation(
                EntityType::User,
                &value.entity_id,
                RelationType::Group,
                &value.group_id,
            )?,
            EntityType::Mapping => state
                .groups_mut()
                .remove_entity(&value.group_id, &value.entity_id)?,
            _ => return Err(cannot_remove(value)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeyedStateStore;
    use crate::record::{GroupRecord, MappingRuleRecord};

    fn state_with_group() -> ProcessingState {
        let mut state = ProcessingState::new(1, KeyedStateStore::in_memory());
        GroupCreatedApplier
            .apply_state(&mut state, 10, &GroupRecord::new("g1"))
            .unwrap();
        state
    }

    #[test]
    fn user_becomes_member() {
        let mut state = state_with_group();
        let value = GroupRecord::new("g1").with_entity("u1", EntityType::User);
        GroupEntityAddedApplier
            .apply_state(&mut state, 10, &value)
            .unwrap();
        assert!(state
            .membership()
            .has_relation(EntityType::User, "u1", RelationType::Group, "g1")
            .unwrap());

        GroupEntityRemovedApplier
            .apply_state(&mut state, 10, &value)
            .unwrap();
        assert!(!state
            .membership()
            .has_relation(EntityType::User, "u1", RelationType::Group, "g1")
            .unwrap());
    }

    #[test]
    fn mapping_is_registered_and_indexed() {
        let mut state = state_with_group();
        state
            .mapping_rules_mut()
            .create(11, &MappingRuleRecord::new("m1", "role", "admin"))
            .unwrap();

        let value = GroupRecord::new("g1").with_entity("m1", EntityType::Mapping);
        GroupEntityAddedApplier
            .apply_state(&mut state, 10, &value)
            .unwrap();
        assert!(state.groups().has_entity("g1", "m1").unwrap());
        let rule = state.mapping_rules().get("m1").unwrap().unwrap();
        assert!(rule.group_ids.contains("g1"));
    }

    #[test]
    fn v1_does_not_index_the_mapping_rule() {
        let mut state = state_with_group();
        state
            .mapping_rules_mut()
            .create(11, &MappingRuleRecord::new("m1", "role", "admin"))
            .unwrap();

        let value = GroupRecord::new("g1").with_entity("m1", EntityType::Mapping);
        GroupEntityAddedV1Applier
            .apply_state(&mut state, 10, &value)
            .unwrap();
        assert!(state.groups().has_entity("g1", "m1").unwrap());
        let rule = state.mapping_rules().get("m1").unwrap().unwrap();
        assert!(rule.group_ids.is_empty());
    }

    #[test]
    fn other_entity_types_are_illegal() {
        let mut state = state_with_group();
        let value = GroupRecord::new("g1").with_entity("c1", EntityType::Client);
        match GroupEntityAddedApplier.apply_state(&mut state, 10, &value) {
            Err(ApplierError::IllegalState(message)) => assert_eq!(
                message,
                "Expected to add entity 'c1' to group 'g1', but entities of type 'CLIENT' cannot be added to groups."
            ),
            other => panic!("expected illegal state, got {:?}", other),
        }
        assert!(matches!(
            GroupEntityRemovedApplier.apply_state(&mut state, 10, &value),
            Err(ApplierError::IllegalState(_))
        ));
    }
}
