use crate::engine::authorization::AuthorizationRequest;
use crate::engine::errors::{ProcessingError, Rejection};
use crate::engine::processor::{ProcessingContext, TypedRecordProcessor};
use crate::record::{
    AuthorizationResourceType, EntityType, GroupIntent, GroupRecord, Intent, PermissionType,
    RelationType, TypedRecord,
};
use crate::state::{PersistedGroup, ProcessingState};

fn group_request(
    command: &TypedRecord<'_, GroupRecord>,
    permission: PermissionType,
) -> AuthorizationRequest {
    AuthorizationRequest::new(command.metadata(), AuthorizationResourceType::Group, permission)
        .add_resource_id(command.value().group_id.clone())
}

/// The group the command refers to, or NOT_FOUND with the wording of `action`.
fn existing_group(
    state: &ProcessingState,
    group_id: &str,
    action: &str,
) -> Result<PersistedGroup, ProcessingError> {
    state.groups().get(group_id)?.ok_or_else(|| {
        Rejection::not_found(format!(
            "Expected to {} group with ID '{}', but a group with this ID does not exist.",
            action, group_id
        ))
        .into()
    })
}

fn is_member(
    state: &ProcessingState,
    group_id: &str,
    entity_id: &str,
    entity_type: EntityType,
) -> Result<bool, ProcessingError> {
    Ok(match entity_type {
        EntityType::User => {
            state
                .membership()
                .has_relation(EntityType::User, entity_id, RelationType::Group, group_id)?
        }
        _ => state.groups().has_entity(group_id, entity_id)?,
    })
}

#[derive(Clone, Copy)]
enum MemberChange {
    Add,
    Remove,
}

impl MemberChange {
    fn verb(self) -> &'static str {
        match self {
            MemberChange::Add => "add",
            MemberChange::Remove => "remove",
        }
    }

    fn preposition(self) -> &'static str {
        match self {
            MemberChange::Add => "to",
            MemberChange::Remove => "from",
        }
    }

    fn participle(self) -> &'static str {
        match self {
            MemberChange::Add => "added to",
            MemberChange::Remove => "removed from",
        }
    }
}

/// Only users and mapping rules can be group members; mapping rules must exist.
fn validate_entity(
    state: &ProcessingState,
    value: &GroupRecord,
    change: MemberChange,
) -> Result<(), ProcessingError> {
    match value.entity_type {
        EntityType::User => Ok(()),
        EntityType::Mapping if state.mapping_rules().exists(&value.entity_id)? => Ok(()),
        EntityType::Mapping => Err(Rejection::not_found(format!(
            "Expected to {} an entity with ID '{}' and type '{}' {} group with ID '{}', but the entity does not exist.",
            change.verb(),
            value.entity_id,
            value.entity_type,
            change.preposition(),
            value.group_id
        ))
        .into()),
        other => Err(Rejection::invalid_argument(format!(
            "Expected to {} an entity with ID '{}' and type '{}' {} group with ID '{}', but entities of type '{}' cannot be {} groups.",
            change.verb(),
            value.entity_id,
            other,
            change.preposition(),
            value.group_id,
            other,
            change.participle()
        ))
        .into()),
    }
}

fn with_key(group: &PersistedGroup, value: &GroupRecord) -> GroupRecord {
    GroupRecord {
        group_key: group.group_key,
        ..value.clone()
    }
}

pub struct CreateGroupProcessor;

impl TypedRecordProcessor for CreateGroupProcessor {
    type Value = GroupRecord;

    fn process_record(
        &self,
        command: &TypedRecord<'_, GroupRecord>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let value = command.value();
        context.check_authorization(&AuthorizationRequest::new(
            command.metadata(),
            AuthorizationResourceType::Group,
            PermissionType::Create,
        ))?;

        if value.group_id.is_empty() {
            return Err(Rejection::invalid_argument(
                "Expected to create group with a non-empty ID, but no ID was given.",
            )
            .into());
        }
        if context.state().groups().exists(&value.group_id)? {
            return Err(Rejection::already_exists(format!(
                "Expected to create group with ID '{}', but a group with this ID already exists.",
                value.group_id
            ))
            .into());
        }

        let key = context.next_key()?;
        let created = GroupRecord {
            group_key: key,
            entity_id: String::new(),
            entity_type: EntityType::Unspecified,
            ..value.clone()
        };
        let intent = Intent::Group(GroupIntent::Created);
        context
            .state_writer()
            .append_follow_up_event(key, intent, created.clone())?;
        context.response_writer().write_event_on_command(key, intent, created);
        Ok(())
    }
}

pub struct UpdateGroupProcessor;

impl TypedRecordProcessor for UpdateGroupProcessor {
    type Value = GroupRecord;

    fn process_record(
        &self,
        command: &TypedRecord<'_, GroupRecord>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let value = command.value();
        let group = existing_group(context.state(), &value.group_id, "update")?;
        context.check_authorization(&group_request(command, PermissionType::Update))?;

        let updated = with_key(&group, value);
        let intent = Intent::Group(GroupIntent::Updated);
        context
            .state_writer()
            .append_follow_up_event(group.group_key, intent, updated.clone())?;
        context
            .response_writer()
            .write_event_on_command(group.group_key, intent, updated);
        Ok(())
    }
}

/// Removes every member before the group itself.
pub struct DeleteGroupProcessor;

impl TypedRecordProcessor for DeleteGroupProcessor {
    type Value = GroupRecord;

    fn process_record(
        &self,
        command: &TypedRecord<'_, GroupRecord>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let value = command.value();
        let group = existing_group(context.state(), &value.group_id, "delete")?;
        context.check_authorization(&group_request(command, PermissionType::Delete))?;

        let mut members: Vec<(String, EntityType)> = context
            .state()
            .membership()
            .get_members(RelationType::Group, &group.group_id)?
            .into_iter()
            .map(|(entity_type, entity_id)| (entity_id, entity_type))
            .collect();
        members.extend(context.state().groups().entities(&group.group_id)?);

        let removed = Intent::Group(GroupIntent::EntityRemoved);
        for (entity_id, entity_type) in members {
            let record = GroupRecord {
                group_key: group.group_key,
                ..GroupRecord::new(group.group_id.clone()).with_entity(entity_id, entity_type)
            };
            context
                .state_writer()
                .append_follow_up_event(group.group_key, removed, record)?;
        }

        let deleted = GroupRecord {
            group_key: group.group_key,
            name: group.name.clone(),
            description: group.description.clone(),
            ..GroupRecord::new(group.group_id.clone())
        };
        let intent = Intent::Group(GroupIntent::Deleted);
        context
            .state_writer()
            .append_follow_up_event(group.group_key, intent, deleted.clone())?;
        context
            .response_writer()
            .write_event_on_command(group.group_key, intent, deleted);
        Ok(())
    }
}

pub struct AddEntityToGroupProcessor;

impl TypedRecordProcessor for AddEntityToGroupProcessor {
    type Value = GroupRecord;

    fn process_record(
        &self,
        command: &TypedRecord<'_, GroupRecord>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let value = command.value();
        let group = existing_group(context.state(), &value.group_id, "update")?;
        context.check_authorization(&group_request(command, PermissionType::Update))?;
        validate_entity(context.state(), value, MemberChange::Add)?;

        if is_member(context.state(), &value.group_id, &value.entity_id, value.entity_type)? {
            return Err(Rejection::already_exists(format!(
                "Expected to add entity with ID '{}' to group with ID '{}', but the entity is already assigned to this group.",
                value.entity_id, value.group_id
            ))
            .into());
        }

        let added = with_key(&group, value);
        let intent = Intent::Group(GroupIntent::EntityAdded);
        context
            .state_writer()
            .append_follow_up_event(group.group_key, intent, added.clone())?;
        context
            .response_writer()
            .write_event_on_command(group.group_key, intent, added);
        Ok(())
    }
}

pub struct RemoveEntityFromGroupProcessor;

impl TypedRecordProcessor for RemoveEntityFromGroupProcessor {
    type Value = GroupRecord;

    fn process_record(
        &self,
        command: &TypedRecord<'_, GroupRecord>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let value = command.value();
        let group = existing_group(context.state(), &value.group_id, "update")?;
        context.check_authorization(&group_request(command, PermissionType::Update))?;
        validate_entity(context.state(), value, MemberChange::Remove)?;

        if !is_member(context.state(), &value.group_id, &value.entity_id, value.entity_type)? {
            return Err(Rejection::not_found(format!(
                "Expected to remove entity with ID '{}' from group with ID '{}', but the entity is not assigned to this group.",
                value.entity_id, value.group_id
            ))
            .into());
        }

        let removed = with_key(&group, value);
        let intent = Intent::Group(GroupIntent::EntityRemoved);
        context
            .state_writer()
            .append_follow_up_event(group.group_key, intent, removed.clone())?;
        context
            .response_writer()
            .write_event_on_command(group.group_key, intent, removed);
        Ok(())
    }
}
