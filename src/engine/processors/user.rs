use crate::engine::authorization::AuthorizationRequest;
use crate::engine::errors::{ProcessingError, Rejection};
use crate::engine::processor::{ProcessingContext, TypedRecordProcessor};
use crate::record::{
    AuthorizationResourceType, EntityType, GroupIntent, GroupRecord, Intent, PermissionType,
    RelationType, TypedRecord, UserIntent, UserRecord,
};

pub struct CreateUserProcessor;

impl TypedRecordProcessor for CreateUserProcessor {
    type Value = UserRecord;

    fn process_record(
        &self,
        command: &TypedRecord<'_, UserRecord>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let value = command.value();
        context.check_authorization(&AuthorizationRequest::new(
            command.metadata(),
            AuthorizationResourceType::User,
            PermissionType::Create,
        ))?;

        if value.username.is_empty() {
            return Err(Rejection::invalid_argument(
                "Expected to create user with a non-empty username, but no username was given.",
            )
            .into());
        }
        if context.state().users().exists(&value.username)? {
            return Err(Rejection::already_exists(format!(
                "Expected to create user with username '{}', but a user with this username already exists.",
                value.username
            ))
            .into());
        }

        let key = context.next_key()?;
        let created = UserRecord {
            user_key: key,
            ..value.clone()
        };
        let intent = Intent::User(UserIntent::Created);
        context
            .state_writer()
            .append_follow_up_event(key, intent, created.clone())?;
        context.response_writer().write_event_on_command(key, intent, created);
        Ok(())
    }
}

/// Removes the user from every group before deleting it.
pub struct DeleteUserProcessor;

impl TypedRecordProcessor for DeleteUserProcessor {
    type Value = UserRecord;

    fn process_record(
        &self,
        command: &TypedRecord<'_, UserRecord>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let username = &command.value().username;
        let user = context.state().users().get(username)?.ok_or_else(|| {
            Rejection::not_found(format!(
                "Expected to delete user with username '{}', but a user with this username does not exist.",
                username
            ))
        })?;
        context.check_authorization(
            &AuthorizationRequest::new(
                command.metadata(),
                AuthorizationResourceType::User,
                PermissionType::Delete,
            )
            .add_resource_id(username.clone()),
        )?;

        let group_ids =
            context
                .state()
                .membership()
                .get_relations(EntityType::User, username, RelationType::Group)?;
        for group_id in group_ids {
            let group_key = context
                .state()
                .groups()
                .get(&group_id)?
                .map(|group| group.group_key)
                .unwrap_or(command.key());
            let removed = GroupRecord {
                group_key,
                ..GroupRecord::new(group_id).with_entity(username.clone(), EntityType::User)
            };
            context.state_writer().append_follow_up_event(
                group_key,
                Intent::Group(GroupIntent::EntityRemoved),
                removed,
            )?;
        }

        let deleted = UserRecord {
            user_key: user.user_key,
            username: user.username,
            name: user.name,
            email: user.email,
        };
        let intent = Intent::User(UserIntent::Deleted);
        context
            .state_writer()
            .append_follow_up_event(deleted.user_key, intent, deleted.clone())?;
        context
            .response_writer()
            .write_event_on_command(deleted.user_key, intent, deleted);
        Ok(())
    }
}
