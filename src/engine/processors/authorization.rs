use crate::engine::authorization::AuthorizationRequest;
use crate::engine::errors::{ProcessingError, Rejection};
use crate::engine::processor::{ProcessingContext, TypedRecordProcessor};
use crate::record::{
    AuthorizationIntent, AuthorizationOwnerType, AuthorizationRecord, AuthorizationResourceType,
    Intent, PermissionType, TypedRecord,
};

pub struct CreateAuthorizationProcessor;

impl TypedRecordProcessor for CreateAuthorizationProcessor {
    type Value = AuthorizationRecord;

    fn process_record(
        &self,
        command: &TypedRecord<'_, AuthorizationRecord>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let value = command.value();
        let owner_exists = match value.owner_type {
            // users may be managed by an external identity provider
            AuthorizationOwnerType::User => true,
            AuthorizationOwnerType::Group => context.state().groups().exists(&value.owner_id)?,
            AuthorizationOwnerType::MappingRule => {
                context.state().mapping_rules().exists(&value.owner_id)?
            }
        };
        if !owner_exists {
            return Err(Rejection::not_found(format!(
                "Expected to create authorization for owner '{}', but no owner with this ID exists.",
                value.owner_id
            ))
            .into());
        }

        context.check_authorization(&AuthorizationRequest::new(
            command.metadata(),
            AuthorizationResourceType::Authorization,
            PermissionType::Create,
        ))?;

        if value.permissions.is_empty() {
            return Err(Rejection::invalid_argument(format!(
                "Expected to create authorization for owner '{}' with at least one permission, but no permissions were given.",
                value.owner_id
            ))
            .into());
        }
        if value.resource_id.is_empty() {
            return Err(Rejection::invalid_argument(format!(
                "Expected to create authorization for owner '{}' on a resource, but no resource ID was given.",
                value.owner_id
            ))
            .into());
        }

        let key = context.next_key()?;
        let created = AuthorizationRecord {
            authorization_key: key,
            ..value.clone()
        };
        let intent = Intent::Authorization(AuthorizationIntent::Created);
        context
            .state_writer()
            .append_follow_up_event(key, intent, created.clone())?;
        context.response_writer().write_event_on_command(key, intent, created);
        Ok(())
    }
}
