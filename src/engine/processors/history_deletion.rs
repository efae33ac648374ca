use crate::engine::authorization::AuthorizationRequest;
use crate::engine::errors::{ProcessingError, Rejection};
use crate::engine::processor::{ProcessingContext, TypedRecordProcessor};
use crate::record::{
    AuthorizationResourceType, HistoryDeletionIntent, HistoryDeletionRecord, HistoryDeletionType,
    Intent, PermissionType, TypedRecord, DEFAULT_TENANT,
};

/// Marks the history of a process or decision resource as deleted.
///
/// Commands issued by a batch operation were authorized when the batch was
/// created and skip the check here.
pub struct DeleteHistoryProcessor;

impl DeleteHistoryProcessor {
    fn authorization_request(
        command: &TypedRecord<'_, HistoryDeletionRecord>,
    ) -> Option<AuthorizationRequest> {
        let value = command.value();
        match value.resource_type {
            HistoryDeletionType::ProcessInstance => Some(
                AuthorizationRequest::new(
                    command.metadata(),
                    AuthorizationResourceType::ProcessDefinition,
                    PermissionType::DeleteProcessInstance,
                )
                .add_resource_id(value.process_id.clone()),
            ),
            HistoryDeletionType::DecisionInstance => Some(
                AuthorizationRequest::new(
                    command.metadata(),
                    AuthorizationResourceType::DecisionDefinition,
                    PermissionType::DeleteDecisionInstance,
                )
                .add_resource_id(value.decision_definition_id.clone()),
            ),
            HistoryDeletionType::ProcessDefinition | HistoryDeletionType::DecisionDefinition => {
                None
            }
        }
    }
}

impl TypedRecordProcessor for DeleteHistoryProcessor {
    type Value = HistoryDeletionRecord;

    fn process_record(
        &self,
        command: &TypedRecord<'_, HistoryDeletionRecord>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let mut value = command.value().clone();
        if value.tenant_id.is_empty() {
            value.tenant_id = DEFAULT_TENANT.to_string();
        }

        if command.metadata().batch_operation_reference.is_none() {
            if let Some(request) = Self::authorization_request(command) {
                context.check_authorization(&request)?;
            }
        }

        if context.state().history_deletions().is_deleted(
            &value.tenant_id,
            value.resource_type,
            value.resource_key,
        )? {
            return Err(Rejection::invalid_state(format!(
                "Expected to delete history for {} with key '{}', but it is already deleted.",
                value.resource_type, value.resource_key
            ))
            .into());
        }

        let key = value.resource_key;
        let intent = Intent::HistoryDeletion(HistoryDeletionIntent::Deleted);
        context
            .state_writer()
            .append_follow_up_event(key, intent, value.clone())?;
        context.response_writer().write_event_on_command(key, intent, value);
        Ok(())
    }
}
