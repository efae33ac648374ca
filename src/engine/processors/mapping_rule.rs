use crate::engine::authorization::AuthorizationRequest;
use crate::engine::errors::{ProcessingError, Rejection};
use crate::engine::processor::{ProcessingContext, TypedRecordProcessor};
use crate::record::{
    AuthorizationResourceType, EntityType, GroupIntent, GroupRecord, Intent, MappingRuleIntent,
    MappingRuleRecord, PermissionType, TypedRecord,
};

pub struct CreateMappingRuleProcessor;

impl TypedRecordProcessor for CreateMappingRuleProcessor {
    type Value = MappingRuleRecord;

    fn process_record(
        &self,
        command: &TypedRecord<'_, MappingRuleRecord>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let value = command.value();
        context.check_authorization(&AuthorizationRequest::new(
            command.metadata(),
            AuthorizationResourceType::MappingRule,
            PermissionType::Create,
        ))?;

        if value.mapping_rule_id.is_empty() || value.claim_name.is_empty() {
            return Err(Rejection::invalid_argument(
                "Expected to create mapping rule with a non-empty ID and claim name, but one of them was empty.",
            )
            .into());
        }
        if context.state().mapping_rules().exists(&value.mapping_rule_id)? {
            return Err(Rejection::already_exists(format!(
                "Expected to create mapping rule with ID '{}', but a mapping rule with this ID already exists.",
                value.mapping_rule_id
            ))
            .into());
        }
        if context
            .state()
            .mapping_rules()
            .find_by_claim(&value.claim_name, &value.claim_value)?
            .is_some()
        {
            return Err(Rejection::already_exists(format!(
                "Expected to create mapping rule with claimName '{}' and claimValue '{}', but a mapping rule with this claim already exists.",
                value.claim_name, value.claim_value
            ))
            .into());
        }

        let key = context.next_key()?;
        let created = MappingRuleRecord {
            mapping_rule_key: key,
            ..value.clone()
        };
        let intent = Intent::MappingRule(MappingRuleIntent::Created);
        context
            .state_writer()
            .append_follow_up_event(key, intent, created.clone())?;
        context.response_writer().write_event_on_command(key, intent, created);
        Ok(())
    }
}

/// Removes the mapping rule from every group before deleting it.
pub struct DeleteMappingRuleProcessor;

impl TypedRecordProcessor for DeleteMappingRuleProcessor {
    type Value = MappingRuleRecord;

    fn process_record(
        &self,
        command: &TypedRecord<'_, MappingRuleRecord>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let mapping_rule_id = &command.value().mapping_rule_id;
        let rule = context
            .state()
            .mapping_rules()
            .get(mapping_rule_id)?
            .ok_or_else(|| {
                Rejection::not_found(format!(
                    "Expected to delete mapping rule with ID '{}', but a mapping rule with this ID does not exist.",
                    mapping_rule_id
                ))
            })?;
        context.check_authorization(
            &AuthorizationRequest::new(
                command.metadata(),
                AuthorizationResourceType::MappingRule,
                PermissionType::Delete,
            )
            .add_resource_id(mapping_rule_id.clone()),
        )?;

        for group_id in &rule.group_ids {
            let group_key = context
                .state()
                .groups()
                .get(group_id)?
                .map(|group| group.group_key)
                .unwrap_or(command.key());
            let removed = GroupRecord {
                group_key,
                ..GroupRecord::new(group_id.clone())
                    .with_entity(mapping_rule_id.clone(), EntityType::Mapping)
            };
            context.state_writer().append_follow_up_event(
                group_key,
                Intent::Group(GroupIntent::EntityRemoved),
                removed,
            )?;
        }

        let deleted = MappingRuleRecord {
            mapping_rule_key: rule.mapping_rule_key,
            ..MappingRuleRecord::new(rule.mapping_rule_id, rule.claim_name, rule.claim_value)
                .with_name(rule.name)
        };
        let intent = Intent::MappingRule(MappingRuleIntent::Deleted);
        context
            .state_writer()
            .append_follow_up_event(deleted.mapping_rule_key, intent, deleted.clone())?;
        context
            .response_writer()
            .write_event_on_command(deleted.mapping_rule_key, intent, deleted);
        Ok(())
    }
}
