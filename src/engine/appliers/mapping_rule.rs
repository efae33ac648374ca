use crate::engine::applier::TypedEventApplier;
use crate::engine::errors::ApplierError;
use crate::record::MappingRuleRecord;
use crate::state::ProcessingState;

pub struct MappingRuleCreatedApplier;

impl TypedEventApplier for MappingRuleCreatedApplier {
    type Value = MappingRuleRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        key: i64,
        value: &MappingRuleRecord,
    ) -> Result<(), ApplierError> {
        Ok(state.mapping_rules_mut().create(key, value)?)
    }
}

pub struct MappingRuleDeletedApplier;

impl TypedEventApplier for MappingRuleDeletedApplier {
    type Value = MappingRuleRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        _key: i64,
        value: &MappingRuleRecord,
    ) -> Result<(), ApplierError> {
        let rule = state
            .mapping_rules()
            .get(&value.mapping_rule_id)?
            .ok_or_else(|| {
                ApplierError::IllegalState(format!(
                    "Expected to delete mapping rule '{}', but it does not exist.",
                    value.mapping_rule_id
                ))
            })?;
        if !rule.group_ids.is_empty() {
            return Err(ApplierError::IllegalState(format!(
                "Expected to delete mapping rule '{}', but it is still assigned to groups {:?}.",
                value.mapping_rule_id, rule.group_ids
            )));
        }
        Ok(state.mapping_rules_mut().delete(&value.mapping_rule_id)?)
    }
}
