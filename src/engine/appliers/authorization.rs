use crate::engine::applier::TypedEventApplier;
use crate::engine::errors::ApplierError;
use crate::record::AuthorizationRecord;
use crate::state::ProcessingState;

pub struct AuthorizationCreatedApplier;

impl TypedEventApplier for AuthorizationCreatedApplier {
    type Value = AuthorizationRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        key: i64,
        value: &AuthorizationRecord,
    ) -> Result<(), ApplierError> {
        if value.permissions.is_empty() {
            return Err(ApplierError::IllegalState(format!(
                "Expected to create authorization for owner '{}' with permissions, but none were given.",
                value.owner_id
            )));
        }
        Ok(state.authorizations_mut().create(key, value)?)
    }
}
