use crate::engine::applier::TypedEventApplier;
use crate::engine::errors::ApplierError;
use crate::record::UserRecord;
use crate::state::ProcessingState;

pub struct UserCreatedApplier;

impl TypedEventApplier for UserCreatedApplier {
    type Value = UserRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        key: i64,
        value: &UserRecord,
    ) -> Result<(), ApplierError> {
        Ok(state.users_mut().create(key, value)?)
    }
}

/// Group memberships are gone by now; they are removed by preceding events.
pub struct UserDeletedApplier;

impl TypedEventApplier for UserDeletedApplier {
    type Value = UserRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        _key: i64,
        value: &UserRecord,
    ) -> Result<(), ApplierError> {
        Ok(state.users_mut().delete(&value.username)?)
    }
}
