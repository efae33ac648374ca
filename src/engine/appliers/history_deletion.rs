use crate::engine::applier::TypedEventApplier;
use crate::engine::errors::ApplierError;
use crate::record::HistoryDeletionRecord;
use crate::state::{PersistedHistoryDeletion, ProcessingState};

pub struct HistoryDeletionDeletedApplier;

impl TypedEventApplier for HistoryDeletionDeletedApplier {
    type Value = HistoryDeletionRecord;

    fn apply_state(
        &self,
        state: &mut ProcessingState,
        _key: i64,
        value: &HistoryDeletionRecord,
    ) -> Result<(), ApplierError> {
        Ok(state
            .history_deletions_mut()
            .insert(PersistedHistoryDeletion::from(value))?)
    }
}
