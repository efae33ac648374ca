use crate::db::{ColumnFamily, DbResult, KeyedStateStore};
use crate::record::NO_POSITION;

use super::ColumnFamilies;

const LAST_PROCESSED_KEY: &str = "LAST_PROCESSED_EVENT_KEY";

/// Position of the last record whose effects are contained in the state.
///
/// Written in the same transaction as those effects.
pub struct LastProcessedPositionState {
    positions: ColumnFamily<String, i64>,
}

impl LastProcessedPositionState {
    pub(crate) fn new(store: &KeyedStateStore) -> Self {
        Self {
            positions: store.create_column_family(ColumnFamilies::LastProcessedPosition),
        }
    }

    pub fn get(&self) -> DbResult<i64> {
        Ok(self
            .positions
            .get(&LAST_PROCESSED_KEY.to_string())?
            .unwrap_or(NO_POSITION))
    }

    pub fn mark_as_processed(&mut self, position: i64) -> DbResult<()> {
        self.positions
            .upsert(&LAST_PROCESSED_KEY.to_string(), &position)
    }
}
