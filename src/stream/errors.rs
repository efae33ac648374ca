use thiserror::Error;

use crate::db::{DbError, SnapshotError};
use crate::engine::{ApplierError, ProcessingError};
use crate::log::LogError;

use super::phase::StreamProcessorPhase;

/// Faults that stop a stream processor
#[derive(Debug, Error)]
pub enum StreamProcessorError {
    #[error("Expected record positions to strictly increase, but position {current} followed {previous}")]
    PositionOutOfOrder { previous: i64, current: i64 },

    #[error("Failed to apply event at position {position}: {source}")]
    Applier {
        position: i64,
        #[source]
        source: ApplierError,
    },

    #[error("Failed to process command at position {position}: {source}")]
    Processing {
        position: i64,
        #[source]
        source: ProcessingError,
    },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Expected stream processor to accept {action}, but it is {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: StreamProcessorPhase,
    },

    #[error("Stream processor is closed")]
    Closed,
}
