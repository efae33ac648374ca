use thiserror::Error;

use crate::record::CodecError;

#[derive(Debug, Error)]
pub enum LogError {
    /// Too many records are waiting for replication; retry after the commit position advances
    #[error("log is backpressured: {uncommitted} uncommitted records (limit {limit})")]
    Backpressure { uncommitted: usize, limit: usize },

    /// A record does not have a position greater than its predecessor
    #[error("record position {current} does not follow previous position {previous}")]
    PositionOutOfOrder { previous: i64, current: i64 },

    #[error("cannot compact up to {requested}: commit position is {commit_position}")]
    CompactionBeyondCommit { requested: i64, commit_position: i64 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("log storage error: {0}")]
    Storage(String),
}

impl LogError {
    pub fn is_backpressure(&self) -> bool {
        matches!(self, LogError::Backpressure { .. })
    }
}
