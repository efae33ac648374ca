//! Storage for encoded log records

use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::errors::LogError;

/// Ordered storage of encoded records by position.
///
/// An empty log has `first_position() == 1` and `last_position() == 0`.
pub trait LogStorage: Send + Sync {
    /// Append records; positions must be greater than `last_position()`.
    fn append(&self, records: &[(i64, Bytes)]) -> Result<(), LogError>;

    /// Up to `limit` records with position >= `position`, in order.
    fn read_from(&self, position: i64, limit: usize) -> Result<Vec<(i64, Bytes)>, LogError>;

    fn first_position(&self) -> i64;

    fn last_position(&self) -> i64;

    /// Remove records with position <= `up_to`. Returns the number removed.
    fn compact(&self, up_to: i64) -> Result<usize, LogError>;
}

#[derive(Debug, Default)]
pub struct MemoryLogStorage {
    records: RwLock<BTreeMap<i64, Bytes>>,
    compacted_up_to: RwLock<i64>,
}

impl MemoryLogStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> LogError {
    LogError::Storage("log storage lock poisoned".to_string())
}

impl LogStorage for MemoryLogStorage {
    fn append(&self, records: &[(i64, Bytes)]) -> Result<(), LogError> {
        let mut stored = self.records.write().map_err(|_| poisoned())?;
        let mut previous = stored
            .keys()
            .next_back()
            .copied()
            .unwrap_or(*self.compacted_up_to.read().map_err(|_| poisoned())?);
        for (position, _) in records {
            if *position <= previous {
                return Err(LogError::PositionOutOfOrder {
                    previous,
                    current: *position,
                });
            }
            previous = *position;
        }
        for (position, bytes) in records {
            stored.insert(*position, bytes.clone());
        }
        Ok(())
    }

    fn read_from(&self, position: i64, limit: usize) -> Result<Vec<(i64, Bytes)>, LogError> {
        let stored = self.records.read().map_err(|_| poisoned())?;
        Ok(stored
            .range(position..)
            .take(limit)
            .map(|(p, b)| (*p, b.clone()))
            .collect())
    }

    fn first_position(&self) -> i64 {
        let compacted = self.compacted_up_to.read().map(|c| *c).unwrap_or(0);
        self.records
            .read()
            .ok()
            .and_then(|r| r.keys().next().copied())
            .unwrap_or(compacted + 1)
    }

    fn last_position(&self) -> i64 {
        let compacted = self.compacted_up_to.read().map(|c| *c).unwrap_or(0);
        self.records
            .read()
            .ok()
            .and_then(|r| r.keys().next_back().copied())
            .unwrap_or(compacted)
    }

    fn compact(&self, up_to: i64) -> Result<usize, LogError> {
        let mut stored = self.records.write().map_err(|_| poisoned())?;
        let retained = stored.split_off(&(up_to + 1));
        let removed = stored.len();
        *stored = retained;

        let mut compacted = self.compacted_up_to.write().map_err(|_| poisoned())?;
        *compacted = (*compacted).max(up_to);
        Ok(removed)
    }
}
