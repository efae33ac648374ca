//! Log stream: position assignment, commit tracking and readers

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::errors::LogError;
use super::storage::{LogStorage, MemoryLogStorage};
use crate::record::{decode_record, encode_record, Record, RecordHeader, RecordMetadata, RecordValue};

const READ_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogStreamConfig {
    /// Appends are refused while this many records await commit (0 = unlimited)
    pub max_uncommitted_records: usize,
    /// Treat every append as committed immediately (single replica)
    pub auto_commit: bool,
}

impl Default for LogStreamConfig {
    fn default() -> Self {
        Self {
            max_uncommitted_records: 10_000,
            auto_commit: true,
        }
    }
}

/// A record to append; the log assigns position and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogAppendEntry {
    pub key: i64,
    pub source_record_position: i64,
    pub metadata: RecordMetadata,
    pub value: RecordValue,
}

pub struct LogStream {
    partition_id: u32,
    storage: Arc<dyn LogStorage>,
    config: LogStreamConfig,
    /// Serializes appends; holds the last assigned position
    writer: Mutex<i64>,
    commit_position: Arc<AtomicI64>,
    appended_tx: watch::Sender<i64>,
    committed_tx: watch::Sender<i64>,
}

fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl LogStream {
    /// Open a log stream over existing storage.
    ///
    /// Records already in storage are considered committed.
    pub fn new(partition_id: u32, storage: Arc<dyn LogStorage>, config: LogStreamConfig) -> Self {
        let last_position = storage.last_position();
        let (appended_tx, _) = watch::channel(last_position);
        let (committed_tx, _) = watch::channel(last_position);
        Self {
            partition_id,
            storage,
            config,
            writer: Mutex::new(last_position),
            commit_position: Arc::new(AtomicI64::new(last_position)),
            appended_tx,
            committed_tx,
        }
    }

    pub fn in_memory(partition_id: u32, config: LogStreamConfig) -> Self {
        Self::new(partition_id, Arc::new(MemoryLogStorage::new()), config)
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    pub fn first_position(&self) -> i64 {
        self.storage.first_position()
    }

    pub fn last_position(&self) -> i64 {
        self.storage.last_position()
    }

    pub fn commit_position(&self) -> i64 {
        self.commit_position.load(Ordering::SeqCst)
    }

    fn uncommitted(&self, last_position: i64) -> usize {
        (last_position - self.commit_position()).max(0) as usize
    }

    /// Whether the next append would be refused.
    pub fn is_backpressured(&self) -> bool {
        self.config.max_uncommitted_records > 0
            && self.uncommitted(self.last_position()) >= self.config.max_uncommitted_records
    }

    /// Append a batch atomically.
    ///
    /// # Returns
    /// * `Ok(position)` - Position of the last record of the batch
    /// * `Err(LogError::Backpressure)` - Too many uncommitted records; nothing was written
    pub fn try_write(&self, entries: Vec<LogAppendEntry>) -> Result<i64, LogError> {
        let mut last_position = self
            .writer
            .lock()
            .map_err(|_| LogError::Storage("log writer lock poisoned".to_string()))?;
        Ok(self
            .write_locked(&mut last_position, entries)?
            .last()
            .map(|record| record.position)
            .unwrap_or(*last_position))
    }

    /// Like [`LogStream::try_write`], returning the records as written.
    pub fn try_write_records(&self, entries: Vec<LogAppendEntry>) -> Result<Vec<Record>, LogError> {
        let mut last_position = self
            .writer
            .lock()
            .map_err(|_| LogError::Storage("log writer lock poisoned".to_string()))?;
        self.write_locked(&mut last_position, entries)
    }

    fn write_locked(
        &self,
        last_position: &mut i64,
        entries: Vec<LogAppendEntry>,
    ) -> Result<Vec<Record>, LogError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let uncommitted = self.uncommitted(*last_position);
        let limit = self.config.max_uncommitted_records;
        if limit > 0 && uncommitted >= limit {
            return Err(LogError::Backpressure { uncommitted, limit });
        }

        let timestamp = current_timestamp();
        let mut encoded = Vec::with_capacity(entries.len());
        let mut records = Vec::with_capacity(entries.len());
        let mut position = *last_position;
        for entry in entries {
            position += 1;
            let record = Record {
                position,
                source_record_position: entry.source_record_position,
                key: entry.key,
                timestamp,
                partition_id: self.partition_id,
                metadata: entry.metadata,
                value: entry.value,
            };
            encoded.push((position, encode_record(&record)?));
            records.push(record);
        }

        self.storage.append(&encoded)?;
        *last_position = position;

        if self.config.auto_commit {
            self.set_commit_position(position);
        }
        self.appended_tx.send_replace(position);
        Ok(records)
    }

    /// Append records replicated from another replica, keeping their positions.
    pub fn append_replicated(&self, records: Vec<Bytes>) -> Result<i64, LogError> {
        let mut last_position = self
            .writer
            .lock()
            .map_err(|_| LogError::Storage("log writer lock poisoned".to_string()))?;

        let mut previous = *last_position;
        let mut entries = Vec::with_capacity(records.len());
        for bytes in records {
            let header = RecordHeader::decode(&bytes)?;
            if header.position <= previous {
                return Err(LogError::PositionOutOfOrder {
                    previous,
                    current: header.position,
                });
            }
            previous = header.position;
            entries.push((header.position, bytes));
        }
        if entries.is_empty() {
            return Ok(*last_position);
        }

        self.storage.append(&entries)?;
        *last_position = previous;
        drop(last_position);

        if self.config.auto_commit {
            self.set_commit_position(previous);
        }
        self.appended_tx.send_replace(previous);
        Ok(previous)
    }

    /// Advance the commit position. Lower values than the current one are ignored.
    pub fn set_commit_position(&self, position: i64) {
        let bounded = position.min(self.last_position());
        let previous = self.commit_position.fetch_max(bounded, Ordering::SeqCst);
        if bounded > previous {
            self.committed_tx.send_replace(bounded);
        }
    }

    /// Watch the last appended position.
    pub fn subscribe_appends(&self) -> watch::Receiver<i64> {
        self.appended_tx.subscribe()
    }

    /// Watch the commit position.
    pub fn subscribe_commits(&self) -> watch::Receiver<i64> {
        self.committed_tx.subscribe()
    }

    /// A reader positioned at the first record.
    pub fn new_reader(&self) -> LogStreamReader {
        LogStreamReader {
            storage: self.storage.clone(),
            commit_position: self.commit_position.clone(),
            next_position: self.storage.first_position(),
            buffer: VecDeque::new(),
        }
    }

    /// Remove records up to `position`; only committed records can be removed.
    pub fn compact(&self, position: i64) -> Result<usize, LogError> {
        let commit_position = self.commit_position();
        if position > commit_position {
            return Err(LogError::CompactionBeyondCommit {
                requested: position,
                commit_position,
            });
        }
        self.storage.compact(position)
    }
}

/// Reads committed records in position order
pub struct LogStreamReader {
    storage: Arc<dyn LogStorage>,
    commit_position: Arc<AtomicI64>,
    next_position: i64,
    buffer: VecDeque<(i64, Bytes)>,
}

impl LogStreamReader {
    /// Continue reading at the first record with position >= `position`.
    pub fn seek(&mut self, position: i64) {
        self.buffer.clear();
        self.next_position = position;
    }

    /// Position the next read starts from (not necessarily an existing record).
    pub fn next_position(&self) -> i64 {
        self.next_position
    }

    /// Whether a committed record is available.
    pub fn has_next(&mut self) -> Result<bool, LogError> {
        self.fill()?;
        Ok(!self.buffer.is_empty())
    }

    fn fill(&mut self) -> Result<(), LogError> {
        if !self.buffer.is_empty() {
            return Ok(());
        }
        let commit_position = self.commit_position.load(Ordering::SeqCst);
        if self.next_position > commit_position {
            return Ok(());
        }
        for (position, bytes) in self.storage.read_from(self.next_position, READ_BATCH_SIZE)? {
            if position > commit_position {
                break;
            }
            self.buffer.push_back((position, bytes));
        }
        Ok(())
    }

    /// Next committed record, or `None` when the reader reached the commit position.
    pub fn next_record(&mut self) -> Option<Result<Record, LogError>> {
        if let Err(e) = self.fill() {
            return Some(Err(e));
        }
        let (position, bytes) = self.buffer.pop_front()?;
        self.next_position = position + 1;
        Some(decode_record(&bytes).map_err(LogError::from))
    }
}

impl Iterator for LogStreamReader {
    type Item = Result<Record, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{GroupIntent, GroupRecord, Intent, NO_KEY, NO_POSITION};

    fn command(group_id: &str) -> LogAppendEntry {
        LogAppendEntry {
            key: NO_KEY,
            source_record_position: NO_POSITION,
            metadata: RecordMetadata::command(Intent::Group(GroupIntent::Create)),
            value: GroupRecord::new(group_id).into(),
        }
    }

    #[test]
    fn test_positions_strictly_increase() {
        let log = LogStream::in_memory(1, LogStreamConfig::default());
        assert_eq!(log.try_write(vec![command("a"), command("b")]).unwrap(), 2);
        assert_eq!(log.try_write(vec![command("c")]).unwrap(), 3);

        let positions: Vec<i64> = log.new_reader().map(|r| r.unwrap().position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn test_reader_stops_at_commit_position() {
        let config = LogStreamConfig {
            max_uncommitted_records: 0,
            auto_commit: false,
        };
        let log = LogStream::in_memory(1, config);
        log.try_write(vec![command("a"), command("b"), command("c")])
            .unwrap();

        let mut reader = log.new_reader();
        assert!(!reader.has_next().unwrap());

        log.set_commit_position(2);
        let positions: Vec<i64> = reader.by_ref().map(|r| r.unwrap().position).collect();
        assert_eq!(positions, vec![1, 2]);

        log.set_commit_position(3);
        assert_eq!(reader.next_record().unwrap().unwrap().position, 3);
    }

    #[test]
    fn test_backpressure_until_commit() {
        let config = LogStreamConfig {
            max_uncommitted_records: 2,
            auto_commit: false,
        };
        let log = LogStream::in_memory(1, config);
        log.try_write(vec![command("a"), command("b")]).unwrap();

        assert!(log.is_backpressured());
        let err = log.try_write(vec![command("c")]).unwrap_err();
        assert!(err.is_backpressure());
        assert_eq!(log.last_position(), 2);

        log.set_commit_position(2);
        assert!(!log.is_backpressured());
        assert_eq!(log.try_write(vec![command("c")]).unwrap(), 3);
    }

    #[test]
    fn test_replicated_records_keep_positions() {
        let leader = LogStream::in_memory(1, LogStreamConfig::default());
        leader.try_write(vec![command("a"), command("b")]).unwrap();

        let encoded: Vec<Bytes> = leader
            .new_reader()
            .map(|r| encode_record(&r.unwrap()).unwrap())
            .collect();

        let follower = LogStream::in_memory(1, LogStreamConfig::default());
        assert_eq!(follower.append_replicated(encoded.clone()).unwrap(), 2);
        let err = follower.append_replicated(vec![encoded[0].clone()]).unwrap_err();
        assert!(matches!(
            err,
            LogError::PositionOutOfOrder {
                previous: 2,
                current: 1
            }
        ));
    }

    #[test]
    fn test_compaction_requires_commit() {
        let config = LogStreamConfig {
            max_uncommitted_records: 0,
            auto_commit: false,
        };
        let log = LogStream::in_memory(1, config);
        log.try_write(vec![command("a"), command("b")]).unwrap();
        assert!(log.compact(1).is_err());

        log.set_commit_position(2);
        assert_eq!(log.compact(1).unwrap(), 1);
        let mut reader = log.new_reader();
        assert_eq!(reader.next_record().unwrap().unwrap().position, 2);
    }

    #[tokio::test]
    async fn test_append_notification() {
        let log = LogStream::in_memory(1, LogStreamConfig::default());
        let mut appended = log.subscribe_appends();
        log.try_write(vec![command("a")]).unwrap();

        appended.changed().await.unwrap();
        assert_eq!(*appended.borrow(), 1);
    }
}
