//! Replay: rebuild state from committed events
//!
//! Only events reach the appliers; commands are never processed again.
//! Follow-up records are grouped by their source command. A group is
//! committed together with the source position as last processed position,
//! so a crash in the middle of replay is resumed without applying an event
//! twice. Records with a source at or below the last processed position are
//! already contained in the state and are skipped.

use slog::{debug, Logger};
use std::sync::Arc;

use super::errors::StreamProcessorError;
use crate::engine::Engine;
use crate::log::LogStreamReader;
use crate::record::{Record, NO_POSITION};
use crate::state::ProcessingState;

/// Counters of one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events_applied: u64,
    pub records_skipped: u64,
    pub last_processed_position: i64,
}

pub struct ReplayStateMachine {
    engine: Arc<Engine>,
    logger: Logger,
    last_read_position: i64,
    last_processed_position: i64,
    pending_source: Option<i64>,
    summary: ReplaySummary,
}

impl ReplayStateMachine {
    pub fn new(engine: Arc<Engine>, last_processed_position: i64, logger: Logger) -> Self {
        Self {
            engine,
            logger,
            last_read_position: NO_POSITION,
            last_processed_position,
            pending_source: None,
            summary: ReplaySummary {
                last_processed_position,
                ..ReplaySummary::default()
            },
        }
    }

    pub fn last_processed_position(&self) -> i64 {
        self.last_processed_position
    }

    pub fn summary(&self) -> ReplaySummary {
        self.summary
    }

    /// Replay a single record.
    ///
    /// # Errors
    /// * `PositionOutOfOrder` - The record does not follow the previous one; fatal
    /// * `Applier` - The event could not be applied; fatal
    pub fn replay_record(
        &mut self,
        state: &mut ProcessingState,
        record: &Record,
    ) -> Result<(), StreamProcessorError> {
        if record.position <= self.last_read_position {
            return Err(StreamProcessorError::PositionOutOfOrder {
                previous: self.last_read_position,
                current: record.position,
            });
        }
        self.last_read_position = record.position;

        if record.is_command() {
            self.flush(state)?;
            self.summary.records_skipped += 1;
            return Ok(());
        }

        // records without a source stand on their own
        let source = if record.source_record_position == NO_POSITION {
            self.flush(state)?;
            record.position
        } else {
            record.source_record_position
        };

        if source <= self.last_processed_position {
            self.summary.records_skipped += 1;
            return Ok(());
        }
        if self.pending_source != Some(source) {
            self.flush(state)?;
            self.pending_source = Some(source);
        }

        if record.is_event() {
            self.engine
                .replay_event(state, record)
                .map_err(|source| StreamProcessorError::Applier {
                    position: record.position,
                    source,
                })?;
            state.key_generator_mut().set_key_if_higher(record.key)?;
            self.summary.events_applied += 1;
        }

        if record.source_record_position == NO_POSITION {
            self.flush(state)?;
        }
        Ok(())
    }

    /// Commit the pending group of records with its source as last processed position.
    pub fn flush(&mut self, state: &mut ProcessingState) -> Result<(), StreamProcessorError> {
        if let Some(source) = self.pending_source.take() {
            state.last_processed_mut().mark_as_processed(source)?;
            state.store().transaction_context().commit()?;
            self.last_processed_position = source;
            self.summary.last_processed_position = source;
        }
        Ok(())
    }

    /// Replay every committed record the reader has, then flush.
    pub fn replay_available(
        &mut self,
        state: &mut ProcessingState,
        reader: &mut LogStreamReader,
    ) -> Result<ReplaySummary, StreamProcessorError> {
        while let Some(record) = reader.next_record() {
            let record = record?;
            self.replay_record(state, &record).map_err(|e| {
                state.store().transaction_context().rollback().ok();
                e
            })?;
        }
        self.flush(state)?;
        debug!(self.logger, "Replayed available records";
            "events_applied" => self.summary.events_applied,
            "last_processed_position" => self.last_processed_position
        );
        Ok(self.summary)
    }
}
