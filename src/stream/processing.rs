//! Processing of a single command
//!
//! Per command, in this order:
//! 1. process the command (or write its rejection after rolling back)
//! 2. mark the command position as processed in the same transaction
//! 3. append the follow-up records to the log
//! 4. commit the transaction
//! 5. deliver the response and publish the events
//!
//! If the log refuses the append (backpressure) the transaction is rolled back
//! and the same command is processed again later. A failed commit after the
//! append is fatal; the records are in the log and replay restores the state.

use rand::Rng;
use slog::{debug, warn, Logger};
use std::sync::Arc;
use std::time::Duration;

use super::errors::StreamProcessorError;
use super::event_bus::EventBus;
use super::processor::StreamProcessorConfig;
use super::response::ResponseRegistry;
use crate::engine::{Engine, ProcessingError, ProcessingResult};
use crate::log::{LogError, LogStream};
use crate::record::Record;
use crate::state::ProcessingState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Committed; the position of the last written record, if any
    Processed { last_written_position: Option<i64> },
    /// The command was processed before
    Skipped,
    /// Nothing was written; process the command again once the log has capacity
    Backpressured,
}

pub struct ProcessingStateMachine {
    engine: Arc<Engine>,
    log: Arc<LogStream>,
    responses: Arc<ResponseRegistry>,
    event_bus: Arc<EventBus<Record>>,
    config: StreamProcessorConfig,
    logger: Logger,
}

impl ProcessingStateMachine {
    pub fn new(
        engine: Arc<Engine>,
        log: Arc<LogStream>,
        responses: Arc<ResponseRegistry>,
        event_bus: Arc<EventBus<Record>>,
        config: StreamProcessorConfig,
        logger: Logger,
    ) -> Self {
        Self {
            engine,
            log,
            responses,
            event_bus,
            config,
            logger,
        }
    }

    /// Fail every waiting request; used when the processor stops.
    pub fn clear_pending_responses(&self) {
        self.responses.clear();
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_backoff_ms.max(1);
        let backoff = base.saturating_mul(1 << attempt.min(10));
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(backoff + jitter)
    }

    /// Process `command` and everything it leads to.
    pub async fn process_command(
        &self,
        state: &mut ProcessingState,
        command: &Record,
    ) -> Result<CommandOutcome, StreamProcessorError> {
        let transaction = state.store().transaction_context().clone();
        let result = match self.process_with_retry(state, command).await {
            Ok(Some(result)) => result,
            Ok(None) => return Ok(CommandOutcome::Skipped),
            Err(e) => {
                transaction.rollback()?;
                return Err(e);
            }
        };

        if let Err(e) = state.last_processed_mut().mark_as_processed(command.position) {
            transaction.rollback()?;
            return Err(e.into());
        }

        let ProcessingResult { records, response } = result;
        let written = match self.log.try_write_records(records) {
            Ok(written) => written,
            Err(e) => {
                transaction.rollback()?;
                if let LogError::Backpressure { uncommitted, limit } = e {
                    debug!(self.logger, "Log is backpressured, retrying command later";
                        "position" => command.position,
                        "uncommitted" => uncommitted,
                        "limit" => limit
                    );
                    return Ok(CommandOutcome::Backpressured);
                }
                return Err(e.into());
            }
        };

        transaction.commit()?;

        if let Some(response) = response {
            self.responses.complete(response);
        }
        let last_written_position = written.last().map(|record| record.position);
        self.event_bus
            .publish_batch(written.into_iter().filter(Record::is_event));

        Ok(CommandOutcome::Processed {
            last_written_position,
        })
    }

    /// Run the engine; transient failures are retried, rejections and
    /// non-fatal failures become a rejection result. `None` if the command
    /// was processed before.
    async fn process_with_retry(
        &self,
        state: &mut ProcessingState,
        command: &Record,
    ) -> Result<Option<ProcessingResult>, StreamProcessorError> {
        let transaction = state.store().transaction_context().clone();
        let mut attempt = 0;
        loop {
            let error = match self.try_process(state, command) {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };
            transaction.rollback()?;

            if error.is_fatal() {
                return Err(StreamProcessorError::Processing {
                    position: command.position,
                    source: error,
                });
            }

            if error.is_transient() {
                if attempt >= self.config.max_command_retries {
                    return Err(StreamProcessorError::Processing {
                        position: command.position,
                        source: error,
                    });
                }
                let delay = self.retry_delay(attempt);
                warn!(self.logger, "Transient failure while processing command, retrying";
                    "position" => command.position,
                    "attempt" => attempt + 1,
                    "delay_ms" => delay.as_millis() as u64,
                    "error" => %error
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
                continue;
            }

            return self.reject(command, error).map(Some);
        }
    }

    fn try_process(
        &self,
        state: &mut ProcessingState,
        command: &Record,
    ) -> Result<Option<ProcessingResult>, ProcessingError> {
        if command.position <= state.last_processed().get()? {
            return Ok(None);
        }
        self.engine.process_command(state, command).map(Some)
    }

    fn reject(
        &self,
        command: &Record,
        error: ProcessingError,
    ) -> Result<ProcessingResult, StreamProcessorError> {
        let rejection = error.to_rejection();
        if !matches!(error, ProcessingError::Rejected(_)) {
            warn!(self.logger, "Failed to process command, rejecting it";
                "command" => %command,
                "error" => %error
            );
        } else {
            debug!(self.logger, "Command rejected";
                "command" => %command,
                "rejection" => %rejection
            );
        }
        self.engine
            .write_rejection(command, &rejection)
            .map_err(|source| StreamProcessorError::Processing {
                position: command.position,
                source,
            })
    }
}
