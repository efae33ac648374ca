//! Writers through which processors declare what a command results in
//!
//! Nothing a writer receives is visible outside the partition before the
//! stream processor commits the command's transaction.

use super::applier::EventAppliers;
use super::errors::{ApplierError, ProcessingError, Rejection};
use super::result::ProcessingResultBuilder;
use crate::record::{Intent, RecordMetadata, TypedValue};
use crate::state::ProcessingState;

/// Declares follow-up events and applies them to state right away, so later
/// steps of the same command observe their effect.
pub struct StateWriter<'a> {
    pub(crate) state: &'a mut ProcessingState,
    pub(crate) appliers: &'a EventAppliers,
    pub(crate) result: &'a mut ProcessingResultBuilder,
}

impl StateWriter<'_> {
    /// Append an event for `key` and apply it with the latest applier of `intent`.
    ///
    /// # Errors
    /// * `BatchTooLarge` - The command already produced the maximum number of records
    /// * `Applier` - The event could not be applied; the partition must halt
    pub fn append_follow_up_event<V: TypedValue>(
        &mut self,
        key: i64,
        intent: Intent,
        value: V,
    ) -> Result<(), ProcessingError> {
        let version = self
            .appliers
            .latest_version(intent)
            .ok_or(ApplierError::MissingApplier { intent, version: 0 })?;
        self.result.ensure_capacity()?;

        let value = value.into_record_value();
        self.appliers
            .apply_state(self.state, key, intent, version, &value)?;
        self.result
            .append_record(key, RecordMetadata::event(intent, version), value)
    }
}

/// Declares the response sent to the client once the command is committed.
pub struct ResponseWriter<'a> {
    pub(crate) appliers: &'a EventAppliers,
    pub(crate) result: &'a mut ProcessingResultBuilder,
}

impl ResponseWriter<'_> {
    pub fn write_event_on_command<V: TypedValue>(&mut self, key: i64, intent: Intent, value: V) {
        let version = self.appliers.latest_version(intent).unwrap_or(1);
        self.result.set_response(
            key,
            RecordMetadata::event(intent, version),
            value.into_record_value(),
        );
    }

    pub fn write_rejection_on_command(&mut self, rejection: &Rejection) {
        self.result.set_rejection_response(rejection);
    }
}

/// Appends the rejection record of the current command to the log.
pub struct RejectionWriter<'a> {
    pub(crate) result: &'a mut ProcessingResultBuilder,
}

impl RejectionWriter<'_> {
    pub fn append_rejection(&mut self, rejection: &Rejection) -> Result<(), ProcessingError> {
        self.result.append_rejection(rejection)
    }
}
