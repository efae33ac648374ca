//! Processing Engine (Layer 5)
//!
//! Turns commands into follow-up events, responses and rejections, and applies
//! events to state. The engine is built once per partition with a static
//! dispatch table for processors (by command intent) and appliers (by event
//! intent and version); it holds no per-command state.

pub mod applier;
pub mod appliers;
pub mod authorization;
pub mod errors;
pub mod processor;
pub mod processors;
pub mod result;
pub mod writers;

pub use applier::{EventAppliers, TypedEventApplier};
pub use authorization::{AuthorizationCheckBehavior, AuthorizationRequest};
pub use errors::{ApplierError, ProcessingError, Rejection};
pub use processor::{ProcessingContext, RecordProcessors, TypedRecordProcessor};
pub use result::{CommandResponse, ProcessingResult};
pub use writers::{RejectionWriter, ResponseWriter, StateWriter};

use result::ProcessingResultBuilder;

use crate::record::Record;
use crate::state::ProcessingState;

/// Default limit of records one command may produce
pub const DEFAULT_MAX_FOLLOW_UP_RECORDS: usize = 1_000;

pub struct Engine {
    appliers: EventAppliers,
    processors: RecordProcessors,
    authorization: AuthorizationCheckBehavior,
    max_follow_up_records: usize,
}

impl Engine {
    /// Engine with every processor and applier of the domain registered.
    ///
    /// # Arguments
    /// * `authorization_checks` - Whether commands are checked against granted permissions
    /// * `max_follow_up_records` - Records one command may produce (0 = unlimited)
    pub fn new(authorization_checks: bool, max_follow_up_records: usize) -> Self {
        let mut appliers = EventAppliers::new();
        appliers::register_event_appliers(&mut appliers);
        let mut processors = RecordProcessors::new();
        processors::register_record_processors(&mut processors);
        Self::with_registries(
            appliers,
            processors,
            AuthorizationCheckBehavior::new(authorization_checks),
            max_follow_up_records,
        )
    }

    pub fn with_registries(
        appliers: EventAppliers,
        processors: RecordProcessors,
        authorization: AuthorizationCheckBehavior,
        max_follow_up_records: usize,
    ) -> Self {
        Self {
            appliers,
            processors,
            authorization,
            max_follow_up_records,
        }
    }

    pub fn appliers(&self) -> &EventAppliers {
        &self.appliers
    }

    /// Process one command against `state`.
    ///
    /// Follow-up events are applied to `state` as they are declared. On any
    /// error, including a rejection, `state` holds partial changes and the
    /// caller must roll back the transaction before writing the rejection.
    pub fn process_command(
        &self,
        state: &mut ProcessingState,
        command: &Record,
    ) -> Result<ProcessingResult, ProcessingError> {
        let mut result = ProcessingResultBuilder::new(command, self.max_follow_up_records);
        let mut context =
            ProcessingContext::new(state, &self.appliers, self.authorization, &mut result);
        self.processors.process(command, &mut context)?;
        Ok(result.build())
    }

    /// The rejection record and response of a command that was not accepted.
    pub fn write_rejection(
        &self,
        command: &Record,
        rejection: &Rejection,
    ) -> Result<ProcessingResult, ProcessingError> {
        let mut result = ProcessingResultBuilder::new(command, self.max_follow_up_records);
        let mut rejection_writer = RejectionWriter {
            result: &mut result,
        };
        rejection_writer.append_rejection(rejection)?;
        let mut response_writer = ResponseWriter {
            appliers: &self.appliers,
            result: &mut result,
        };
        response_writer.write_rejection_on_command(rejection);
        Ok(result.build())
    }

    /// Apply a committed event during replay, with the applier version it was written with.
    pub fn replay_event(&self, state: &mut ProcessingState, event: &Record) -> Result<(), ApplierError> {
        self.appliers.apply_state(
            state,
            event.key,
            event.intent(),
            event.metadata.record_version,
            &event.value,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeyedStateStore;
    use crate::record::{
        AuthInfo, EntityType, GroupIntent, GroupRecord, Intent, RecordMetadata, RecordType,
        RecordValue, RejectionType,
    };

    fn command(position: i64, intent: GroupIntent, value: GroupRecord) -> Record {
        Record {
            position,
            source_record_position: -1,
            key: -1,
            timestamp: 0,
            partition_id: 1,
            metadata: RecordMetadata::command(Intent::Group(intent))
                .with_request(1, position as u64)
                .with_authorization(AuthInfo::anonymous()),
            value: value.into(),
        }
    }

    #[test]
    fn create_group_emits_created_event_and_response() {
        let engine = Engine::new(true, DEFAULT_MAX_FOLLOW_UP_RECORDS);
        let mut state = ProcessingState::new(1, KeyedStateStore::in_memory());

        let result = engine
            .process_command(&mut state, &command(1, GroupIntent::Create, GroupRecord::new("g1")))
            .unwrap();

        assert_eq!(result.records.len(), 1);
        let event = &result.records[0];
        assert_eq!(event.metadata.record_type, RecordType::Event);
        assert_eq!(event.metadata.intent, Intent::Group(GroupIntent::Created));
        assert_eq!(event.source_record_position, 1);
        assert!(state.groups().exists("g1").unwrap());

        let response = result.response.unwrap();
        assert_eq!(response.key, event.key);
        assert!(!response.is_rejection());
    }

    #[test]
    fn unsupported_entity_type_is_rejected_before_any_event() {
        let engine = Engine::new(false, DEFAULT_MAX_FOLLOW_UP_RECORDS);
        let mut state = ProcessingState::new(1, KeyedStateStore::in_memory());
        engine
            .process_command(&mut state, &command(1, GroupIntent::Create, GroupRecord::new("g1")))
            .unwrap();

        let add = command(
            2,
            GroupIntent::AddEntity,
            GroupRecord::new("g1").with_entity("m1", EntityType::Role),
        );
        match engine.process_command(&mut state, &add) {
            Err(ProcessingError::Rejected(rejection)) => {
                assert_eq!(rejection.rejection_type, RejectionType::InvalidArgument);
                assert_eq!(
                    rejection.reason,
                    "Expected to add an entity with ID 'm1' and type 'ROLE' to group with ID 'g1', but entities of type 'ROLE' cannot be added to groups."
                );
            }
            other => panic!("expected rejection, got {:?}", other.map(|r| r.records)),
        }
    }

    #[test]
    fn rejection_result_carries_command_value() {
        let engine = Engine::new(false, DEFAULT_MAX_FOLLOW_UP_RECORDS);
        let command = command(4, GroupIntent::Update, GroupRecord::new("g1"));
        let rejection = Rejection::not_found("missing");

        let result = engine.write_rejection(&command, &rejection).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].metadata.record_type, RecordType::CommandRejection);
        assert_eq!(result.records[0].value, RecordValue::from(GroupRecord::new("g1")));
        assert_eq!(result.rejection(), Some(rejection));
    }
}
