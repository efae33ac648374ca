//! Result of processing one command: follow-up records and a client response

use super::errors::{ProcessingError, Rejection};
use crate::log::LogAppendEntry;
use crate::record::{AuthInfo, Intent, Record, RecordMetadata, RecordValue};

/// Response delivered to the client that sent a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub key: i64,
    pub metadata: RecordMetadata,
    pub value: RecordValue,
}

impl CommandResponse {
    pub fn intent(&self) -> Intent {
        self.metadata.intent
    }

    pub fn is_rejection(&self) -> bool {
        self.metadata.rejection_type.is_some()
    }

    pub fn rejection(&self) -> Option<Rejection> {
        self.metadata
            .rejection_type
            .map(|rejection_type| Rejection::new(rejection_type, self.metadata.rejection_reason.clone()))
    }
}

/// Everything a processed command produced, in write order
#[derive(Debug, Clone, Default)]
pub struct ProcessingResult {
    pub records: Vec<LogAppendEntry>,
    pub response: Option<CommandResponse>,
}

impl ProcessingResult {
    /// Follow-up events, without rejections.
    pub fn events(&self) -> impl Iterator<Item = &LogAppendEntry> {
        self.records
            .iter()
            .filter(|entry| entry.metadata.rejection_type.is_none())
    }

    pub fn rejection(&self) -> Option<Rejection> {
        self.response.as_ref().and_then(CommandResponse::rejection)
    }
}

/// Collects the records and response of one command.
///
/// Metadata of the command is carried over to everything written for it:
/// operation reference (unless the follow-up sets its own), batch operation
/// reference, agent and authorization claims. Responses never carry claims.
pub(crate) struct ProcessingResultBuilder {
    command_position: i64,
    command_key: i64,
    command_intent: Intent,
    command_value: RecordValue,
    command_metadata: RecordMetadata,
    max_records: usize,
    records: Vec<LogAppendEntry>,
    response: Option<CommandResponse>,
}

impl ProcessingResultBuilder {
    pub(crate) fn new(command: &Record, max_records: usize) -> Self {
        Self {
            command_position: command.position,
            command_key: command.key,
            command_intent: command.intent(),
            command_value: command.value.clone(),
            command_metadata: command.metadata.clone(),
            max_records,
            records: Vec::new(),
            response: None,
        }
    }

    fn decorate(&self, mut metadata: RecordMetadata, with_authorization: bool) -> RecordMetadata {
        let command = &self.command_metadata;
        if metadata.operation_reference.is_none() {
            metadata.operation_reference = command.operation_reference;
        }
        if metadata.batch_operation_reference.is_none() {
            metadata.batch_operation_reference = command.batch_operation_reference;
        }
        if metadata.agent.is_none() {
            metadata.agent = command.agent.clone();
        }
        metadata.authorization = if with_authorization {
            command.authorization.clone()
        } else {
            AuthInfo::default()
        };
        metadata
    }

    /// Fails when another record would exceed the per-command limit.
    pub(crate) fn ensure_capacity(&self) -> Result<(), ProcessingError> {
        if self.max_records > 0 && self.records.len() >= self.max_records {
            return Err(ProcessingError::BatchTooLarge {
                limit: self.max_records,
            });
        }
        Ok(())
    }

    pub(crate) fn append_record(
        &mut self,
        key: i64,
        metadata: RecordMetadata,
        value: RecordValue,
    ) -> Result<(), ProcessingError> {
        self.ensure_capacity()?;
        let metadata = self.decorate(metadata, true);
        self.records.push(LogAppendEntry {
            key,
            source_record_position: self.command_position,
            metadata,
            value,
        });
        Ok(())
    }

    pub(crate) fn append_rejection(&mut self, rejection: &Rejection) -> Result<(), ProcessingError> {
        let metadata = self.rejection_metadata(rejection);
        let value = self.command_value.clone();
        self.append_record(self.command_key, metadata, value)
    }

    fn rejection_metadata(&self, rejection: &Rejection) -> RecordMetadata {
        let mut metadata = RecordMetadata::rejection(
            self.command_intent,
            rejection.rejection_type,
            rejection.reason.clone(),
        );
        metadata.request_stream_id = self.command_metadata.request_stream_id;
        metadata.request_id = self.command_metadata.request_id;
        metadata
    }

    /// Set the response; a command has at most one, the last one wins.
    pub(crate) fn set_response(&mut self, key: i64, metadata: RecordMetadata, value: RecordValue) {
        if !self.command_metadata.has_request() {
            return;
        }
        let mut metadata = self.decorate(metadata, false);
        metadata.request_stream_id = self.command_metadata.request_stream_id;
        metadata.request_id = self.command_metadata.request_id;
        self.response = Some(CommandResponse { key, metadata, value });
    }

    pub(crate) fn set_rejection_response(&mut self, rejection: &Rejection) {
        let metadata = self.rejection_metadata(rejection);
        let value = self.command_value.clone();
        self.set_response(self.command_key, metadata, value);
    }

    pub(crate) fn build(self) -> ProcessingResult {
        ProcessingResult {
            records: self.records,
            response: self.response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AgentInfo, GroupIntent, GroupRecord, RecordType};

    fn command(metadata: RecordMetadata) -> Record {
        Record {
            position: 12,
            source_record_position: -1,
            key: -1,
            timestamp: 0,
            partition_id: 1,
            metadata,
            value: GroupRecord::new("g1").into(),
        }
    }

    #[test]
    fn follow_ups_carry_command_metadata() {
        let metadata = RecordMetadata::command(Intent::Group(GroupIntent::Create))
            .with_request(3, 44)
            .with_authorization(AuthInfo::user("alice"))
            .with_agent(AgentInfo {
                id: 9,
                name: "batch".to_string(),
            })
            .with_operation_reference(5)
            .with_batch_operation_reference(77);
        let mut builder = ProcessingResultBuilder::new(&command(metadata), 10);

        let created = Intent::Group(GroupIntent::Created);
        builder
            .append_record(8, RecordMetadata::event(created, 1), GroupRecord::new("g1").into())
            .unwrap();
        builder
            .append_record(
                8,
                RecordMetadata::event(created, 1).with_operation_reference(6),
                GroupRecord::new("g1").into(),
            )
            .unwrap();
        builder.set_response(8, RecordMetadata::event(created, 1), GroupRecord::new("g1").into());
        let result = builder.build();

        let first = &result.records[0];
        assert_eq!(first.source_record_position, 12);
        assert_eq!(first.metadata.operation_reference, Some(5));
        assert_eq!(first.metadata.batch_operation_reference, Some(77));
        assert_eq!(first.metadata.authorization.username(), Some("alice"));
        assert_eq!(first.metadata.agent.as_ref().map(|a| a.id), Some(9));
        assert_eq!(result.records[1].metadata.operation_reference, Some(6));

        let response = result.response.unwrap();
        assert_eq!(response.metadata.request_id, Some(44));
        assert!(response.metadata.authorization.is_empty());
        assert_eq!(response.metadata.operation_reference, Some(5));
    }

    #[test]
    fn enforces_record_limit() {
        let metadata = RecordMetadata::command(Intent::Group(GroupIntent::Create));
        let mut builder = ProcessingResultBuilder::new(&command(metadata), 1);
        let created = Intent::Group(GroupIntent::Created);
        builder
            .append_record(1, RecordMetadata::event(created, 1), GroupRecord::new("g1").into())
            .unwrap();
        let second =
            builder.append_record(2, RecordMetadata::event(created, 1), GroupRecord::new("g1").into());
        assert!(matches!(second, Err(ProcessingError::BatchTooLarge { limit: 1 })));
    }

    #[test]
    fn internal_commands_get_no_response() {
        let metadata = RecordMetadata::command(Intent::Group(GroupIntent::Create));
        let mut builder = ProcessingResultBuilder::new(&command(metadata), 10);
        let rejection = Rejection::already_exists("exists");
        builder.append_rejection(&rejection).unwrap();
        builder.set_rejection_response(&rejection);
        let result = builder.build();

        assert!(result.response.is_none());
        assert_eq!(result.records[0].metadata.record_type, RecordType::CommandRejection);
        assert_eq!(result.records[0].key, -1);
    }
}
