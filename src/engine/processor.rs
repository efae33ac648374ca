//! Typed record processors and the dispatch table
//!
//! One processor per command intent. Processors read state, ask the
//! authorization behavior, and declare results through the writers; they
//! never mutate state themselves. A rejection is returned as
//! `Err(ProcessingError::Rejected)` and the caller turns it into a rejection
//! record and response after rolling back.

use std::collections::HashMap;

use super::applier::EventAppliers;
use super::authorization::{AuthorizationCheckBehavior, AuthorizationRequest};
use super::errors::ProcessingError;
use super::result::ProcessingResultBuilder;
use super::writers::{RejectionWriter, ResponseWriter, StateWriter};
use crate::record::{Intent, Record, TypedRecord, TypedValue};
use crate::state::ProcessingState;

/// Everything a processor may use while handling one command
pub struct ProcessingContext<'a> {
    state: &'a mut ProcessingState,
    appliers: &'a EventAppliers,
    authorization: AuthorizationCheckBehavior,
    result: &'a mut ProcessingResultBuilder,
}

impl<'a> ProcessingContext<'a> {
    pub(crate) fn new(
        state: &'a mut ProcessingState,
        appliers: &'a EventAppliers,
        authorization: AuthorizationCheckBehavior,
        result: &'a mut ProcessingResultBuilder,
    ) -> Self {
        Self {
            state,
            appliers,
            authorization,
            result,
        }
    }

    pub fn state(&self) -> &ProcessingState {
        &*self.state
    }

    /// Generate a new partition-unique entity key.
    pub fn next_key(&mut self) -> Result<i64, ProcessingError> {
        Ok(self.state.key_generator_mut().next_key()?)
    }

    pub fn check_authorization(&self, request: &AuthorizationRequest) -> Result<(), ProcessingError> {
        self.authorization.is_authorized(&*self.state, request)
    }

    pub fn state_writer(&mut self) -> StateWriter<'_> {
        StateWriter {
            state: &mut *self.state,
            appliers: self.appliers,
            result: &mut *self.result,
        }
    }

    pub fn response_writer(&mut self) -> ResponseWriter<'_> {
        ResponseWriter {
            appliers: self.appliers,
            result: &mut *self.result,
        }
    }

    pub fn rejection_writer(&mut self) -> RejectionWriter<'_> {
        RejectionWriter {
            result: &mut *self.result,
        }
    }
}

pub trait TypedRecordProcessor: Send + Sync {
    type Value: TypedValue;

    fn process_record(
        &self,
        command: &TypedRecord<'_, Self::Value>,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError>;
}

trait RegisteredProcessor: Send + Sync {
    fn process(&self, command: &Record, context: &mut ProcessingContext<'_>)
        -> Result<(), ProcessingError>;
}

struct Registered<P>(P);

impl<P: TypedRecordProcessor> RegisteredProcessor for Registered<P> {
    fn process(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let typed = command
            .typed::<P::Value>()
            .ok_or(ProcessingError::ValueMismatch {
                intent: command.intent(),
                expected: <P::Value as TypedValue>::VALUE_TYPE,
                actual: command.value.value_type(),
            })?;
        self.0.process_record(&typed, context)
    }
}

/// Processors keyed by command intent, built once at startup.
#[derive(Default)]
pub struct RecordProcessors {
    processors: HashMap<Intent, Box<dyn RegisteredProcessor>>,
}

impl RecordProcessors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P>(&mut self, intent: Intent, processor: P) -> &mut Self
    where
        P: TypedRecordProcessor + 'static,
    {
        self.processors.insert(intent, Box::new(Registered(processor)));
        self
    }

    pub fn contains(&self, intent: Intent) -> bool {
        self.processors.contains_key(&intent)
    }

    pub fn process(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> Result<(), ProcessingError> {
        let processor = self
            .processors
            .get(&command.intent())
            .ok_or(ProcessingError::Unsupported(command.intent()))?;
        processor.process(command, context)
    }
}
