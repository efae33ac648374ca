//! Typed event appliers and their registry
//!
//! An applier is the only code path allowed to change persisted entities. It
//! must be deterministic: the same event applied to the same state yields
//! byte-identical state on every replica.

use std::collections::HashMap;

use super::errors::ApplierError;
use crate::record::{Intent, RecordValue, TypedValue};
use crate::state::ProcessingState;

pub trait TypedEventApplier: Send + Sync {
    type Value: TypedValue;

    /// Apply the event with `key` and `value` to `state`.
    ///
    /// Values the applier cannot legally handle are reported as
    /// [`ApplierError::IllegalState`]; they mean a command was accepted that
    /// should have been rejected.
    fn apply_state(
        &self,
        state: &mut ProcessingState,
        key: i64,
        value: &Self::Value,
    ) -> Result<(), ApplierError>;
}

/// Applier with the value type erased, for the registry
trait RegisteredApplier: Send + Sync {
    fn apply(
        &self,
        state: &mut ProcessingState,
        key: i64,
        value: &RecordValue,
    ) -> Result<(), ApplierError>;
}

struct Registered<A>(A);

impl<A: TypedEventApplier> RegisteredApplier for Registered<A> {
    fn apply(
        &self,
        state: &mut ProcessingState,
        key: i64,
        value: &RecordValue,
    ) -> Result<(), ApplierError> {
        let typed = <A::Value as TypedValue>::from_record_value(value).ok_or(ApplierError::UnexpectedValue {
            expected: <A::Value as TypedValue>::VALUE_TYPE,
            actual: value.value_type(),
        })?;
        self.0.apply_state(state, key, typed)
    }
}

/// Appliers keyed by event intent and version.
///
/// Built once at startup; looking up an applier is a map access. New events
/// are written with the latest version registered for their intent, and older
/// versions stay registered so historic events replay as they were applied.
#[derive(Default)]
pub struct EventAppliers {
    appliers: HashMap<(Intent, u16), Box<dyn RegisteredApplier>>,
    latest: HashMap<Intent, u16>,
}

impl EventAppliers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `applier` for `intent` at `version`, replacing any earlier one.
    pub fn register<A>(&mut self, intent: Intent, version: u16, applier: A) -> &mut Self
    where
        A: TypedEventApplier + 'static,
    {
        self.appliers
            .insert((intent, version), Box::new(Registered(applier)));
        let latest = self.latest.entry(intent).or_insert(version);
        *latest = (*latest).max(version);
        self
    }

    /// Version new events of `intent` are written with.
    pub fn latest_version(&self, intent: Intent) -> Option<u16> {
        self.latest.get(&intent).copied()
    }

    pub fn is_registered(&self, intent: Intent, version: u16) -> bool {
        self.appliers.contains_key(&(intent, version))
    }

    pub fn apply_state(
        &self,
        state: &mut ProcessingState,
        key: i64,
        intent: Intent,
        version: u16,
        value: &RecordValue,
    ) -> Result<(), ApplierError> {
        let applier = self
            .appliers
            .get(&(intent, version))
            .ok_or(ApplierError::MissingApplier { intent, version })?;
        applier.apply(state, key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeyedStateStore;
    use crate::record::{GroupIntent, GroupRecord, UserRecord};

    struct CreateGroup;

    impl TypedEventApplier for CreateGroup {
        type Value = GroupRecord;

        fn apply_state(
            &self,
            state: &mut ProcessingState,
            key: i64,
            value: &GroupRecord,
        ) -> Result<(), ApplierError> {
            Ok(state.groups_mut().create(key, value)?)
        }
    }

    fn created() -> Intent {
        Intent::Group(GroupIntent::Created)
    }

    #[test]
    fn dispatches_by_intent_and_version() {
        let mut appliers = EventAppliers::new();
        appliers.register(created(), 1, CreateGroup);
        assert_eq!(appliers.latest_version(created()), Some(1));

        let mut state = ProcessingState::new(1, KeyedStateStore::in_memory());
        let value = RecordValue::from(GroupRecord::new("g1"));
        appliers
            .apply_state(&mut state, 7, created(), 1, &value)
            .unwrap();
        assert!(state.groups().exists("g1").unwrap());

        let missing = appliers.apply_state(&mut state, 7, created(), 2, &value);
        assert!(matches!(
            missing,
            Err(ApplierError::MissingApplier { version: 2, .. })
        ));
    }

    #[test]
    fn rejects_values_of_another_type() {
        let mut appliers = EventAppliers::new();
        appliers.register(created(), 1, CreateGroup);

        let mut state = ProcessingState::new(1, KeyedStateStore::in_memory());
        let value = RecordValue::from(UserRecord::new("u1"));
        let result = appliers.apply_state(&mut state, 7, created(), 1, &value);
        assert!(matches!(result, Err(ApplierError::UnexpectedValue { .. })));
    }
}
