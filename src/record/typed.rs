//! Records and typed views on them

use std::fmt;

use super::metadata::{AuthInfo, RecordMetadata};
use super::types::{Intent, RecordType, ValueType};
use super::value::{
    AuthorizationRecord, GroupRecord, HistoryDeletionRecord, MappingRuleRecord, RecordValue,
    UserRecord,
};

/// A command, event or rejection as stored in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Partition-scoped, strictly increasing sequence number
    pub position: i64,
    /// Position of the command this record was derived from, or -1
    pub source_record_position: i64,
    /// Entity key, or -1
    pub key: i64,
    /// Milliseconds since epoch at append time
    pub timestamp: i64,
    pub partition_id: u32,
    pub metadata: RecordMetadata,
    pub value: RecordValue,
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        self.metadata.record_type
    }

    pub fn value_type(&self) -> ValueType {
        self.metadata.value_type
    }

    pub fn intent(&self) -> Intent {
        self.metadata.intent
    }

    pub fn is_command(&self) -> bool {
        self.record_type() == RecordType::Command
    }

    pub fn is_event(&self) -> bool {
        self.record_type() == RecordType::Event
    }

    pub fn is_rejection(&self) -> bool {
        self.record_type() == RecordType::CommandRejection
    }

    pub fn authorization(&self) -> &AuthInfo {
        &self.metadata.authorization
    }

    /// Typed view on this record, if its value is a `V`.
    pub fn typed<V: TypedValue>(&self) -> Option<TypedRecord<'_, V>> {
        V::from_record_value(&self.value).map(|value| TypedRecord {
            record: self,
            value,
        })
    }
}

/// Short description for logs: position, type, intent, key.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} (position={}, source={}, key={})",
            self.record_type(),
            self.value_type(),
            self.intent(),
            self.position,
            self.source_record_position,
            self.key
        )?;
        if let Some(rejection_type) = self.metadata.rejection_type {
            write!(f, " rejected {}: {}", rejection_type, self.metadata.rejection_reason)?;
        }
        Ok(())
    }
}

/// A record value type with a fixed [`ValueType`] tag.
pub trait TypedValue: Clone + fmt::Debug + Send + Sync + 'static {
    const VALUE_TYPE: ValueType;

    fn into_record_value(self) -> RecordValue;

    fn from_record_value(value: &RecordValue) -> Option<&Self>;
}

macro_rules! typed_value {
    ($ty:ty, $variant:ident) => {
        impl TypedValue for $ty {
            const VALUE_TYPE: ValueType = ValueType::$variant;

            fn into_record_value(self) -> RecordValue {
                RecordValue::$variant(self)
            }

            fn from_record_value(value: &RecordValue) -> Option<&Self> {
                match value {
                    RecordValue::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for RecordValue {
            fn from(value: $ty) -> Self {
                RecordValue::$variant(value)
            }
        }
    };
}

typed_value!(GroupRecord, Group);
typed_value!(UserRecord, User);
typed_value!(MappingRuleRecord, MappingRule);
typed_value!(AuthorizationRecord, Authorization);
typed_value!(HistoryDeletionRecord, HistoryDeletion);

/// A record whose value is known to be a `V`
#[derive(Debug, Clone, Copy)]
pub struct TypedRecord<'r, V> {
    record: &'r Record,
    value: &'r V,
}

impl<'r, V: TypedValue> TypedRecord<'r, V> {
    pub fn value(&self) -> &'r V {
        self.value
    }

    pub fn record(&self) -> &'r Record {
        self.record
    }

    pub fn key(&self) -> i64 {
        self.record.key
    }

    pub fn position(&self) -> i64 {
        self.record.position
    }

    pub fn intent(&self) -> Intent {
        self.record.intent()
    }

    pub fn metadata(&self) -> &'r RecordMetadata {
        &self.record.metadata
    }

    pub fn authorization(&self) -> &'r AuthInfo {
        &self.record.metadata.authorization
    }
}
