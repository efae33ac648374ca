//! Record Model (Layer 2)
//!
//! Commands, events and rejections share one shape: a fixed header (record type,
//! value type, intent, partition, position, key, timestamp) plus MessagePack
//! encoded metadata and value.

pub mod codec;
pub mod metadata;
pub mod types;
pub mod typed;
pub mod value;

pub use codec::{decode_record, encode_record, CodecError, RecordHeader, HEADER_SIZE};
pub use metadata::{AgentInfo, AuthInfo, RecordMetadata};
pub use typed::{Record, TypedRecord, TypedValue};
pub use types::{
    AuthorizationIntent, GroupIntent, HistoryDeletionIntent, Intent, MappingRuleIntent,
    RecordType, RejectionType, UserIntent, ValueType,
};
pub use value::{
    AuthorizationOwnerType, AuthorizationRecord, AuthorizationResourceType, EntityType,
    GroupRecord, HistoryDeletionRecord, HistoryDeletionType, MappingRuleRecord, PermissionType,
    RecordValue, RelationType, UserRecord, DEFAULT_TENANT, WILDCARD_RESOURCE_ID,
};

/// Key of records that do not refer to an entity
pub const NO_KEY: i64 = -1;

/// Position marker for "no position", e.g. commands without a source record
pub const NO_POSITION: i64 = -1;
