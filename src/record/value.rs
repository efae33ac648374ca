//! Record values
//!
//! Values are encoded as MessagePack maps with named fields; the value type in
//! the record header selects the struct to decode into.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::codec::CodecError;
use super::types::ValueType;
use crate::db::key::u8_enum_db_key;

/// Tenant of records and state that do not name one
pub const DEFAULT_TENANT: &str = "<default>";

/// Resource id granting a permission on every resource of a type
pub const WILDCARD_RESOURCE_ID: &str = "*";

fn default_tenant() -> String {
    DEFAULT_TENANT.to_string()
}

byte_enum! {
    pub enum EntityType {
        Unspecified = 0,
        User = 1,
        Mapping = 2,
        Client = 3,
        Group = 4,
        Role = 5,
    }
}

impl Default for EntityType {
    fn default() -> Self {
        EntityType::Unspecified
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityType::Unspecified => "UNSPECIFIED",
            EntityType::User => "USER",
            EntityType::Mapping => "MAPPING",
            EntityType::Client => "CLIENT",
            EntityType::Group => "GROUP",
            EntityType::Role => "ROLE",
        })
    }
}

byte_enum! {
    /// Kind of entity an entity is a member of
    pub enum RelationType {
        Group = 1,
        Role = 2,
        Tenant = 3,
    }
}

byte_enum! {
    pub enum HistoryDeletionType {
        ProcessInstance = 1,
        ProcessDefinition = 2,
        DecisionInstance = 3,
        DecisionDefinition = 4,
    }
}

impl fmt::Display for HistoryDeletionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HistoryDeletionType::ProcessInstance => "process instance",
            HistoryDeletionType::ProcessDefinition => "process definition",
            HistoryDeletionType::DecisionInstance => "decision instance",
            HistoryDeletionType::DecisionDefinition => "decision definition",
        })
    }
}

byte_enum! {
    pub enum AuthorizationOwnerType {
        User = 1,
        Group = 2,
        MappingRule = 3,
    }
}

byte_enum! {
    pub enum AuthorizationResourceType {
        Authorization = 1,
        Group = 2,
        User = 3,
        MappingRule = 4,
        ProcessDefinition = 5,
        DecisionDefinition = 6,
    }
}

impl fmt::Display for AuthorizationResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthorizationResourceType::Authorization => "AUTHORIZATION",
            AuthorizationResourceType::Group => "GROUP",
            AuthorizationResourceType::User => "USER",
            AuthorizationResourceType::MappingRule => "MAPPING_RULE",
            AuthorizationResourceType::ProcessDefinition => "PROCESS_DEFINITION",
            AuthorizationResourceType::DecisionDefinition => "DECISION_DEFINITION",
        })
    }
}

byte_enum! {
    pub enum PermissionType {
        Create = 1,
        Read = 2,
        Update = 3,
        Delete = 4,
        DeleteProcessInstance = 5,
        DeleteDecisionInstance = 6,
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PermissionType::Create => "CREATE",
            PermissionType::Read => "READ",
            PermissionType::Update => "UPDATE",
            PermissionType::Delete => "DELETE",
            PermissionType::DeleteProcessInstance => "DELETE_PROCESS_INSTANCE",
            PermissionType::DeleteDecisionInstance => "DELETE_DECISION_INSTANCE",
        })
    }
}

u8_enum_db_key!(EntityType);
u8_enum_db_key!(RelationType);
u8_enum_db_key!(HistoryDeletionType);
u8_enum_db_key!(AuthorizationOwnerType);
u8_enum_db_key!(AuthorizationResourceType);
u8_enum_db_key!(PermissionType);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupRecord {
    pub group_key: i64,
    pub group_id: String,
    pub name: String,
    pub description: String,
    pub entity_id: String,
    pub entity_type: EntityType,
}

impl GroupRecord {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>, entity_type: EntityType) -> Self {
        self.entity_id = entity_id.into();
        self.entity_type = entity_type;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRecord {
    pub user_key: i64,
    pub username: String,
    pub name: String,
    pub email: String,
}

impl UserRecord {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingRuleRecord {
    pub mapping_rule_key: i64,
    pub mapping_rule_id: String,
    pub claim_name: String,
    pub claim_value: String,
    pub name: String,
}

impl MappingRuleRecord {
    pub fn new(
        mapping_rule_id: impl Into<String>,
        claim_name: impl Into<String>,
        claim_value: impl Into<String>,
    ) -> Self {
        Self {
            mapping_rule_id: mapping_rule_id.into(),
            claim_name: claim_name.into(),
            claim_value: claim_value.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    #[serde(default)]
    pub authorization_key: i64,
    pub owner_id: String,
    pub owner_type: AuthorizationOwnerType,
    pub resource_type: AuthorizationResourceType,
    pub resource_id: String,
    #[serde(default)]
    pub permissions: BTreeSet<PermissionType>,
}

impl AuthorizationRecord {
    pub fn new(
        owner_type: AuthorizationOwnerType,
        owner_id: impl Into<String>,
        resource_type: AuthorizationResourceType,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            authorization_key: 0,
            owner_id: owner_id.into(),
            owner_type,
            resource_type,
            resource_id: resource_id.into(),
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: PermissionType) -> Self {
        self.permissions.insert(permission);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDeletionRecord {
    pub resource_key: i64,
    pub resource_type: HistoryDeletionType,
    #[serde(default)]
    pub process_id: String,
    #[serde(default)]
    pub decision_definition_id: String,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
}

impl HistoryDeletionRecord {
    pub fn new(resource_key: i64, resource_type: HistoryDeletionType) -> Self {
        Self {
            resource_key,
            resource_type,
            process_id: String::new(),
            decision_definition_id: String::new(),
            tenant_id: default_tenant(),
        }
    }

    pub fn with_process_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = process_id.into();
        self
    }

    pub fn with_decision_definition_id(mut self, decision_definition_id: impl Into<String>) -> Self {
        self.decision_definition_id = decision_definition_id.into();
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }
}

/// The value of a record, tagged by value type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValue {
    Group(GroupRecord),
    User(UserRecord),
    MappingRule(MappingRuleRecord),
    Authorization(AuthorizationRecord),
    HistoryDeletion(HistoryDeletionRecord),
}

impl RecordValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            RecordValue::Group(_) => ValueType::Group,
            RecordValue::User(_) => ValueType::User,
            RecordValue::MappingRule(_) => ValueType::MappingRule,
            RecordValue::Authorization(_) => ValueType::Authorization,
            RecordValue::HistoryDeletion(_) => ValueType::HistoryDeletion,
        }
    }

    /// Encode the inner value; the tag travels in the record header.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let result = match self {
            RecordValue::Group(v) => rmp_serde::to_vec_named(v),
            RecordValue::User(v) => rmp_serde::to_vec_named(v),
            RecordValue::MappingRule(v) => rmp_serde::to_vec_named(v),
            RecordValue::Authorization(v) => rmp_serde::to_vec_named(v),
            RecordValue::HistoryDeletion(v) => rmp_serde::to_vec_named(v),
        };
        result.map_err(|e| CodecError::Encode(e.to_string()))
    }

    pub fn decode(value_type: ValueType, bytes: &[u8]) -> Result<Self, CodecError> {
        fn read<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
            rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
        }

        Ok(match value_type {
            ValueType::Group => RecordValue::Group(read(bytes)?),
            ValueType::User => RecordValue::User(read(bytes)?),
            ValueType::MappingRule => RecordValue::MappingRule(read(bytes)?),
            ValueType::Authorization => RecordValue::Authorization(read(bytes)?),
            ValueType::HistoryDeletion => RecordValue::HistoryDeletion(read(bytes)?),
        })
    }
}
