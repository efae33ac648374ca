//! Record metadata: cross-cutting trace data carried by every record

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{Intent, RecordType, RejectionType, ValueType};

/// Claims describing who issued a command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    claims: BTreeMap<String, String>,
}

impl AuthInfo {
    pub const AUTHORIZED_USERNAME: &'static str = "authorized_username";
    pub const AUTHORIZED_CLIENT_ID: &'static str = "authorized_client_id";
    pub const AUTHORIZED_ANONYMOUS_USER: &'static str = "authorized_anonymous_user";

    pub fn new() -> Self {
        Self::default()
    }

    /// Claims of an authenticated user.
    pub fn user(username: impl Into<String>) -> Self {
        Self::new().with_claim(Self::AUTHORIZED_USERNAME, username)
    }

    /// Claims of a caller that bypasses authorization checks.
    pub fn anonymous() -> Self {
        Self::new().with_claim(Self::AUTHORIZED_ANONYMOUS_USER, "true")
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).map(String::as_str)
    }

    pub fn claims(&self) -> &BTreeMap<String, String> {
        &self.claims
    }

    pub fn username(&self) -> Option<&str> {
        self.claim(Self::AUTHORIZED_USERNAME)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.claim(Self::AUTHORIZED_CLIENT_ID)
    }

    pub fn is_anonymous(&self) -> bool {
        self.claim(Self::AUTHORIZED_ANONYMOUS_USER) == Some("true")
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// The component that issued a command on a caller's behalf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub record_type: RecordType,
    pub value_type: ValueType,
    pub intent: Intent,
    /// Applier version an event was written for; 0 for commands and rejections
    #[serde(default)]
    pub record_version: u16,
    #[serde(default)]
    pub request_stream_id: Option<i32>,
    #[serde(default)]
    pub request_id: Option<u64>,
    #[serde(default)]
    pub rejection_type: Option<RejectionType>,
    #[serde(default)]
    pub rejection_reason: String,
    #[serde(default)]
    pub authorization: AuthInfo,
    #[serde(default)]
    pub agent: Option<AgentInfo>,
    #[serde(default)]
    pub operation_reference: Option<u64>,
    #[serde(default)]
    pub batch_operation_reference: Option<i64>,
}

impl RecordMetadata {
    fn new(record_type: RecordType, intent: Intent) -> Self {
        Self {
            record_type,
            value_type: intent.value_type(),
            intent,
            record_version: 0,
            request_stream_id: None,
            request_id: None,
            rejection_type: None,
            rejection_reason: String::new(),
            authorization: AuthInfo::default(),
            agent: None,
            operation_reference: None,
            batch_operation_reference: None,
        }
    }

    pub fn command(intent: Intent) -> Self {
        Self::new(RecordType::Command, intent)
    }

    pub fn event(intent: Intent, record_version: u16) -> Self {
        Self {
            record_version,
            ..Self::new(RecordType::Event, intent)
        }
    }

    pub fn rejection(intent: Intent, rejection_type: RejectionType, reason: impl Into<String>) -> Self {
        Self {
            rejection_type: Some(rejection_type),
            rejection_reason: reason.into(),
            ..Self::new(RecordType::CommandRejection, intent)
        }
    }

    pub fn with_request(mut self, request_stream_id: i32, request_id: u64) -> Self {
        self.request_stream_id = Some(request_stream_id);
        self.request_id = Some(request_id);
        self
    }

    pub fn with_authorization(mut self, authorization: AuthInfo) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn with_agent(mut self, agent: AgentInfo) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_operation_reference(mut self, operation_reference: u64) -> Self {
        self.operation_reference = Some(operation_reference);
        self
    }

    pub fn with_batch_operation_reference(mut self, batch_operation_reference: i64) -> Self {
        self.batch_operation_reference = Some(batch_operation_reference);
        self
    }

    /// Whether the command came from a client request rather than from the engine.
    pub fn has_request(&self) -> bool {
        self.request_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::types::GroupIntent;

    #[test]
    fn auth_info_claims() {
        let auth = AuthInfo::user("alice");
        assert_eq!(auth.username(), Some("alice"));
        assert!(!auth.is_anonymous());
        assert!(AuthInfo::anonymous().is_anonymous());
        assert!(AuthInfo::new().is_empty());
    }

    #[test]
    fn rejection_metadata_carries_reason() {
        let intent = Intent::Group(GroupIntent::Create);
        let metadata = RecordMetadata::rejection(intent, RejectionType::AlreadyExists, "exists")
            .with_request(1, 7);
        assert_eq!(metadata.record_type, RecordType::CommandRejection);
        assert_eq!(metadata.value_type, ValueType::Group);
        assert_eq!(metadata.rejection_reason, "exists");
        assert!(metadata.has_request());
    }
}
