//! Authorization checks for commands
//!
//! A caller is identified by the claims on the command. Permissions are
//! granted to users, to groups the user belongs to, and to mapping rules whose
//! claim matches one of the caller's claims (and to the groups of those rules).

use std::collections::BTreeSet;

use super::errors::{ProcessingError, Rejection};
use crate::record::{
    AuthInfo, AuthorizationOwnerType, AuthorizationResourceType, EntityType, PermissionType,
    RecordMetadata, RelationType, WILDCARD_RESOURCE_ID,
};
use crate::state::ProcessingState;

/// What a command needs to be allowed to do
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    authorization: AuthInfo,
    internal: bool,
    resource_type: AuthorizationResourceType,
    permission: PermissionType,
    resource_ids: BTreeSet<String>,
}

impl AuthorizationRequest {
    pub fn new(
        metadata: &RecordMetadata,
        resource_type: AuthorizationResourceType,
        permission: PermissionType,
    ) -> Self {
        Self {
            authorization: metadata.authorization.clone(),
            internal: !metadata.has_request(),
            resource_type,
            permission,
            resource_ids: BTreeSet::new(),
        }
    }

    /// Accept a permission on this specific resource in addition to the wildcard.
    pub fn add_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        let resource_id = resource_id.into();
        if !resource_id.is_empty() {
            self.resource_ids.insert(resource_id);
        }
        self
    }

    fn required_ids(&self) -> String {
        let mut ids = vec![WILDCARD_RESOURCE_ID.to_string()];
        ids.extend(self.resource_ids.iter().cloned());
        format!("[{}]", ids.join(", "))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuthorizationCheckBehavior {
    enabled: bool,
}

impl AuthorizationCheckBehavior {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check the request against the granted permissions.
    ///
    /// # Returns
    /// * `Ok(())` - Allowed
    /// * `Err(ProcessingError::Rejected)` - UNAUTHORIZED without a user, FORBIDDEN without permission
    pub fn is_authorized(
        &self,
        state: &ProcessingState,
        request: &AuthorizationRequest,
    ) -> Result<(), ProcessingError> {
        if !self.enabled || request.internal || request.authorization.is_anonymous() {
            return Ok(());
        }

        let owners = self.owners(state, &request.authorization)?;
        if owners.is_empty() {
            return Err(Rejection::unauthorized(format!(
                "Expected to perform operation '{}' on resource '{}', but no user was authenticated",
                request.permission, request.resource_type
            ))
            .into());
        }

        for (owner_type, owner_id) in &owners {
            let granted = state.authorizations().resource_ids(
                *owner_type,
                owner_id,
                request.resource_type,
                request.permission,
            )?;
            if granted.contains(WILDCARD_RESOURCE_ID)
                || request.resource_ids.iter().any(|id| granted.contains(id))
            {
                return Ok(());
            }
        }

        let caller = request
            .authorization
            .username()
            .or_else(|| request.authorization.client_id())
            .unwrap_or_default();
        Err(Rejection::forbidden(format!(
            "Insufficient permissions to perform operation '{}' on resource '{}', required resource identifiers are one of '{}' for user '{}'",
            request.permission,
            request.resource_type,
            request.required_ids(),
            caller
        ))
        .into())
    }

    /// Every owner whose permissions the caller holds.
    fn owners(
        &self,
        state: &ProcessingState,
        authorization: &AuthInfo,
    ) -> Result<Vec<(AuthorizationOwnerType, String)>, ProcessingError> {
        let mut owners = Vec::new();
        let mut groups = BTreeSet::new();

        if let Some(username) = authorization.username() {
            owners.push((AuthorizationOwnerType::User, username.to_string()));
            groups.extend(state.membership().get_relations(
                EntityType::User,
                username,
                RelationType::Group,
            )?);
        }

        for (claim_name, claim_value) in authorization.claims() {
            if let Some(rule_id) = state.mapping_rules().find_by_claim(claim_name, claim_value)? {
                if let Some(rule) = state.mapping_rules().get(&rule_id)? {
                    groups.extend(rule.group_ids);
                }
                owners.push((AuthorizationOwnerType::MappingRule, rule_id));
            }
        }

        owners.extend(
            groups
                .into_iter()
                .map(|group_id| (AuthorizationOwnerType::Group, group_id)),
        );
        Ok(owners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeyedStateStore;
    use crate::record::{
        AuthorizationRecord, GroupIntent, Intent, MappingRuleRecord, RejectionType,
    };

    fn command(auth: AuthInfo) -> RecordMetadata {
        RecordMetadata::command(Intent::Group(GroupIntent::Update))
            .with_request(1, 1)
            .with_authorization(auth)
    }

    fn request(auth: AuthInfo) -> AuthorizationRequest {
        AuthorizationRequest::new(
            &command(auth),
            AuthorizationResourceType::Group,
            PermissionType::Update,
        )
        .add_resource_id("g1")
    }

    fn rejection_type(result: Result<(), ProcessingError>) -> Option<RejectionType> {
        match result {
            Err(ProcessingError::Rejected(rejection)) => Some(rejection.rejection_type),
            _ => None,
        }
    }

    fn grant(state: &mut ProcessingState, owner_type: AuthorizationOwnerType, owner: &str, id: &str) {
        let record = AuthorizationRecord::new(
            owner_type,
            owner,
            AuthorizationResourceType::Group,
            id,
        )
        .with_permission(PermissionType::Update);
        state.authorizations_mut().create(1, &record).unwrap();
    }

    #[test]
    fn disabled_anonymous_and_internal_are_allowed() {
        let state = ProcessingState::new(1, KeyedStateStore::in_memory());
        let enabled = AuthorizationCheckBehavior::new(true);

        assert!(AuthorizationCheckBehavior::new(false)
            .is_authorized(&state, &request(AuthInfo::user("bob")))
            .is_ok());
        assert!(enabled
            .is_authorized(&state, &request(AuthInfo::anonymous()))
            .is_ok());

        let internal = AuthorizationRequest::new(
            &RecordMetadata::command(Intent::Group(GroupIntent::Update)),
            AuthorizationResourceType::Group,
            PermissionType::Update,
        );
        assert!(enabled.is_authorized(&state, &internal).is_ok());
    }

    #[test]
    fn missing_identity_is_unauthorized_and_missing_permission_forbidden() {
        let state = ProcessingState::new(1, KeyedStateStore::in_memory());
        let behavior = AuthorizationCheckBehavior::new(true);

        assert_eq!(
            rejection_type(behavior.is_authorized(&state, &request(AuthInfo::new()))),
            Some(RejectionType::Unauthorized)
        );

        match behavior.is_authorized(&state, &request(AuthInfo::user("bob"))) {
            Err(ProcessingError::Rejected(rejection)) => {
                assert_eq!(rejection.rejection_type, RejectionType::Forbidden);
                assert!(rejection.reason.contains("'[*, g1]'"));
                assert!(rejection.reason.contains("user 'bob'"));
            }
            other => panic!("expected forbidden, got {:?}", other),
        }
    }

    #[test]
    fn permissions_of_user_group_and_mapping_rule() {
        let mut state = ProcessingState::new(1, KeyedStateStore::in_memory());
        let behavior = AuthorizationCheckBehavior::new(true);

        grant(&mut state, AuthorizationOwnerType::User, "alice", "g1");
        assert!(behavior
            .is_authorized(&state, &request(AuthInfo::user("alice")))
            .is_ok());

        state
            .membership_mut()
            .insert_relation(EntityType::User, "carol", RelationType::Group, "admins")
            .unwrap();
        grant(&mut state, AuthorizationOwnerType::Group, "admins", WILDCARD_RESOURCE_ID);
        assert!(behavior
            .is_authorized(&state, &request(AuthInfo::user("carol")))
            .is_ok());

        state
            .mapping_rules_mut()
            .create(2, &MappingRuleRecord::new("m1", "department", "ops"))
            .unwrap();
        grant(&mut state, AuthorizationOwnerType::MappingRule, "m1", "g1");
        let claims = AuthInfo::user("dave").with_claim("department", "ops");
        assert!(behavior.is_authorized(&state, &request(claims)).is_ok());
    }
}
