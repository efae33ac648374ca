use std::collections::BTreeSet;

use crate::db::{ColumnFamily, CompositeKey, DbResult, KeyedStateStore};
use crate::record::{
    AuthorizationOwnerType, AuthorizationRecord, AuthorizationResourceType, PermissionType,
};

use super::ColumnFamilies;

type OwnerKey = CompositeKey<AuthorizationOwnerType, String>;
type PermissionKey = CompositeKey<CompositeKey<AuthorizationResourceType, PermissionType>, String>;

/// Granted permissions: [owner, [[resource type, permission], resource id]] → authorization key
pub struct AuthorizationState {
    permissions: ColumnFamily<CompositeKey<OwnerKey, PermissionKey>, i64>,
}

impl AuthorizationState {
    pub(crate) fn new(store: &KeyedStateStore) -> Self {
        Self {
            permissions: store.create_column_family(ColumnFamilies::Authorizations),
        }
    }

    fn permission_key(
        owner_type: AuthorizationOwnerType,
        owner_id: &str,
        resource_type: AuthorizationResourceType,
        permission: PermissionType,
        resource_id: &str,
    ) -> CompositeKey<OwnerKey, PermissionKey> {
        CompositeKey::new(
            CompositeKey::new(owner_type, owner_id.to_string()),
            CompositeKey::new(
                CompositeKey::new(resource_type, permission),
                resource_id.to_string(),
            ),
        )
    }

    pub fn has_permission(
        &self,
        owner_type: AuthorizationOwnerType,
        owner_id: &str,
        resource_type: AuthorizationResourceType,
        permission: PermissionType,
        resource_id: &str,
    ) -> DbResult<bool> {
        self.permissions.exists(&Self::permission_key(
            owner_type,
            owner_id,
            resource_type,
            permission,
            resource_id,
        ))
    }

    /// Resource ids for which the owner holds `permission` on `resource_type`.
    pub fn resource_ids(
        &self,
        owner_type: AuthorizationOwnerType,
        owner_id: &str,
        resource_type: AuthorizationResourceType,
        permission: PermissionType,
    ) -> DbResult<BTreeSet<String>> {
        let prefix = CompositeKey::new(
            CompositeKey::new(owner_type, owner_id.to_string()),
            CompositeKey::new(resource_type, permission),
        );
        let mut ids = BTreeSet::new();
        self.permissions.while_equal_prefix(&prefix, |key, _| {
            ids.insert(key.1 .1);
            true
        })?;
        Ok(ids)
    }

    /// Store every permission of the authorization.
    pub fn create(&mut self, key: i64, authorization: &AuthorizationRecord) -> DbResult<()> {
        for permission in &authorization.permissions {
            self.permissions.upsert(
                &Self::permission_key(
                    authorization.owner_type,
                    &authorization.owner_id,
                    authorization.resource_type,
                    *permission,
                    &authorization.resource_id,
                ),
                &key,
            )?;
        }
        Ok(())
    }
}
