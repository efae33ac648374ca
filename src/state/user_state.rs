use serde::{Deserialize, Serialize};

use crate::db::{ColumnFamily, DbResult, KeyedStateStore};
use crate::record::UserRecord;

use super::ColumnFamilies;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedUser {
    pub user_key: i64,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

pub struct UserState {
    users: ColumnFamily<String, PersistedUser>,
}

impl UserState {
    pub(crate) fn new(store: &KeyedStateStore) -> Self {
        Self {
            users: store.create_column_family(ColumnFamilies::Users),
        }
    }

    pub fn get(&self, username: &str) -> DbResult<Option<PersistedUser>> {
        self.users.get(&username.to_string())
    }

    pub fn exists(&self, username: &str) -> DbResult<bool> {
        self.users.exists(&username.to_string())
    }

    pub fn create(&mut self, key: i64, user: &UserRecord) -> DbResult<()> {
        self.users.insert(
            &user.username,
            &PersistedUser {
                user_key: key,
                username: user.username.clone(),
                name: user.name.clone(),
                email: user.email.clone(),
            },
        )
    }

    pub fn delete(&mut self, username: &str) -> DbResult<()> {
        self.users.delete_existing(&username.to_string())
    }
}
