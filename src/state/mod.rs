//! Processing State (Layer 4)
//!
//! Typed domain state on top of the keyed state store. Read access is `&self`;
//! every mutating method takes `&mut self`, so only code holding the state
//! mutably (event appliers, replay, migrations) can change it. Record processors
//! only ever see `&ProcessingState`.

pub mod authorization_state;
pub mod group_state;
pub mod history_deletion_state;
pub mod key_generator;
pub mod last_processed;
pub mod mapping_rule_state;
pub mod membership_state;
pub mod migration;
pub mod user_state;

use crate::db::{ColumnFamilyDef, KeyedStateStore};

pub use authorization_state::AuthorizationState;
pub use group_state::{GroupState, PersistedGroup};
pub use history_deletion_state::{HistoryDeletionState, PersistedHistoryDeletion};
pub use key_generator::{decode_partition_id, encode_partition_id, DbKeyGenerator};
pub use last_processed::LastProcessedPositionState;
pub use mapping_rule_state::{MappingRuleState, PersistedMappingRule};
pub use membership_state::MembershipState;
pub use migration::{MigrationRunner, MigrationTask};
pub use user_state::{PersistedUser, UserState};

/// Column families of the engine state. Ids are persisted; never reuse one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ColumnFamilies {
    Key = 1,
    LastProcessedPosition = 2,
    Migrations = 3,
    Groups = 10,
    GroupEntities = 11,
    Users = 12,
    MappingRules = 13,
    MappingRulesByClaim = 14,
    Membership = 15,
    MembershipByRelation = 16,
    Authorizations = 17,
    HistoryDeletions = 20,
    DeprecatedHistoryDeletions = 21,
}

impl ColumnFamilyDef for ColumnFamilies {
    fn id(self) -> u16 {
        self as u16
    }

    fn name(self) -> &'static str {
        match self {
            ColumnFamilies::Key => "KEY",
            ColumnFamilies::LastProcessedPosition => "LAST_PROCESSED_POSITION",
            ColumnFamilies::Migrations => "MIGRATIONS",
            ColumnFamilies::Groups => "GROUPS",
            ColumnFamilies::GroupEntities => "GROUP_ENTITIES",
            ColumnFamilies::Users => "USERS",
            ColumnFamilies::MappingRules => "MAPPING_RULES",
            ColumnFamilies::MappingRulesByClaim => "MAPPING_RULES_BY_CLAIM",
            ColumnFamilies::Membership => "MEMBERSHIP",
            ColumnFamilies::MembershipByRelation => "MEMBERSHIP_BY_RELATION",
            ColumnFamilies::Authorizations => "AUTHORIZATIONS",
            ColumnFamilies::HistoryDeletions => "HISTORY_DELETIONS",
            ColumnFamilies::DeprecatedHistoryDeletions => "DEPRECATED_HISTORY_DELETIONS",
        }
    }
}

/// All typed state of one partition
pub struct ProcessingState {
    partition_id: u32,
    store: KeyedStateStore,
    key_generator: DbKeyGenerator,
    last_processed: LastProcessedPositionState,
    groups: GroupState,
    users: UserState,
    mapping_rules: MappingRuleState,
    membership: MembershipState,
    authorizations: AuthorizationState,
    history_deletions: HistoryDeletionState,
}

impl ProcessingState {
    pub fn new(partition_id: u32, store: KeyedStateStore) -> Self {
        Self {
            partition_id,
            key_generator: DbKeyGenerator::new(partition_id, &store),
            last_processed: LastProcessedPositionState::new(&store),
            groups: GroupState::new(&store),
            users: UserState::new(&store),
            mapping_rules: MappingRuleState::new(&store),
            membership: MembershipState::new(&store),
            authorizations: AuthorizationState::new(&store),
            history_deletions: HistoryDeletionState::new(&store),
            store,
        }
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    pub fn store(&self) -> &KeyedStateStore {
        &self.store
    }

    pub fn key_generator(&self) -> &DbKeyGenerator {
        &self.key_generator
    }

    pub fn key_generator_mut(&mut self) -> &mut DbKeyGenerator {
        &mut self.key_generator
    }

    pub fn last_processed(&self) -> &LastProcessedPositionState {
        &self.last_processed
    }

    pub fn last_processed_mut(&mut self) -> &mut LastProcessedPositionState {
        &mut self.last_processed
    }

    pub fn groups(&self) -> &GroupState {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut GroupState {
        &mut self.groups
    }

    pub fn users(&self) -> &UserState {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut UserState {
        &mut self.users
    }

    pub fn mapping_rules(&self) -> &MappingRuleState {
        &self.mapping_rules
    }

    pub fn mapping_rules_mut(&mut self) -> &mut MappingRuleState {
        &mut self.mapping_rules
    }

    pub fn membership(&self) -> &MembershipState {
        &self.membership
    }

    pub fn membership_mut(&mut self) -> &mut MembershipState {
        &mut self.membership
    }

    pub fn authorizations(&self) -> &AuthorizationState {
        &self.authorizations
    }

    pub fn authorizations_mut(&mut self) -> &mut AuthorizationState {
        &mut self.authorizations
    }

    pub fn history_deletions(&self) -> &HistoryDeletionState {
        &self.history_deletions
    }

    pub fn history_deletions_mut(&mut self) -> &mut HistoryDeletionState {
        &mut self.history_deletions
    }
}
