//! Event appliers of the identity and history domain

mod authorization;
mod group;
mod history_deletion;
mod mapping_rule;
mod user;

pub use authorization::AuthorizationCreatedApplier;
pub use group::{
    GroupCreatedApplier, GroupDeletedApplier, GroupEntityAddedApplier,
    GroupEntityAddedV1Applier, GroupEntityRemovedApplier, GroupEntityRemovedV1Applier,
    GroupUpdatedApplier,
};
pub use history_deletion::HistoryDeletionDeletedApplier;
pub use mapping_rule::{MappingRuleCreatedApplier, MappingRuleDeletedApplier};
pub use user::{UserCreatedApplier, UserDeletedApplier};

use super::applier::EventAppliers;
use crate::record::{
    AuthorizationIntent, GroupIntent, HistoryDeletionIntent, Intent, MappingRuleIntent, UserIntent,
};

/// Register every applier, including the older versions still found in logs.
pub fn register_event_appliers(appliers: &mut EventAppliers) {
    appliers
        .register(Intent::Group(GroupIntent::Created), 1, GroupCreatedApplier)
        .register(Intent::Group(GroupIntent::Updated), 1, GroupUpdatedApplier)
        .register(Intent::Group(GroupIntent::Deleted), 1, GroupDeletedApplier)
        .register(Intent::Group(GroupIntent::EntityAdded), 1, GroupEntityAddedV1Applier)
        .register(Intent::Group(GroupIntent::EntityAdded), 2, GroupEntityAddedApplier)
        .register(Intent::Group(GroupIntent::EntityRemoved), 1, GroupEntityRemovedV1Applier)
        .register(Intent::Group(GroupIntent::EntityRemoved), 2, GroupEntityRemovedApplier)
        .register(Intent::User(UserIntent::Created), 1, UserCreatedApplier)
        .register(Intent::User(UserIntent::Deleted), 1, UserDeletedApplier)
        .register(Intent::MappingRule(MappingRuleIntent::Created), 1, MappingRuleCreatedApplier)
        .register(Intent::MappingRule(MappingRuleIntent::Deleted), 1, MappingRuleDeletedApplier)
        .register(
            Intent::Authorization(AuthorizationIntent::Created),
            1,
            AuthorizationCreatedApplier,
        )
        .register(
            Intent::HistoryDeletion(HistoryDeletionIntent::Deleted),
            1,
            HistoryDeletionDeletedApplier,
        );
}
