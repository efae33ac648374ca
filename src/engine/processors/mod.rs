//! Command processors of the identity and history domain

mod authorization;
mod group;
mod history_deletion;
mod mapping_rule;
mod user;

pub use authorization::CreateAuthorizationProcessor;
pub use group::{
    AddEntityToGroupProcessor, CreateGroupProcessor, DeleteGroupProcessor,
    RemoveEntityFromGroupProcessor, UpdateGroupProcessor,
};
pub use history_deletion::DeleteHistoryProcessor;
pub use mapping_rule::{CreateMappingRuleProcessor, DeleteMappingRuleProcessor};
pub use user::{CreateUserProcessor, DeleteUserProcessor};

use super::processor::RecordProcessors;
use crate::record::{
    AuthorizationIntent, GroupIntent, HistoryDeletionIntent, Intent, MappingRuleIntent, UserIntent,
};

pub fn register_record_processors(processors: &mut RecordProcessors) {
    processors
        .register(Intent::Group(GroupIntent::Create), CreateGroupProcessor)
        .register(Intent::Group(GroupIntent::Update), UpdateGroupProcessor)
        .register(Intent::Group(GroupIntent::Delete), DeleteGroupProcessor)
        .register(Intent::Group(GroupIntent::AddEntity), AddEntityToGroupProcessor)
        .register(Intent::Group(GroupIntent::RemoveEntity), RemoveEntityFromGroupProcessor)
        .register(Intent::User(UserIntent::Create), CreateUserProcessor)
        .register(Intent::User(UserIntent::Delete), DeleteUserProcessor)
        .register(Intent::MappingRule(MappingRuleIntent::Create), CreateMappingRuleProcessor)
        .register(Intent::MappingRule(MappingRuleIntent::Delete), DeleteMappingRuleProcessor)
        .register(
            Intent::Authorization(AuthorizationIntent::Create),
            CreateAuthorizationProcessor,
        )
        .register(
            Intent::HistoryDeletion(HistoryDeletionIntent::Delete),
            DeleteHistoryProcessor,
        );
}
