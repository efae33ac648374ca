//! Record type, value type and intent tags

use serde::{Deserialize, Serialize};
use std::fmt;

byte_enum! {
    pub enum RecordType {
        Command = 0,
        Event = 1,
        CommandRejection = 2,
    }
}

byte_enum! {
    pub enum ValueType {
        Group = 1,
        User = 2,
        MappingRule = 3,
        Authorization = 4,
        HistoryDeletion = 5,
    }
}

byte_enum! {
    pub enum RejectionType {
        InvalidArgument = 1,
        NotFound = 2,
        AlreadyExists = 3,
        InvalidState = 4,
        Unauthorized = 5,
        Forbidden = 6,
        ProcessingError = 7,
        ExceededBatchRecordSize = 8,
    }
}

byte_enum! {
    pub enum GroupIntent {
        Create = 0,
        Created = 1,
        Update = 2,
        Updated = 3,
        Delete = 4,
        Deleted = 5,
        AddEntity = 6,
        EntityAdded = 7,
        RemoveEntity = 8,
        EntityRemoved = 9,
    }
}

byte_enum! {
    pub enum UserIntent {
        Create = 0,
        Created = 1,
        Delete = 2,
        Deleted = 3,
    }
}

byte_enum! {
    pub enum MappingRuleIntent {
        Create = 0,
        Created = 1,
        Delete = 2,
        Deleted = 3,
    }
}

byte_enum! {
    pub enum AuthorizationIntent {
        Create = 0,
        Created = 1,
    }
}

byte_enum! {
    pub enum HistoryDeletionIntent {
        Delete = 0,
        Deleted = 1,
    }
}

/// What a record asks for (commands) or states (events), scoped by value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Intent {
    Group(GroupIntent),
    User(UserIntent),
    MappingRule(MappingRuleIntent),
    Authorization(AuthorizationIntent),
    HistoryDeletion(HistoryDeletionIntent),
}

impl Intent {
    pub fn value_type(self) -> ValueType {
        match self {
            Intent::Group(_) => ValueType::Group,
            Intent::User(_) => ValueType::User,
            Intent::MappingRule(_) => ValueType::MappingRule,
            Intent::Authorization(_) => ValueType::Authorization,
            Intent::HistoryDeletion(_) => ValueType::HistoryDeletion,
        }
    }

    /// Byte code of the intent within its value type.
    pub fn code(self) -> u8 {
        match self {
            Intent::Group(i) => i.into(),
            Intent::User(i) => i.into(),
            Intent::MappingRule(i) => i.into(),
            Intent::Authorization(i) => i.into(),
            Intent::HistoryDeletion(i) => i.into(),
        }
    }

    pub fn from_code(value_type: ValueType, code: u8) -> Option<Intent> {
        match value_type {
            ValueType::Group => GroupIntent::try_from(code).ok().map(Intent::Group),
            ValueType::User => UserIntent::try_from(code).ok().map(Intent::User),
            ValueType::MappingRule => MappingRuleIntent::try_from(code)
                .ok()
                .map(Intent::MappingRule),
            ValueType::Authorization => AuthorizationIntent::try_from(code)
                .ok()
                .map(Intent::Authorization),
            ValueType::HistoryDeletion => HistoryDeletionIntent::try_from(code)
                .ok()
                .map(Intent::HistoryDeletion),
        }
    }

    /// Whether this intent names an event (past tense) rather than a command.
    pub fn is_event(self) -> bool {
        use AuthorizationIntent as A;
        use GroupIntent as G;
        use HistoryDeletionIntent as H;
        use MappingRuleIntent as M;
        use UserIntent as U;

        matches!(
            self,
            Intent::Group(
                G::Created | G::Updated | G::Deleted | G::EntityAdded | G::EntityRemoved
            ) | Intent::User(U::Created | U::Deleted)
                | Intent::MappingRule(M::Created | M::Deleted)
                | Intent::Authorization(A::Created)
                | Intent::HistoryDeletion(H::Deleted)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Intent::Group(i) => match i {
                GroupIntent::Create => "CREATE",
                GroupIntent::Created => "CREATED",
                GroupIntent::Update => "UPDATE",
                GroupIntent::Updated => "UPDATED",
                GroupIntent::Delete => "DELETE",
                GroupIntent::Deleted => "DELETED",
                GroupIntent::AddEntity => "ADD_ENTITY",
                GroupIntent::EntityAdded => "ENTITY_ADDED",
                GroupIntent::RemoveEntity => "REMOVE_ENTITY",
                GroupIntent::EntityRemoved => "ENTITY_REMOVED",
            },
            Intent::User(i) => match i {
                UserIntent::Create => "CREATE",
                UserIntent::Created => "CREATED",
                UserIntent::Delete => "DELETE",
                UserIntent::Deleted => "DELETED",
            },
            Intent::MappingRule(i) => match i {
                MappingRuleIntent::Create => "CREATE",
                MappingRuleIntent::Created => "CREATED",
                MappingRuleIntent::Delete => "DELETE",
                MappingRuleIntent::Deleted => "DELETED",
            },
            Intent::Authorization(i) => match i {
                AuthorizationIntent::Create => "CREATE",
                AuthorizationIntent::Created => "CREATED",
            },
            Intent::HistoryDeletion(i) => match i {
                HistoryDeletionIntent::Delete => "DELETE",
                HistoryDeletionIntent::Deleted => "DELETED",
            },
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordType::Command => "COMMAND",
            RecordType::Event => "EVENT",
            RecordType::CommandRejection => "COMMAND_REJECTION",
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Group => "GROUP",
            ValueType::User => "USER",
            ValueType::MappingRule => "MAPPING_RULE",
            ValueType::Authorization => "AUTHORIZATION",
            ValueType::HistoryDeletion => "HISTORY_DELETION",
        })
    }
}

impl fmt::Display for RejectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectionType::InvalidArgument => "INVALID_ARGUMENT",
            RejectionType::NotFound => "NOT_FOUND",
            RejectionType::AlreadyExists => "ALREADY_EXISTS",
            RejectionType::InvalidState => "INVALID_STATE",
            RejectionType::Unauthorized => "UNAUTHORIZED",
            RejectionType::Forbidden => "FORBIDDEN",
            RejectionType::ProcessingError => "PROCESSING_ERROR",
            RejectionType::ExceededBatchRecordSize => "EXCEEDED_BATCH_RECORD_SIZE",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_codes_round_trip_per_value_type() {
        let intent = Intent::Group(GroupIntent::EntityAdded);
        assert_eq!(
            Intent::from_code(intent.value_type(), intent.code()),
            Some(intent)
        );
        assert_eq!(Intent::from_code(ValueType::Authorization, 9), None);
    }

    #[test]
    fn classifies_events() {
        assert!(Intent::Group(GroupIntent::EntityRemoved).is_event());
        assert!(!Intent::Group(GroupIntent::RemoveEntity).is_event());
        assert!(Intent::HistoryDeletion(HistoryDeletionIntent::Deleted).is_event());
        assert!(!Intent::User(UserIntent::Delete).is_event());
    }

    #[test]
    fn unknown_bytes_are_rejected() {
        assert_eq!(ValueType::try_from(0), Err(0));
        assert_eq!(RecordType::try_from(2), Ok(RecordType::CommandRejection));
        assert_eq!(format!("{}", Intent::Group(GroupIntent::AddEntity)), "ADD_ENTITY");
    }
}
