//! Error types of the processing engine
//!
//! A command either succeeds, is rejected, or fails. Rejections are expected
//! outcomes and travel as `ProcessingError::Rejected`, so every processor uses
//! `?` for them; the stream processor decides what a failure means from
//! `is_fatal()` and `is_transient()`.

use std::fmt;
use thiserror::Error;

use crate::db::DbError;
use crate::record::{Intent, RejectionType, ValueType};

/// Why a command was not accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub rejection_type: RejectionType,
    pub reason: String,
}

impl Rejection {
    pub fn new(rejection_type: RejectionType, reason: impl Into<String>) -> Self {
        Self {
            rejection_type,
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(RejectionType::NotFound, reason)
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::new(RejectionType::InvalidArgument, reason)
    }

    pub fn already_exists(reason: impl Into<String>) -> Self {
        Self::new(RejectionType::AlreadyExists, reason)
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::new(RejectionType::InvalidState, reason)
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::new(RejectionType::Unauthorized, reason)
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::new(RejectionType::Forbidden, reason)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rejection_type, self.reason)
    }
}

/// Faults raised while applying an event to state.
///
/// Every applier fault means the log and the state disagree; none of them is
/// recoverable by retrying.
#[derive(Debug, Error)]
pub enum ApplierError {
    #[error("No event applier registered for {intent} version {version}")]
    MissingApplier { intent: Intent, version: u16 },

    #[error("Expected event value of type {expected}, but got {actual}")]
    UnexpectedValue {
        expected: ValueType,
        actual: ValueType,
    },

    #[error("{0}")]
    IllegalState(String),

    #[error("State access failed while applying event: {0}")]
    Db(#[from] DbError),
}

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Command rejected with {0}")]
    Rejected(Rejection),

    #[error(transparent)]
    Applier(#[from] ApplierError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Expected to write at most {limit} follow-up records for one command, but tried to write more")]
    BatchTooLarge { limit: usize },

    #[error("No processor registered for {0}")]
    Unsupported(Intent),

    #[error("Expected command {intent} to carry a {expected} value, but got {actual}")]
    ValueMismatch {
        intent: Intent,
        expected: ValueType,
        actual: ValueType,
    },
}

impl From<Rejection> for ProcessingError {
    fn from(rejection: Rejection) -> Self {
        ProcessingError::Rejected(rejection)
    }
}

impl ApplierError {
    /// A store hiccup; the event itself is fine.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApplierError::Db(e) if e.is_transient())
    }
}

impl ProcessingError {
    /// Halts the partition: state may no longer match the log.
    pub fn is_fatal(&self) -> bool {
        match self {
            ProcessingError::Applier(e) => !e.is_transient(),
            ProcessingError::Db(e) => !e.is_transient(),
            _ => false,
        }
    }

    /// The same command may succeed when processed again from scratch.
    pub fn is_transient(&self) -> bool {
        match self {
            ProcessingError::Applier(e) => e.is_transient(),
            ProcessingError::Db(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Rejection written for a failure that neither halts nor retries.
    pub fn to_rejection(&self) -> Rejection {
        match self {
            ProcessingError::Rejected(rejection) => rejection.clone(),
            ProcessingError::BatchTooLarge { .. } => {
                Rejection::new(RejectionType::ExceededBatchRecordSize, self.to_string())
            }
            other => Rejection::new(
                RejectionType::ProcessingError,
                format!("Expected to process command, but an unexpected error occurred: {}", other),
            ),
        }
    }
}
