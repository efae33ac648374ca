//! Error types for the keyed state store

use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// `insert` on a key that is already present
    #[error("expected to insert a new key into column family '{column_family}', but key {key} already exists")]
    KeyExists {
        column_family: &'static str,
        key: String,
    },

    /// `update` or `delete_existing` on a key that is absent
    #[error("expected key {key} to exist in column family '{column_family}', but it does not")]
    KeyNotFound {
        column_family: &'static str,
        key: String,
    },

    #[error("failed to decode key: {0}")]
    KeyDecoding(String),

    #[error("failed to encode value: {0}")]
    ValueEncoding(String),

    #[error("failed to decode value: {0}")]
    ValueDecoding(String),

    /// Storage I/O failure; the operation may succeed when retried
    #[error("storage I/O error: {0}")]
    Io(String),

    /// The backend detected corrupted data
    #[error("storage corruption: {0}")]
    Corruption(String),

    #[error("transaction context lock poisoned")]
    Poisoned,
}

impl DbError {
    /// Whether retrying the failed operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Io(_))
    }
}
