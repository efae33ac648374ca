//! Value encoding for column families
//!
//! Values are MessagePack with named fields, so persisted state keeps decoding when
//! fields are added (with `#[serde(default)]`) or reordered.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::errors::{DbError, DbResult};

/// Any serde type can be stored as a column family value.
pub trait DbValue: Serialize + DeserializeOwned {}

impl<T: Serialize + DeserializeOwned> DbValue for T {}

/// Marker value for column families that are used as sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbNil;

pub(crate) fn encode_value<V: Serialize>(value: &V) -> DbResult<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| DbError::ValueEncoding(e.to_string()))
}

pub(crate) fn decode_value<V: DeserializeOwned>(bytes: &[u8]) -> DbResult<V> {
    rmp_serde::from_slice(bytes).map_err(|e| DbError::ValueDecoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct PersistedV1 {
        name: String,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct PersistedV2 {
        name: String,
        #[serde(default)]
        description: String,
    }

    #[test]
    fn newer_layout_reads_older_values() {
        let bytes = encode_value(&PersistedV1 { name: "g1".into() }).unwrap();
        let decoded: PersistedV2 = decode_value(&bytes).unwrap();
        assert_eq!(
            decoded,
            PersistedV2 {
                name: "g1".into(),
                description: String::new()
            }
        );
    }

    #[test]
    fn garbage_is_a_decoding_error() {
        let result: DbResult<PersistedV1> = decode_value(&[0xc1, 0xc1]);
        assert!(matches!(result, Err(DbError::ValueDecoding(_))));
    }
}
