//! Partition-scoped key generation
//!
//! Keys carry the partition id in their upper 13 bits, so a key names its owning
//! partition. The next key is part of the state and therefore restored by
//! snapshots and replay.

use crate::db::{ColumnFamily, DbResult, KeyedStateStore};

use super::ColumnFamilies;

const KEY_BITS: u32 = 51;
const NEXT_KEY: &str = "NEXT";

pub fn encode_partition_id(partition_id: u32, key: i64) -> i64 {
    ((partition_id as i64) << KEY_BITS) + key
}

pub fn decode_partition_id(key: i64) -> u32 {
    (key >> KEY_BITS) as u32
}

pub struct DbKeyGenerator {
    partition_id: u32,
    next_key: ColumnFamily<String, i64>,
}

impl DbKeyGenerator {
    pub(crate) fn new(partition_id: u32, store: &KeyedStateStore) -> Self {
        Self {
            partition_id,
            next_key: store.create_column_family(ColumnFamilies::Key),
        }
    }

    /// The last key handed out, or the partition's base key.
    pub fn current_key(&self) -> DbResult<i64> {
        Ok(self
            .next_key
            .get(&NEXT_KEY.to_string())?
            .unwrap_or_else(|| encode_partition_id(self.partition_id, 0)))
    }

    pub fn next_key(&mut self) -> DbResult<i64> {
        let key = self.current_key()? + 1;
        self.next_key.upsert(&NEXT_KEY.to_string(), &key)?;
        Ok(key)
    }

    /// Raise the generator to `key` if it belongs to this partition and is higher.
    /// Used on replay, so keys are never handed out twice.
    pub fn set_key_if_higher(&mut self, key: i64) -> DbResult<()> {
        if key <= 0 || decode_partition_id(key) != self.partition_id {
            return Ok(());
        }
        if key > self.current_key()? {
            self.next_key.upsert(&NEXT_KEY.to_string(), &key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_encode_partition() {
        let store = KeyedStateStore::in_memory();
        let mut generator = DbKeyGenerator::new(3, &store);

        let first = generator.next_key().unwrap();
        let second = generator.next_key().unwrap();
        assert_eq!(decode_partition_id(first), 3);
        assert_eq!(second, first + 1);
    }

    #[test]
    fn set_key_if_higher_ignores_foreign_and_lower_keys() {
        let store = KeyedStateStore::in_memory();
        let mut generator = DbKeyGenerator::new(1, &store);
        let replayed = encode_partition_id(1, 40);

        generator.set_key_if_higher(replayed).unwrap();
        generator.set_key_if_higher(encode_partition_id(1, 5)).unwrap();
        generator.set_key_if_higher(encode_partition_id(2, 900)).unwrap();

        assert_eq!(generator.next_key().unwrap(), replayed + 1);
    }
}
