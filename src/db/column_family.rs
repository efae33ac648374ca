//! Typed column families

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::errors::{DbError, DbResult};
use super::key::{DbKey, KeyDisplay};
use super::transaction::TransactionContext;
use super::value::{decode_value, encode_value, DbValue};

/// A typed view on one column family.
///
/// All reads and writes go through the store's [`TransactionContext`], so they
/// become durable only when the current transaction commits.
pub struct ColumnFamily<K, V> {
    name: &'static str,
    prefix: [u8; 2],
    context: Arc<TransactionContext>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> fmt::Debug for ColumnFamily<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnFamily")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl<K: DbKey, V: DbValue> ColumnFamily<K, V> {
    pub(crate) fn new(name: &'static str, id: u16, context: Arc<TransactionContext>) -> Self {
        Self {
            name,
            prefix: id.to_be_bytes(),
            context,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn full_key<P: DbKey>(&self, key: &P) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        buf.extend_from_slice(&self.prefix);
        key.write_to(&mut buf);
        buf
    }

    fn key_display(&self, full_key: &[u8]) -> String {
        KeyDisplay(&full_key[self.prefix.len()..]).to_string()
    }

    /// Insert a new entry.
    ///
    /// # Returns
    /// * `Err(DbError::KeyExists)` - the key is already present
    pub fn insert(&self, key: &K, value: &V) -> DbResult<()> {
        let full_key = self.full_key(key);
        if self.context.get(&full_key)?.is_some() {
            return Err(DbError::KeyExists {
                column_family: self.name,
                key: self.key_display(&full_key),
            });
        }
        self.context.put(full_key, encode_value(value)?)
    }

    /// Replace the value of an existing entry.
    ///
    /// # Returns
    /// * `Err(DbError::KeyNotFound)` - the key is absent
    pub fn update(&self, key: &K, value: &V) -> DbResult<()> {
        let full_key = self.full_key(key);
        if self.context.get(&full_key)?.is_none() {
            return Err(DbError::KeyNotFound {
                column_family: self.name,
                key: self.key_display(&full_key),
            });
        }
        self.context.put(full_key, encode_value(value)?)
    }

    pub fn upsert(&self, key: &K, value: &V) -> DbResult<()> {
        self.context.put(self.full_key(key), encode_value(value)?)
    }

    pub fn get(&self, key: &K) -> DbResult<Option<V>> {
        match self.context.get(&self.full_key(key))? {
            Some(bytes) => Ok(Some(decode_value(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn exists(&self, key: &K) -> DbResult<bool> {
        Ok(self.context.get(&self.full_key(key))?.is_some())
    }

    /// Delete an entry that must exist.
    pub fn delete_existing(&self, key: &K) -> DbResult<()> {
        let full_key = self.full_key(key);
        if self.context.get(&full_key)?.is_none() {
            return Err(DbError::KeyNotFound {
                column_family: self.name,
                key: self.key_display(&full_key),
            });
        }
        self.context.delete(full_key)
    }

    /// Delete an entry if present. Returns whether something was deleted.
    pub fn delete_if_exists(&self, key: &K) -> DbResult<bool> {
        let full_key = self.full_key(key);
        if self.context.get(&full_key)?.is_none() {
            return Ok(false);
        }
        self.context.delete(full_key)?;
        Ok(true)
    }

    fn scan<F>(&self, raw_prefix: &[u8], mut visitor: F) -> DbResult<()>
    where
        F: FnMut(K, V) -> bool,
    {
        for (full_key, bytes) in self.context.scan_prefix(raw_prefix)? {
            let key = K::from_bytes(&full_key[self.prefix.len()..])?;
            let value = decode_value(&bytes)?;
            if !visitor(key, value) {
                break;
            }
        }
        Ok(())
    }

    /// Visit every entry in key order.
    pub fn for_each<F>(&self, mut visitor: F) -> DbResult<()>
    where
        F: FnMut(K, V),
    {
        self.scan(&self.prefix, |k, v| {
            visitor(k, v);
            true
        })
    }

    /// Visit entries in key order until the visitor returns `false`.
    pub fn while_true<F>(&self, visitor: F) -> DbResult<()>
    where
        F: FnMut(K, V) -> bool,
    {
        self.scan(&self.prefix, visitor)
    }

    /// Visit, in key order, the entries whose key starts with the encoding of
    /// `prefix`, until the visitor returns `false`.
    ///
    /// `prefix` is usually the leading components of a composite key, for example
    /// the tenant id of a [`TenantAwareKey`](super::TenantAwareKey).
    pub fn while_equal_prefix<P, F>(&self, prefix: &P, visitor: F) -> DbResult<()>
    where
        P: DbKey,
        F: FnMut(K, V) -> bool,
    {
        let raw_prefix = self.full_key(prefix);
        self.scan(&raw_prefix, visitor)
    }

    /// All entries in key order.
    pub fn entries(&self) -> DbResult<Vec<(K, V)>> {
        let mut entries = Vec::new();
        self.for_each(|k, v| entries.push((k, v)))?;
        Ok(entries)
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        let mut empty = true;
        self.while_true(|_, _| {
            empty = false;
            false
        })?;
        Ok(empty)
    }

    pub fn count(&self) -> DbResult<usize> {
        let mut count = 0;
        self.for_each(|_, _| count += 1)?;
        Ok(count)
    }
}
