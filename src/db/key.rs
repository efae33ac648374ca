//! Order-preserving key encodings
//!
//! Every key type encodes to bytes whose lexicographic order matches the logical
//! order of the key, and distinct logical keys never share an encoding. Composite
//! keys are plain concatenations, which is only collision-free because every
//! variable-length component (strings) is escaped and terminated:
//!
//! | byte | encoded as  |
//! |------|-------------|
//! | 0x00 | 0x00 0xFF   |
//! | end  | 0x00 0x01   |
//!
//! Signed integers flip the sign bit so that negative values sort first.

use bytes::{Buf, BufMut};
use std::fmt;

use super::errors::{DbError, DbResult};

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// A typed key that can be stored in a column family.
pub trait DbKey: Sized {
    /// Append the encoding of this key to `buf`.
    fn write_to(&self, buf: &mut Vec<u8>);

    /// Read one key from the front of `buf`, advancing it.
    fn read_from(buf: &mut &[u8]) -> DbResult<Self>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    /// Decode a key that must span all of `bytes`.
    fn from_bytes(mut bytes: &[u8]) -> DbResult<Self> {
        let key = Self::read_from(&mut bytes)?;
        if !bytes.is_empty() {
            return Err(DbError::KeyDecoding(format!(
                "{} trailing bytes after key",
                bytes.len()
            )));
        }
        Ok(key)
    }
}

fn ensure_remaining(buf: &[u8], needed: usize, what: &str) -> DbResult<()> {
    if buf.remaining() < needed {
        return Err(DbError::KeyDecoding(format!(
            "need {} bytes for {}, have {}",
            needed,
            what,
            buf.remaining()
        )));
    }
    Ok(())
}

impl DbKey for u8 {
    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.put_u8(*self);
    }

    fn read_from(buf: &mut &[u8]) -> DbResult<Self> {
        ensure_remaining(buf, 1, "u8")?;
        Ok(buf.get_u8())
    }
}

impl DbKey for u32 {
    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.put_u32(*self);
    }

    fn read_from(buf: &mut &[u8]) -> DbResult<Self> {
        ensure_remaining(buf, 4, "u32")?;
        Ok(buf.get_u32())
    }
}

impl DbKey for u64 {
    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.put_u64(*self);
    }

    fn read_from(buf: &mut &[u8]) -> DbResult<Self> {
        ensure_remaining(buf, 8, "u64")?;
        Ok(buf.get_u64())
    }
}

impl DbKey for i64 {
    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.put_u64((*self as u64) ^ (1 << 63));
    }

    fn read_from(buf: &mut &[u8]) -> DbResult<Self> {
        ensure_remaining(buf, 8, "i64")?;
        Ok((buf.get_u64() ^ (1 << 63)) as i64)
    }
}

impl DbKey for String {
    fn write_to(&self, buf: &mut Vec<u8>) {
        for &byte in self.as_bytes() {
            if byte == ESCAPE {
                buf.put_slice(&[ESCAPE, ESCAPED_ZERO]);
            } else {
                buf.put_u8(byte);
            }
        }
        buf.put_slice(&[ESCAPE, TERMINATOR]);
    }

    fn read_from(buf: &mut &[u8]) -> DbResult<Self> {
        let mut raw = Vec::new();
        loop {
            ensure_remaining(buf, 1, "string terminator")?;
            let byte = buf.get_u8();
            if byte != ESCAPE {
                raw.push(byte);
                continue;
            }
            ensure_remaining(buf, 1, "escaped byte")?;
            match buf.get_u8() {
                TERMINATOR => break,
                ESCAPED_ZERO => raw.push(0x00),
                other => {
                    return Err(DbError::KeyDecoding(format!(
                        "invalid escape sequence 0x00 0x{:02x}",
                        other
                    )))
                }
            }
        }
        String::from_utf8(raw).map_err(|e| DbError::KeyDecoding(e.to_string()))
    }
}

/// Two keys stored as one, ordered by the first component, then the second.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey<A, B>(pub A, pub B);

impl<A, B> CompositeKey<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self(first, second)
    }

    pub fn first(&self) -> &A {
        &self.0
    }

    pub fn second(&self) -> &B {
        &self.1
    }
}

impl<A: DbKey, B: DbKey> DbKey for CompositeKey<A, B> {
    fn write_to(&self, buf: &mut Vec<u8>) {
        self.0.write_to(buf);
        self.1.write_to(buf);
    }

    fn read_from(buf: &mut &[u8]) -> DbResult<Self> {
        let first = A::read_from(buf)?;
        let second = B::read_from(buf)?;
        Ok(Self(first, second))
    }
}

/// A key placed under a tenant: the tenant id is the outermost segment, so all
/// entries of one tenant are contiguous in the column family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantAwareKey<K> {
    tenant_id: String,
    key: K,
}

impl<K> TenantAwareKey<K> {
    pub fn new(tenant_id: impl Into<String>, key: K) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            key,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn into_parts(self) -> (String, K) {
        (self.tenant_id, self.key)
    }
}

impl<K: DbKey> DbKey for TenantAwareKey<K> {
    fn write_to(&self, buf: &mut Vec<u8>) {
        self.tenant_id.write_to(buf);
        self.key.write_to(buf);
    }

    fn read_from(buf: &mut &[u8]) -> DbResult<Self> {
        let tenant_id = String::read_from(buf)?;
        let key = K::read_from(buf)?;
        Ok(Self { tenant_id, key })
    }
}

/// Renders an encoded key for error messages.
pub(crate) struct KeyDisplay<'a>(pub &'a [u8]);

impl fmt::Display for KeyDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Implements [`DbKey`] for a `#[repr(u8)]` enum that converts to and from `u8`.
macro_rules! u8_enum_db_key {
    ($ty:ty) => {
        impl $crate::db::key::DbKey for $ty {
            fn write_to(&self, buf: &mut Vec<u8>) {
                buf.push(u8::from(*self));
            }

            fn read_from(buf: &mut &[u8]) -> $crate::db::DbResult<Self> {
                let raw = <u8 as $crate::db::key::DbKey>::read_from(buf)?;
                <$ty>::try_from(raw).map_err(|_| {
                    $crate::db::DbError::KeyDecoding(format!(
                        "unknown {} discriminant {}",
                        stringify!($ty),
                        raw
                    ))
                })
            }
        }
    };
}

pub(crate) use u8_enum_db_key;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn string_round_trip_with_reserved_bytes() {
        let key = String::from("a\u{0}b\u{1}c");
        let encoded = key.to_bytes();
        assert_eq!(&encoded[encoded.len() - 2..], &[ESCAPE, TERMINATOR]);
        assert_eq!(String::from_bytes(&encoded).unwrap(), key);
    }

    #[test]
    fn composite_keys_do_not_collide() {
        let a = CompositeKey("ab".to_string(), "c".to_string()).to_bytes();
        let b = CompositeKey("a".to_string(), "bc".to_string()).to_bytes();
        assert_ne!(a, b);
    }

    #[test]
    fn tenant_prefix_groups_entries() {
        let t1_high = TenantAwareKey::new("tenant-a", 900i64).to_bytes();
        let t2_low = TenantAwareKey::new("tenant-b", -5i64).to_bytes();
        assert!(t1_high < t2_low);

        let prefix = "tenant-a".to_string().to_bytes();
        assert!(t1_high.starts_with(&prefix));
    }

    #[test]
    fn rejects_truncated_and_trailing_bytes() {
        assert!(matches!(u64::from_bytes(&[0, 1, 2]), Err(DbError::KeyDecoding(_))));
        assert!(matches!(String::from_bytes(b"abc"), Err(DbError::KeyDecoding(_))));
        assert!(matches!(u8::from_bytes(&[1, 2]), Err(DbError::KeyDecoding(_))));
    }

    proptest! {
        #[test]
        fn i64_encoding_preserves_order(a: i64, b: i64) {
            prop_assert_eq!(a.cmp(&b), a.to_bytes().cmp(&b.to_bytes()));
        }

        #[test]
        fn string_encoding_preserves_order(a in "\\PC{0,12}", b in "\\PC{0,12}") {
            prop_assert_eq!(a.as_bytes().cmp(b.as_bytes()), a.to_bytes().cmp(&b.to_bytes()));
        }

        #[test]
        fn composite_encoding_preserves_order(a in "[a-c\\x00\\x01]{0,4}", x: i64, b in "[a-c\\x00\\x01]{0,4}", y: i64) {
            let left = CompositeKey(a.clone(), x);
            let right = CompositeKey(b.clone(), y);
            let logical = a.as_bytes().cmp(b.as_bytes()).then(x.cmp(&y));
            prop_assert_eq!(logical, left.to_bytes().cmp(&right.to_bytes()));
            prop_assert_eq!(CompositeKey::<String, i64>::from_bytes(&left.to_bytes()).unwrap(), left);
        }
    }
}
