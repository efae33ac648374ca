//! Record wire format
//!
//! ```text
//! +--------+---------+-------------+------------+--------+-------+----------+
//! | magic  | version | record type | value type | intent | flags | reserved |
//! | u16    | u8      | u8          | u8         | u8     | u8    | u8       |
//! +--------+---------+-------------+------------+--------+-------+----------+
//! | partition id u32 | position i64 | source position i64 | key i64         |
//! +------------------+--------------+---------------------+-----------------+
//! | timestamp i64    | metadata length u32 | value length u32                 |
//! +------------------+---------------------+----------------------------------+
//! | metadata (MessagePack) | value (MessagePack)                              |
//! +------------------------+--------------------------------------------------+
//! ```
//!
//! All integers are big endian. The header has a fixed size, so log readers can
//! filter by type, intent or position without touching the value bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::metadata::RecordMetadata;
use super::typed::Record;
use super::types::{Intent, RecordType, ValueType};
use super::value::RecordValue;

/// "EV" in big endian
pub const RECORD_MAGIC: u16 = 0x4556;

pub const RECORD_FORMAT_VERSION: u8 = 1;

pub const HEADER_SIZE: usize = 52;

/// Upper bound for metadata plus value (4 MiB)
pub const MAX_BODY_SIZE: u32 = 4 * 1024 * 1024;

const FLAG_REJECTION: u8 = 0b0000_0001;
const FLAG_HAS_REQUEST: u8 = 0b0000_0010;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("record truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("invalid record magic: {0:#06x}")]
    InvalidMagic(u16),

    #[error("unsupported record format version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown record type: {0}")]
    UnknownRecordType(u8),

    #[error("unknown value type: {0}")]
    UnknownValueType(u8),

    #[error("unknown intent {intent} for value type {value_type}")]
    UnknownIntent { value_type: ValueType, intent: u8 },

    #[error("record body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: u32, max: u32 },

    #[error("header and metadata disagree: {0}")]
    HeaderMismatch(String),

    #[error("failed to encode record: {0}")]
    Encode(String),

    #[error("failed to decode record: {0}")]
    Decode(String),
}

/// Fixed-size record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub record_type: RecordType,
    pub value_type: ValueType,
    pub intent: Intent,
    pub flags: u8,
    pub partition_id: u32,
    pub position: i64,
    pub source_position: i64,
    pub key: i64,
    pub timestamp: i64,
    pub metadata_length: u32,
    pub value_length: u32,
}

impl RecordHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(RECORD_MAGIC);
        buf.put_u8(RECORD_FORMAT_VERSION);
        buf.put_u8(self.record_type.into());
        buf.put_u8(self.value_type.into());
        buf.put_u8(self.intent.code());
        buf.put_u8(self.flags);
        buf.put_u8(0);
        buf.put_u32(self.partition_id);
        buf.put_i64(self.position);
        buf.put_i64(self.source_position);
        buf.put_i64(self.key);
        buf.put_i64(self.timestamp);
        buf.put_u32(self.metadata_length);
        buf.put_u32(self.value_length);
    }

    /// Decode and validate a header from the front of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::Truncated {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let mut buf = bytes;
        let magic = buf.get_u16();
        if magic != RECORD_MAGIC {
            return Err(CodecError::InvalidMagic(magic));
        }
        let version = buf.get_u8();
        if version != RECORD_FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let raw_record_type = buf.get_u8();
        let record_type = RecordType::try_from(raw_record_type)
            .map_err(CodecError::UnknownRecordType)?;
        let value_type =
            ValueType::try_from(buf.get_u8()).map_err(CodecError::UnknownValueType)?;
        let raw_intent = buf.get_u8();
        let intent = Intent::from_code(value_type, raw_intent).ok_or(CodecError::UnknownIntent {
            value_type,
            intent: raw_intent,
        })?;
        let flags = buf.get_u8();
        let _reserved = buf.get_u8();

        let header = Self {
            record_type,
            value_type,
            intent,
            flags,
            partition_id: buf.get_u32(),
            position: buf.get_i64(),
            source_position: buf.get_i64(),
            key: buf.get_i64(),
            timestamp: buf.get_i64(),
            metadata_length: buf.get_u32(),
            value_length: buf.get_u32(),
        };

        let body = header.metadata_length.saturating_add(header.value_length);
        if body > MAX_BODY_SIZE {
            return Err(CodecError::BodyTooLarge {
                size: body,
                max: MAX_BODY_SIZE,
            });
        }
        Ok(header)
    }

    pub fn is_rejection(&self) -> bool {
        self.flags & FLAG_REJECTION != 0
    }

    pub fn has_request(&self) -> bool {
        self.flags & FLAG_HAS_REQUEST != 0
    }

    /// Total encoded length of the record this header belongs to.
    pub fn frame_length(&self) -> usize {
        HEADER_SIZE + self.metadata_length as usize + self.value_length as usize
    }
}

/// Encode a record into one contiguous buffer.
pub fn encode_record(record: &Record) -> Result<Bytes, CodecError> {
    if record.metadata.value_type != record.value.value_type() {
        return Err(CodecError::HeaderMismatch(format!(
            "metadata says {}, value is {}",
            record.metadata.value_type,
            record.value.value_type()
        )));
    }

    let metadata = rmp_serde::to_vec_named(&record.metadata)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    let value = record.value.encode()?;

    let mut flags = 0;
    if record.metadata.rejection_type.is_some() {
        flags |= FLAG_REJECTION;
    }
    if record.metadata.has_request() {
        flags |= FLAG_HAS_REQUEST;
    }

    let header = RecordHeader {
        record_type: record.metadata.record_type,
        value_type: record.metadata.value_type,
        intent: record.metadata.intent,
        flags,
        partition_id: record.partition_id,
        position: record.position,
        source_position: record.source_record_position,
        key: record.key,
        timestamp: record.timestamp,
        metadata_length: metadata.len() as u32,
        value_length: value.len() as u32,
    };

    let mut buf = BytesMut::with_capacity(header.frame_length());
    header.encode(&mut buf);
    buf.put_slice(&metadata);
    buf.put_slice(&value);
    Ok(buf.freeze())
}

/// Decode a full record.
pub fn decode_record(bytes: &[u8]) -> Result<Record, CodecError> {
    let header = RecordHeader::decode(bytes)?;
    if bytes.len() < header.frame_length() {
        return Err(CodecError::Truncated {
            needed: header.frame_length(),
            available: bytes.len(),
        });
    }

    let metadata_end = HEADER_SIZE + header.metadata_length as usize;
    let metadata: RecordMetadata = rmp_serde::from_slice(&bytes[HEADER_SIZE..metadata_end])
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    if metadata.record_type != header.record_type || metadata.intent != header.intent {
        return Err(CodecError::HeaderMismatch(format!(
            "header {} {}, metadata {} {}",
            header.record_type, header.intent, metadata.record_type, metadata.intent
        )));
    }

    let value = RecordValue::decode(
        header.value_type,
        &bytes[metadata_end..header.frame_length()],
    )?;

    Ok(Record {
        position: header.position,
        source_record_position: header.source_position,
        key: header.key,
        timestamp: header.timestamp,
        partition_id: header.partition_id,
        metadata,
        value,
    })
}
