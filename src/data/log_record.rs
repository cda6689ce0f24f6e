//! Log record codec
//!
//! Defines the structure of individual log records and their wire format.

use bytes::{BufMut, BytesMut};
use prost::encoding::{decode_varint, encode_varint};
use serde::{Deserialize, Serialize};

use crate::error::{CaskError, Result};

// =============================================================================
// Format Constants
// =============================================================================

/// Size of the leading CRC32 field
pub const CRC_SIZE: usize = 4;

/// CRC (4) + Type (1) + KeyLen (<= 5 byte varint) + ValueLen (<= 5 byte varint)
pub const MAX_HEADER_SIZE: usize = CRC_SIZE + 1 + 5 + 5;

/// Sequence number carried by every write that is not part of a batch
pub const NON_TXN_SEQ_NO: u64 = 0;

/// Key payload of the record that closes a committed write batch
pub const TXN_FIN_KEY: &[u8] = b"txn-fin";

// =============================================================================
// Record Types
// =============================================================================

/// Kind of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A live key/value pair
    Normal = 0,

    /// A tombstone
    Deleted = 1,

    /// Marks a write batch as committed
    TxnFinished = 2,
}

impl TryFrom<u8> for LogRecordType {
    type Error = CaskError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(LogRecordType::Normal),
            1 => Ok(LogRecordType::Deleted),
            2 => Ok(LogRecordType::TxnFinished),
            other => Err(CaskError::InvalidRecordType(other)),
        }
    }
}

/// A single record in a segment, hint, or marker file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub rec_type: LogRecordType,
}

impl LogRecord {
    pub fn normal(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            rec_type: LogRecordType::Normal,
        }
    }

    pub fn deleted(key: Vec<u8>) -> Self {
        Self {
            key,
            value: Vec::new(),
            rec_type: LogRecordType::Deleted,
        }
    }

    pub fn txn_finished(key: Vec<u8>) -> Self {
        Self {
            key,
            value: Vec::new(),
            rec_type: LogRecordType::TxnFinished,
        }
    }

    /// Serialize to the on-disk format, CRC first
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(MAX_HEADER_SIZE + self.key.len() + self.value.len());

        // CRC placeholder, filled in once the rest is laid out
        buf.put_u32_le(0);
        buf.put_u8(self.rec_type as u8);
        encode_varint(self.key.len() as u64, &mut buf);
        encode_varint(self.value.len() as u64, &mut buf);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);

        let crc = crc32fast::hash(&buf[CRC_SIZE..]);
        buf[..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
        buf.to_vec()
    }
}

// =============================================================================
// Header
// =============================================================================

/// Decoded fixed + varint header of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordHeader {
    pub crc: u32,
    /// Raw type byte; only trusted after the CRC checks out
    pub rec_type: u8,
    pub key_size: u32,
    pub value_size: u32,
}

impl LogRecordHeader {
    /// Decode a header from the front of `buf`
    ///
    /// Returns the header and its encoded length, or `None` if `buf` ends
    /// inside the header or a length field is malformed.
    pub fn decode(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < CRC_SIZE + 1 {
            return None;
        }

        let crc = u32::from_le_bytes(buf[..CRC_SIZE].try_into().ok()?);
        let rec_type = buf[CRC_SIZE];

        let mut cursor = &buf[CRC_SIZE + 1..];
        let key_size = u32::try_from(decode_varint(&mut cursor).ok()?).ok()?;
        let value_size = u32::try_from(decode_varint(&mut cursor).ok()?).ok()?;
        let header_len = buf.len() - cursor.len();

        Some((
            Self {
                crc,
                rec_type,
                key_size,
                value_size,
            },
            header_len,
        ))
    }

    /// Zeroed header: nothing was ever written here
    pub fn is_end_of_log(&self) -> bool {
        self.crc == 0 && self.key_size == 0 && self.value_size == 0
    }
}

/// CRC32 over an encoded header (minus its CRC field), key, and value
pub fn record_checksum(header_without_crc: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_without_crc);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

// =============================================================================
// Record Position
// =============================================================================

/// Location of exactly one record on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordPosition {
    pub segment_id: u32,
    pub offset: u64,
}

impl RecordPosition {
    pub fn new(segment_id: u32, offset: u64) -> Self {
        Self { segment_id, offset }
    }

    /// Encoding used for hint-file values and the persistent index
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

// =============================================================================
// Sequence-Number Keys
// =============================================================================

/// A user key paired with the batch sequence number it was written under
///
/// Stored keys are `varint(seq_no) ++ key`. Anything read back from a
/// segment must go through [`SeqKey::decode`] before touching the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqKey {
    pub seq_no: u64,
    pub key: Vec<u8>,
}

impl SeqKey {
    pub fn new(seq_no: u64, key: impl Into<Vec<u8>>) -> Self {
        Self {
            seq_no,
            key: key.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(10 + self.key.len());
        encode_varint(self.seq_no, &mut buf);
        buf.put_slice(&self.key);
        buf.to_vec()
    }

    pub fn decode(stored: &[u8]) -> Result<Self> {
        let mut cursor = stored;
        let seq_no = decode_varint(&mut cursor)
            .map_err(|e| CaskError::Serialization(format!("Invalid sequence prefix: {}", e)))?;
        Ok(Self {
            seq_no,
            key: cursor.to_vec(),
        })
    }
}
