//! Data Module
//!
//! On-disk record format and the single-file segment abstraction.
//!
//! ## Responsibilities
//! - Encode/decode log records with a CRC32 checksum
//! - Sequence-number prefixes on stored keys (write batches)
//! - Positional reads of one record from a segment, hint, or marker file
//!
//! ## Record Format
//! ```text
//! ┌─────────┬──────────┬─────────────────┬───────────────────┬─────┬───────┐
//! │ CRC (4) │ Type (1) │ KeyLen (varint) │ ValueLen (varint) │ Key │ Value │
//! └─────────┴──────────┴─────────────────┴───────────────────┴─────┴───────┘
//! ```
//!
//! CRC covers every byte after the CRC field. An all-zero header marks the
//! end of the log.

mod log_record;
mod segment;

pub use log_record::{
    record_checksum, LogRecord, LogRecordHeader, LogRecordType, RecordPosition, SeqKey,
    CRC_SIZE, MAX_HEADER_SIZE, NON_TXN_SEQ_NO, TXN_FIN_KEY,
};
pub use segment::{
    segment_file_name, segment_path, Segment, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME,
    SEGMENT_FILE_SUFFIX, SEQ_NO_FILE_NAME,
};
