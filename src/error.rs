//! Error types for CaskDB
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using CaskError
pub type Result<T> = std::result::Result<T, CaskError>;

/// Unified error type for CaskDB operations
#[derive(Debug, Error)]
pub enum CaskError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    #[error("Key is empty")]
    EmptyKey,

    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Consistency Errors
    // -------------------------------------------------------------------------
    #[error("Index refused an update")]
    IndexUpdateFailed,

    #[error("Segment {0} not found")]
    SegmentNotFound(u32),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Data directory corrupt: {0}")]
    DirectoryCorrupt(String),

    #[error("Checksum mismatch in {} at offset {offset}", path.display())]
    ChecksumMismatch { path: PathBuf, offset: u64 },

    #[error("Unknown log record type: {0}")]
    InvalidRecordType(u8),

    #[error("Index backend error: {0}")]
    IndexBackend(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // -------------------------------------------------------------------------
    // Batch / Merge Errors
    // -------------------------------------------------------------------------
    #[error("Write batch too large: {pending} pending writes, max {max}")]
    BatchTooLarge { pending: usize, max: usize },

    #[error("Merge already in progress")]
    MergeInProgress,
}

impl From<bincode::Error> for CaskError {
    fn from(err: bincode::Error) -> Self {
        CaskError::Serialization(err.to_string())
    }
}

impl From<heed::Error> for CaskError {
    fn from(err: heed::Error) -> Self {
        CaskError::IndexBackend(err.to_string())
    }
}
