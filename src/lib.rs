//! # CaskDB
//!
//! An embedded, crash-safe key-value store built on the append-only log
//! (bitcask) model:
//! - Every write is one CRC-checked record appended to the active segment
//! - An ordered in-memory (or LMDB-backed) index maps keys to positions
//! - Atomic write batches via sequence-numbered keys and a finish record
//! - Merge compacts older segments and leaves a hint file for fast reopen
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Engine  (put / get / delete / merge / iterate)        │
//! │            (Single Writer / Multi Reader)                    │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌─────────────────┐            ┌─────────────────┐
//!   │ SegmentManager  │            │     Indexer     │
//!   │ (RwLock, append │            │ btree/art/lmdb  │
//!   │   + rollover)   │            │ key → position  │
//!   └────────┬────────┘            └─────────────────┘
//!            │
//!            ▼
//!   ┌─────────────────┐
//!   │ Segment files   │
//!   │ 000000000.data  │
//!   └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod fio;
pub mod data;
pub mod storage;
pub mod index;
pub mod engine;
pub mod batch;
pub mod merge;
pub mod iterator;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CaskError, Result};
pub use config::{Config, IndexType, IteratorConfig, WriteBatchConfig};
pub use engine::{Engine, EngineStat};
pub use batch::WriteBatch;
pub use iterator::DbIterator;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of CaskDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
