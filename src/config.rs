//! Configuration for CaskDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{CaskError, Result};

/// Main configuration for a CaskDB instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {dir_path}/
    ///     ├── 000000000.data   (segments, highest id is active)
    ///     ├── hint-index       (written by merge)
    ///     ├── merge-finished   (boundary of the last adopted merge)
    ///     └── index-store/     (persistent index only)
    pub dir_path: PathBuf,

    /// Max size of one segment file before rolling over (in bytes)
    pub max_segment_size: u64,

    /// fsync the active segment after every put/delete
    pub sync_on_write: bool,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Which index backend maps keys to record positions
    pub index_type: IndexType,
}

/// Index backend, selected once at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexType {
    /// In-memory balanced tree (rebuilt by replay on open)
    #[default]
    BTree,

    /// In-memory adaptive radix tree (rebuilt by replay on open)
    AdaptiveRadixTree,

    /// On-disk ordered store, survives restarts without replay
    Persistent,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("./caskdb_data"),
            max_segment_size: 256 * 1024 * 1024, // 256 MB
            sync_on_write: false,
            index_type: IndexType::BTree,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(CaskError::InvalidConfiguration(
                "directory path is empty".to_string(),
            ));
        }
        if self.max_segment_size == 0 {
            return Err(CaskError::InvalidConfiguration(
                "max segment size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn dir_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.dir_path = path.into();
        self
    }

    /// Set the segment rollover threshold (in bytes)
    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.config.max_segment_size = size;
        self
    }

    /// Sync the active segment after every write
    pub fn sync_on_write(mut self, sync: bool) -> Self {
        self.config.sync_on_write = sync;
        self
    }

    /// Set the index backend
    pub fn index_type(mut self, index_type: IndexType) -> Self {
        self.config.index_type = index_type;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Configuration for a write batch
#[derive(Debug, Clone, Copy)]
pub struct WriteBatchConfig {
    /// Max number of staged writes a single commit accepts
    pub max_pending_writes: usize,

    /// fsync the active segment once the batch is written
    pub sync_on_commit: bool,
}

impl Default for WriteBatchConfig {
    fn default() -> Self {
        Self {
            max_pending_writes: 10_000,
            sync_on_commit: true,
        }
    }
}

/// Configuration for an iterator
#[derive(Debug, Clone, Default)]
pub struct IteratorConfig {
    /// Walk keys in descending order
    pub reverse: bool,

    /// Only yield keys starting with this prefix (empty = no filter)
    pub prefix: Vec<u8>,
}
