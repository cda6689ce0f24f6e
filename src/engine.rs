//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate the segment set, the record codec, and the index
//! - Handle concurrent read/write access
//! - Rebuild the index on startup by replaying segments
//! - Keep the batch sequence counter strictly increasing across restarts

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::config::{Config, IndexType};
use crate::data::{
    LogRecord, LogRecordType, RecordPosition, Segment, SeqKey, NON_TXN_SEQ_NO, SEQ_NO_FILE_NAME,
};
use crate::error::{CaskError, Result};
use crate::index::{new_indexer, Indexer};
use crate::merge;
use crate::storage::SegmentManager;

/// Key of the single record in the sequence-number file
const SEQ_NO_KEY: &[u8] = b"seq.no";

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (put/delete/batch commit/merge start): take `segments` for
///   writing. The index is updated before the lock is released, so the
///   index order always matches the log order.
/// - **Reads** (get/iterator values): look up the index, then take
///   `segments` for reading only long enough to decode one record.
/// - The index synchronizes itself; it is never guarded by `segments`.
pub struct Engine {
    pub(crate) config: Config,

    /// Active + older segments, rollover, and the merge flag
    pub(crate) segments: RwLock<SegmentManager>,

    /// Real key → position of its latest live record
    pub(crate) index: Box<dyn Indexer>,

    /// Last sequence number handed to a write batch (0 = none yet)
    pub(crate) seq_no: AtomicU64,
}

/// Point-in-time storage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStat {
    /// Live keys in the index
    pub key_count: usize,

    /// Segment files, active included
    pub segment_count: usize,

    /// Bytes used by the data directory on disk
    pub disk_size: u64,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate the config and create the data directory
    /// 2. Adopt the output of a completed merge, if one is waiting
    /// 3. Open every segment (highest id becomes active)
    /// 4. Load the index from the hint file and by replaying segments
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.dir_path)?;

        merge::adopt_merge_output(&config.dir_path)?;
        let index = new_indexer(config.index_type, &config.dir_path)?;
        let segments = SegmentManager::open(&config.dir_path, config.max_segment_size)?;

        let engine = Self {
            config,
            segments: RwLock::new(segments),
            index,
            seq_no: AtomicU64::new(NON_TXN_SEQ_NO),
        };
        engine.load_index()?;

        tracing::info!(
            dir = %engine.config.dir_path.display(),
            keys = engine.index.size(),
            segments = engine.segments.read().segment_count(),
            index = ?engine.config.index_type,
            "engine opened"
        );
        Ok(engine)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().dir_path(path).build())
    }

    // =========================================================================
    // Public Operations
    // =========================================================================

    /// Store `value` under `key`, replacing any previous value
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::EmptyKey);
        }

        let record = LogRecord::normal(SeqKey::new(NON_TXN_SEQ_NO, key).encode(), value.to_vec());

        let mut segments = self.segments.write();
        let pos = self.append_locked(&mut segments, &record)?;
        if !self.index.put(key.to_vec(), pos) {
            return Err(CaskError::IndexUpdateFailed);
        }
        Ok(())
    }

    /// Get the latest value of `key`
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(CaskError::EmptyKey);
        }

        let pos = self.index.get(key).ok_or(CaskError::KeyNotFound)?;
        self.value_at(key, pos)
    }

    /// Remove `key`; deleting an absent key writes nothing
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::EmptyKey);
        }

        let mut segments = self.segments.write();
        if self.index.get(key).is_none() {
            return Ok(());
        }

        let record = LogRecord::deleted(SeqKey::new(NON_TXN_SEQ_NO, key).encode());
        self.append_locked(&mut segments, &record)?;
        if !self.index.delete(key) {
            return Err(CaskError::IndexUpdateFailed);
        }
        Ok(())
    }

    /// Flush the active segment to disk
    pub fn sync(&self) -> Result<()> {
        self.segments.read().sync_active()
    }

    /// Flush everything and persist what the next open needs to skip work
    ///
    /// With the persistent index, the sequence counter is written to the
    /// `seq-no` file so the next open does not have to scan segments for it.
    pub fn close(&self) -> Result<()> {
        self.sync()?;
        if self.config.index_type == IndexType::Persistent {
            save_seq_no(self.dir(), self.seq_no.load(Ordering::SeqCst))?;
        }
        tracing::debug!("engine closed");
        Ok(())
    }

    /// All live keys, ascending
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        let mut iter = self.index.iterator(false);
        let mut keys = Vec::with_capacity(iter.len());
        while let Some(key) = iter.key() {
            keys.push(key.to_vec());
            iter.next();
        }
        keys
    }

    /// Visit every live pair in ascending key order until `f` returns false
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let mut iter = self.index.iterator(false);
        while let (Some(key), Some(pos)) = (iter.key(), iter.value()) {
            let value = self.value_at(key, pos)?;
            if !f(key, &value) {
                break;
            }
            iter.next();
        }
        Ok(())
    }

    pub fn stat(&self) -> Result<EngineStat> {
        Ok(EngineStat {
            key_count: self.index.size(),
            segment_count: self.segments.read().segment_count(),
            disk_size: dir_size(self.dir())?,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn dir(&self) -> &Path {
        &self.config.dir_path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Crate-Internal Write/Read Paths
    // =========================================================================

    /// Append one record under the segments lock
    pub(crate) fn append(&self, record: &LogRecord) -> Result<RecordPosition> {
        let mut segments = self.segments.write();
        self.append_locked(&mut segments, record)
    }

    /// Append with the lock already held, honoring `sync_on_write`
    pub(crate) fn append_locked(
        &self,
        segments: &mut SegmentManager,
        record: &LogRecord,
    ) -> Result<RecordPosition> {
        let pos = segments.append(&record.encode())?;
        if self.config.sync_on_write {
            segments.sync_active()?;
        }
        Ok(pos)
    }

    /// Decode the value `key` has at `pos`
    ///
    /// Anything other than a live `Normal` record for `key` itself reads as
    /// not found.
    pub(crate) fn value_at(&self, key: &[u8], pos: RecordPosition) -> Result<Vec<u8>> {
        let segments = self.segments.read();
        let Some((record, _)) = segments.read_log_record(pos)? else {
            return Err(CaskError::KeyNotFound);
        };
        if record.rec_type != LogRecordType::Normal || SeqKey::decode(&record.key)?.key != key {
            return Err(CaskError::KeyNotFound);
        }
        Ok(record.value)
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Populate the index for a freshly opened segment set
    ///
    /// A persistent store that was closed cleanly is trusted as-is; only
    /// positions inside segments replaced by a merge are moved to their
    /// merged copies. Any other store is cleared and rebuilt, since it may
    /// hold positions past a torn tail or a half-applied batch.
    fn load_index(&self) -> Result<()> {
        let dir = self.dir();
        let boundary = merge::read_merge_boundary(dir)?;
        let saved_seq = take_seq_no(dir)?;

        if self.config.index_type == IndexType::Persistent && self.index.size() > 0 {
            if let Some(seq) = saved_seq {
                if let Some(boundary) = boundary {
                    self.load_hint_file(Some(boundary))?;
                }
                self.seq_no.store(seq, Ordering::SeqCst);
                return Ok(());
            }

            tracing::warn!("persistent index was not closed cleanly, rebuilding");
            if !self.index.clear() {
                return Err(CaskError::IndexUpdateFailed);
            }
        }

        if boundary.is_some() {
            self.load_hint_file(None)?;
        }
        self.replay_segments(boundary)
    }

    /// Scan segments in id order, skipping ids below `skip_below`
    ///
    /// Non-batch records are applied as they are read. Batch records are
    /// staged per sequence number and applied when that sequence's finish
    /// marker shows up; staged records left over at the end belong to
    /// batches that never committed and are dropped. The sequence counter
    /// ends at the highest number seen and the active tail is repaired.
    fn replay_segments(&self, skip_below: Option<u32>) -> Result<()> {
        let mut segments = self.segments.write();
        let active_id = segments.active_id();

        let mut staged: HashMap<u64, Vec<(Vec<u8>, LogRecordType, RecordPosition)>> =
            HashMap::new();
        let mut max_seq = NON_TXN_SEQ_NO;
        let mut replayed = 0usize;

        for id in segments.segment_ids() {
            if skip_below.is_some_and(|boundary| id < boundary) {
                continue;
            }
            let segment = segments.segment(id).ok_or(CaskError::SegmentNotFound(id))?;

            let mut offset = 0u64;
            loop {
                let (record, size) = match segment.read_log_record(offset) {
                    Ok(Some(found)) => found,
                    Ok(None) => break,
                    Err(err @ CaskError::ChecksumMismatch { .. }) => {
                        tracing::warn!(error = %err, "stopping replay at corrupt record");
                        break;
                    }
                    Err(err) => return Err(err),
                };
                let pos = RecordPosition::new(id, offset);
                offset += size;
                replayed += 1;

                let seq_key = SeqKey::decode(&record.key)?;
                max_seq = max_seq.max(seq_key.seq_no);

                if seq_key.seq_no == NON_TXN_SEQ_NO {
                    self.apply_replayed(seq_key.key, record.rec_type, pos)?;
                } else if record.rec_type == LogRecordType::TxnFinished {
                    for (key, rec_type, pos) in staged.remove(&seq_key.seq_no).unwrap_or_default()
                    {
                        self.apply_replayed(key, rec_type, pos)?;
                    }
                } else {
                    staged
                        .entry(seq_key.seq_no)
                        .or_default()
                        .push((seq_key.key, record.rec_type, pos));
                }
            }

            if Some(id) == active_id {
                if let Some(active) = segments.active_mut() {
                    let size = active.size()?;
                    if size > offset {
                        tracing::warn!(
                            segment_id = id,
                            valid_len = offset,
                            file_len = size,
                            "truncating torn tail of active segment"
                        );
                        active.truncate(offset)?;
                    }
                }
            }
        }

        if !staged.is_empty() {
            tracing::warn!(
                batches = staged.len(),
                "discarding uncommitted write batches"
            );
        }

        self.seq_no.store(max_seq, Ordering::SeqCst);
        tracing::debug!(records = replayed, seq_no = max_seq, "segment replay complete");
        Ok(())
    }

    fn apply_replayed(
        &self,
        key: Vec<u8>,
        rec_type: LogRecordType,
        pos: RecordPosition,
    ) -> Result<()> {
        match rec_type {
            LogRecordType::Normal => {
                if !self.index.put(key, pos) {
                    return Err(CaskError::IndexUpdateFailed);
                }
            }
            LogRecordType::Deleted => {
                self.index.delete(&key);
            }
            LogRecordType::TxnFinished => {}
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Parse a record value holding a decimal number
pub(crate) fn parse_decimal<T: FromStr>(bytes: &[u8]) -> Result<T> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            CaskError::Serialization(format!(
                "expected a decimal number, got {:?}",
                String::from_utf8_lossy(bytes)
            ))
        })
}

/// Read and remove the saved sequence counter
fn take_seq_no(dir: &Path) -> Result<Option<u64>> {
    let path = dir.join(SEQ_NO_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let seq = {
        let file = Segment::open_seq_no_file(dir)?;
        match file.read_log_record(0)? {
            Some((record, _)) => Some(parse_decimal(&record.value)?),
            None => None,
        }
    };
    fs::remove_file(&path)?;
    Ok(seq)
}

fn save_seq_no(dir: &Path, seq: u64) -> Result<()> {
    let path = dir.join(SEQ_NO_FILE_NAME);
    if path.exists() {
        fs::remove_file(&path)?;
    }

    let mut file = Segment::open_seq_no_file(dir)?;
    let record = LogRecord::normal(SEQ_NO_KEY.to_vec(), seq.to_string().into_bytes());
    file.write(&record.encode())?;
    file.sync()
}

/// Total size of all files under `dir`
fn dir_size(dir: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}
