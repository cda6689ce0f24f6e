//! Merge Module
//!
//! Compacts older segments by rewriting only their live records.
//!
//! ## Responsibilities
//! - Swap in a fresh active segment and fix the merge boundary
//! - Rewrite live records into a nested engine in `<dir>-merge`
//! - Emit a hint file and a merge-finished marker
//! - Adopt completed merge output on the next open
//!
//! ## Merge Directory Layout
//! ```text
//! <dir>-merge/
//! ├── 000000000.data   rewritten live records (sequence number 0)
//! ├── hint-index       real key → position in the files above
//! └── merge-finished   boundary id; written last, absent = incomplete
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::{Config, IndexType};
use crate::data::{
    segment_path, LogRecord, RecordPosition, Segment, SeqKey, HINT_FILE_NAME,
    MERGE_FINISHED_FILE_NAME, NON_TXN_SEQ_NO,
};
use crate::engine::{parse_decimal, Engine};
use crate::error::{CaskError, Result};
use crate::storage::SegmentManager;

/// Key of the single record in the merge-finished marker
const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

/// Clears the merge flag however the merge pass ends
struct MergeGuard<'a> {
    segments: &'a RwLock<SegmentManager>,
}

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.segments.write().set_merging(false);
    }
}

impl Engine {
    /// Rewrite the live records of every older segment
    ///
    /// Steps:
    /// 1. Under the lock: reject a concurrent merge, retire the active
    ///    segment, record the new active id as the boundary, snapshot the
    ///    older segments
    /// 2. Without the lock: copy each record whose index position still
    ///    points at it into the nested engine, writing a hint entry per copy
    /// 3. Sync the output and write the merge-finished marker
    ///
    /// The merged files replace the originals on the next open.
    pub fn merge(&self) -> Result<()> {
        let (boundary, eligible) = {
            let mut segments = self.segments.write();
            if segments.is_merging() {
                return Err(CaskError::MergeInProgress);
            }
            if segments.active().is_none() {
                return Ok(());
            }

            segments.set_merging(true);
            let boundary = match segments.rotate() {
                Ok(id) => id,
                Err(e) => {
                    segments.set_merging(false);
                    return Err(e);
                }
            };
            (boundary, segments.older_segments())
        };
        let _guard = MergeGuard {
            segments: &self.segments,
        };

        let merge_dir = merge_path(self.dir());
        if merge_dir.exists() {
            fs::remove_dir_all(&merge_dir)?;
        }
        fs::create_dir_all(&merge_dir)?;

        info!(
            boundary,
            segments = eligible.len(),
            dir = %merge_dir.display(),
            "merge started"
        );

        let nested = Engine::open(Config {
            dir_path: merge_dir.clone(),
            max_segment_size: self.config.max_segment_size,
            sync_on_write: false,
            index_type: IndexType::BTree,
        })?;
        let mut hint = Segment::open_hint_file(&merge_dir)?;

        let mut kept = 0usize;
        let mut dropped = 0usize;
        for segment in &eligible {
            let mut offset = 0u64;
            loop {
                let (record, size) = match segment.read_log_record(offset) {
                    Ok(Some(found)) => found,
                    Ok(None) => break,
                    Err(err @ CaskError::ChecksumMismatch { .. }) => {
                        warn!(error = %err, "merge stopping at corrupt record");
                        break;
                    }
                    Err(err) => return Err(err),
                };
                let pos = RecordPosition::new(segment.id(), offset);
                offset += size;

                // The index only ever points at live Normal records
                let SeqKey { key, .. } = SeqKey::decode(&record.key)?;
                if self.index.get(&key) != Some(pos) {
                    dropped += 1;
                    continue;
                }

                let rewritten =
                    LogRecord::normal(SeqKey::new(NON_TXN_SEQ_NO, key.as_slice()).encode(), record.value);
                let new_pos = nested.append(&rewritten)?;
                hint.write_hint_record(&key, new_pos)?;
                kept += 1;
            }
        }

        hint.sync()?;
        nested.sync()?;

        // Merged files must never collide with segments written after the boundary
        let last_merged = nested.segments.read().active_id();
        if last_merged.is_some_and(|id| id >= boundary) {
            warn!(boundary, ?last_merged, "merge output does not fit below boundary, discarding");
            drop(hint);
            drop(nested);
            fs::remove_dir_all(&merge_dir)?;
            return Ok(());
        }

        let mut marker = Segment::open_merge_finished_file(&merge_dir)?;
        let record = LogRecord::normal(
            MERGE_FINISHED_KEY.to_vec(),
            boundary.to_string().into_bytes(),
        );
        marker.write(&record.encode())?;
        marker.sync()?;

        info!(boundary, kept, dropped, "merge finished");
        Ok(())
    }

    /// Load `hint-index` from the data directory into the index
    ///
    /// With `only_below` set, an entry is applied only where the index
    /// currently points into a segment below that id, i.e. into a segment
    /// the merge replaced. Returns the number of entries applied.
    pub(crate) fn load_hint_file(&self, only_below: Option<u32>) -> Result<usize> {
        let dir = self.dir();
        if !dir.join(HINT_FILE_NAME).exists() {
            return Ok(0);
        }

        let hint = Segment::open_hint_file(dir)?;
        let mut offset = 0u64;
        let mut loaded = 0usize;
        while let Some((record, size)) = hint.read_log_record(offset)? {
            offset += size;
            let pos = RecordPosition::decode(&record.value)?;

            if let Some(boundary) = only_below {
                match self.index.get(&record.key) {
                    Some(current) if current.segment_id < boundary => {}
                    _ => continue,
                }
            }

            if !self.index.put(record.key, pos) {
                return Err(CaskError::IndexUpdateFailed);
            }
            loaded += 1;
        }

        debug!(entries = loaded, "loaded hint file");
        Ok(loaded)
    }
}

// =============================================================================
// Merge Directory Handling
// =============================================================================

/// `<parent>/<name>-merge` for a data directory `<parent>/<name>`
pub fn merge_path(dir: &Path) -> PathBuf {
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.with_file_name(format!("{}-merge", name))
}

/// Boundary recorded by the merge-finished marker in `dir`, if any
pub fn read_merge_boundary(dir: &Path) -> Result<Option<u32>> {
    if !dir.join(MERGE_FINISHED_FILE_NAME).exists() {
        return Ok(None);
    }

    let marker = Segment::open_merge_finished_file(dir)?;
    match marker.read_log_record(0)? {
        Some((record, _)) => Ok(Some(parse_decimal(&record.value)?)),
        None => Ok(None),
    }
}

/// Move completed merge output into `dir`
///
/// Returns the merge boundary when output was adopted. A merge directory
/// without a finished marker is removed and ignored.
///
/// Order:
/// 1. Delete original segments below the boundary
/// 2. Move merged segments and the hint file in
/// 3. Move the marker in last, then remove the merge directory
pub fn adopt_merge_output(dir: &Path) -> Result<Option<u32>> {
    let merge_dir = merge_path(dir);
    if !merge_dir.is_dir() {
        return Ok(None);
    }

    let Some(boundary) = read_merge_boundary(&merge_dir)? else {
        warn!(dir = %merge_dir.display(), "discarding incomplete merge directory");
        fs::remove_dir_all(&merge_dir)?;
        return Ok(None);
    };

    for id in SegmentManager::discover_segment_ids(dir)? {
        if id < boundary {
            fs::remove_file(segment_path(dir, id))?;
        }
    }

    let mut moved = 0usize;
    for entry in fs::read_dir(&merge_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() || entry.file_name() == MERGE_FINISHED_FILE_NAME {
            continue;
        }
        fs::rename(entry.path(), dir.join(entry.file_name()))?;
        moved += 1;
    }
    fs::rename(
        merge_dir.join(MERGE_FINISHED_FILE_NAME),
        dir.join(MERGE_FINISHED_FILE_NAME),
    )?;
    fs::remove_dir_all(&merge_dir)?;

    info!(boundary, files = moved, "adopted merge output");
    Ok(Some(boundary))
}
