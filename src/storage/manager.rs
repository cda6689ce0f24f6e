//! Segment Manager
//!
//! Owns the active segment and the set of older segments.
//!
//! ## Responsibilities
//! - Discover existing segments on startup
//! - Append encoded records, rolling over when a segment would overflow
//! - Resolve a record position to its segment
//! - Hand out snapshots of older segments for merging

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::data::{LogRecord, RecordPosition, Segment, SEGMENT_FILE_SUFFIX};
use crate::error::{CaskError, Result};

/// Manages the segment set of one data directory
///
/// ## Concurrency:
/// Not internally synchronized. The engine wraps it in a single `RwLock`
/// so rollover, the older-segment set, and the active write offset always
/// change together.
pub struct SegmentManager {
    /// Directory holding the segment files
    dir: PathBuf,

    /// Rollover threshold in bytes
    max_segment_size: u64,

    /// The only appendable segment; `None` until the first write
    active: Option<Segment>,

    /// Retired, append-immutable segments keyed by id
    older: BTreeMap<u32, Arc<Segment>>,

    /// Set while a merge pass owns a snapshot of the older segments
    merging: bool,
}

impl SegmentManager {
    /// Open every segment in `dir`
    ///
    /// On startup:
    /// 1. Discover segment files by suffix
    /// 2. Sort ids ascending
    /// 3. Highest id becomes active, the rest become older
    pub fn open(dir: &Path, max_segment_size: u64) -> Result<Self> {
        let ids = Self::discover_segment_ids(dir)?;

        let mut active = None;
        let mut older = BTreeMap::new();
        for (idx, &id) in ids.iter().enumerate() {
            let segment = Segment::open(dir, id)?;
            if idx == ids.len() - 1 {
                active = Some(segment);
            } else {
                older.insert(id, Arc::new(segment));
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            max_segment_size,
            active,
            older,
            merging: false,
        })
    }

    /// List segment ids in `dir`, ascending
    ///
    /// "000000042.data" → 42. A segment-suffixed name that is not a number
    /// means someone else has been writing into the directory.
    pub fn discover_segment_ids(dir: &Path) -> Result<Vec<u32>> {
        let mut ids = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(SEGMENT_FILE_SUFFIX) {
                let id = stem.parse::<u32>().map_err(|_| {
                    CaskError::DirectoryCorrupt(format!("unexpected segment file name: {}", name))
                })?;
                ids.push(id);
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append one encoded record to the active segment
    ///
    /// Rolls over first if the record would push the active segment past
    /// the size limit. An empty segment always accepts the record, so an
    /// oversized record cannot loop forever.
    pub fn append(&mut self, encoded: &[u8]) -> Result<RecordPosition> {
        let len = encoded.len() as u64;
        let needs_rollover = match &self.active {
            Some(active) => {
                active.write_offset() > 0 && active.write_offset() + len > self.max_segment_size
            }
            None => true,
        };
        if needs_rollover {
            self.rotate()?;
        }

        let Some(active) = self.active.as_mut() else {
            return Err(CaskError::SegmentNotFound(self.next_segment_id()));
        };
        let offset = active.write(encoded)?;
        Ok(RecordPosition::new(active.id(), offset))
    }

    /// Retire the active segment (if any) and open the next one
    ///
    /// Returns the id of the new active segment.
    pub fn rotate(&mut self) -> Result<u32> {
        if let Some(active) = &self.active {
            active.sync()?;
        }

        let next_id = self.next_segment_id();
        let fresh = Segment::open(&self.dir, next_id)?;

        if let Some(retired) = self.active.replace(fresh) {
            self.older.insert(retired.id(), Arc::new(retired));
        }

        debug!(segment_id = next_id, "opened new active segment");
        Ok(next_id)
    }

    /// Flush the active segment to disk
    pub fn sync_active(&self) -> Result<()> {
        match &self.active {
            Some(active) => active.sync(),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up a segment by id (active or older)
    pub fn segment(&self, id: u32) -> Option<&Segment> {
        match &self.active {
            Some(active) if active.id() == id => Some(active),
            _ => self.older.get(&id).map(|s| s.as_ref()),
        }
    }

    /// Decode the record at `pos`
    pub fn read_log_record(&self, pos: RecordPosition) -> Result<Option<(LogRecord, u64)>> {
        let segment = self
            .segment(pos.segment_id)
            .ok_or(CaskError::SegmentNotFound(pos.segment_id))?;
        segment.read_log_record(pos.offset)
    }

    /// All segment ids, ascending
    pub fn segment_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.older.keys().copied().collect();
        if let Some(active) = &self.active {
            ids.push(active.id());
        }
        ids
    }

    /// Older segments, ascending by id
    pub fn older_segments(&self) -> Vec<Arc<Segment>> {
        self.older.values().cloned().collect()
    }

    pub fn active(&self) -> Option<&Segment> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut Segment> {
        self.active.as_mut()
    }

    pub fn active_id(&self) -> Option<u32> {
        self.active.as_ref().map(Segment::id)
    }

    pub fn segment_count(&self) -> usize {
        self.older.len() + usize::from(self.active.is_some())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Merge Flag
    // =========================================================================

    pub fn is_merging(&self) -> bool {
        self.merging
    }

    pub fn set_merging(&mut self, merging: bool) {
        self.merging = merging;
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// max(existing ids) + 1, or 0 for an empty directory
    fn next_segment_id(&self) -> u32 {
        let highest_older = self.older.keys().next_back().copied();
        let highest = self.active_id().max(highest_older);
        highest.map(|id| id + 1).unwrap_or(0)
    }
}
