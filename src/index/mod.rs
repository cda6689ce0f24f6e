//! Index Module
//!
//! Ordered map from user key to the position of its latest record.
//!
//! ## Responsibilities
//! - One capability contract ([`Indexer`]) shared by every backend
//! - Point lookups for `get`, updates on every durable put/delete
//! - Ordered snapshots for iteration
//!
//! ## Backends
//! - [`BTreeIndex`]: `BTreeMap` behind a `RwLock`, rebuilt on open
//! - [`ArtIndex`]: adaptive radix tree behind a `RwLock`, rebuilt on open
//! - [`PersistentIndex`]: LMDB store inside the data directory

mod art;
mod btree;
mod persistent;
pub mod radix;

use std::path::Path;

use crate::config::IndexType;
use crate::data::RecordPosition;
use crate::error::Result;

pub use art::ArtIndex;
pub use btree::BTreeIndex;
pub use persistent::{PersistentIndex, PERSISTENT_INDEX_DIR};

/// One staged index change: the key's new position, or `None` to remove it
pub type IndexUpdate = (Vec<u8>, Option<RecordPosition>);

/// Key → position map every backend implements
///
/// Implementations synchronize internally; callers never hold a lock
/// around these calls on their behalf.
pub trait Indexer: Send + Sync {
    /// Insert or overwrite; `false` means the backend refused the update
    fn put(&self, key: Vec<u8>, pos: RecordPosition) -> bool;

    fn get(&self, key: &[u8]) -> Option<RecordPosition>;

    /// Remove a key; `true` iff it was present
    fn delete(&self, key: &[u8]) -> bool;

    /// Apply every update or none of them
    fn apply_batch(&self, updates: Vec<IndexUpdate>) -> bool;

    /// Remove every entry
    fn clear(&self) -> bool;

    /// Ordered snapshot of the current entries
    fn iterator(&self, reverse: bool) -> IndexIterator;

    fn size(&self) -> usize;
}

/// Construct the backend selected in the config
pub fn new_indexer(index_type: IndexType, dir: &Path) -> Result<Box<dyn Indexer>> {
    Ok(match index_type {
        IndexType::BTree => Box::new(BTreeIndex::new()),
        IndexType::AdaptiveRadixTree => Box::new(ArtIndex::new()),
        IndexType::Persistent => Box::new(PersistentIndex::open(dir)?),
    })
}

// =============================================================================
// Snapshot Iterator
// =============================================================================

/// Cursor over a point-in-time copy of an index
///
/// Entries are held in iteration order: ascending keys, or descending
/// when `reverse` is set. Later index mutations are not visible.
pub struct IndexIterator {
    items: Vec<(Vec<u8>, RecordPosition)>,
    cursor: usize,
    reverse: bool,
}

impl IndexIterator {
    /// `items` must already be sorted in iteration order
    pub fn new(items: Vec<(Vec<u8>, RecordPosition)>, reverse: bool) -> Self {
        Self {
            items,
            cursor: 0,
            reverse,
        }
    }

    /// Back to the first entry
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// First entry >= `key` (ascending) or <= `key` (descending)
    pub fn seek(&mut self, key: &[u8]) {
        self.cursor = if self.reverse {
            self.items.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.items.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) {
        if self.cursor < self.items.len() {
            self.cursor += 1;
        }
    }

    pub fn valid(&self) -> bool {
        self.cursor < self.items.len()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.items.get(self.cursor).map(|(k, _)| k.as_slice())
    }

    pub fn value(&self) -> Option<RecordPosition> {
        self.items.get(self.cursor).map(|(_, pos)| *pos)
    }

    /// Release the snapshot
    pub fn close(&mut self) {
        self.items = Vec::new();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
