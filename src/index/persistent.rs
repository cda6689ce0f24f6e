//! LMDB-backed persistent index
//!
//! Lives in `index-store/` inside the data directory and survives restarts,
//! so an engine opened over a populated store can skip log replay.

use std::fs;
use std::path::Path;

use heed::types::{Bytes, SerdeBincode};
use heed::{Database, Env, EnvOpenOptions};
use tracing::error;

use crate::data::RecordPosition;
use crate::error::Result;

use super::{IndexIterator, IndexUpdate, Indexer};

/// Subdirectory of the data directory holding the LMDB environment
pub const PERSISTENT_INDEX_DIR: &str = "index-store";

const INDEX_DB_NAME: &str = "caskdb-index";

/// Upper bound on the memory map; LMDB only touches pages it uses
const MAP_SIZE: usize = 1024 * 1024 * 1024;

/// Index stored in an on-disk B+tree
pub struct PersistentIndex {
    env: Env,
    db: Database<Bytes, SerdeBincode<RecordPosition>>,
}

impl PersistentIndex {
    /// Open (or create) the store under `dir/index-store`
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(PERSISTENT_INDEX_DIR);
        fs::create_dir_all(&path)?;

        // SAFETY: the store directory is private to this engine and only
        // ever mapped through this type.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAP_SIZE)
                .max_dbs(1)
                .open(&path)?
        };

        let mut txn = env.write_txn()?;
        let db = env.create_database(&mut txn, Some(INDEX_DB_NAME))?;
        txn.commit()?;

        Ok(Self { env, db })
    }

    // =========================================================================
    // Fallible Operations
    // =========================================================================

    pub fn try_put(&self, key: &[u8], pos: RecordPosition) -> Result<()> {
        let mut txn = self.env.write_txn()?;
        self.db.put(&mut txn, key, &pos)?;
        txn.commit()?;
        Ok(())
    }

    /// Apply all updates in a single write transaction
    pub fn try_apply_batch(&self, updates: &[IndexUpdate]) -> Result<()> {
        let mut txn = self.env.write_txn()?;
        for (key, pos) in updates {
            match pos {
                Some(pos) => self.db.put(&mut txn, key.as_slice(), pos)?,
                None => {
                    self.db.delete(&mut txn, key.as_slice())?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn try_clear(&self) -> Result<()> {
        let mut txn = self.env.write_txn()?;
        self.db.clear(&mut txn)?;
        txn.commit()?;
        Ok(())
    }

    pub fn try_get(&self, key: &[u8]) -> Result<Option<RecordPosition>> {
        let txn = self.env.read_txn()?;
        Ok(self.db.get(&txn, key)?)
    }

    pub fn try_delete(&self, key: &[u8]) -> Result<bool> {
        let mut txn = self.env.write_txn()?;
        let existed = self.db.delete(&mut txn, key)?;
        txn.commit()?;
        Ok(existed)
    }

    pub fn try_snapshot(&self, reverse: bool) -> Result<Vec<(Vec<u8>, RecordPosition)>> {
        let txn = self.env.read_txn()?;
        let mut items = Vec::new();
        if reverse {
            for entry in self.db.rev_iter(&txn)? {
                let (key, pos) = entry?;
                items.push((key.to_vec(), pos));
            }
        } else {
            for entry in self.db.iter(&txn)? {
                let (key, pos) = entry?;
                items.push((key.to_vec(), pos));
            }
        }
        Ok(items)
    }

    pub fn try_len(&self) -> Result<u64> {
        let txn = self.env.read_txn()?;
        Ok(self.db.len(&txn)?)
    }
}

impl Indexer for PersistentIndex {
    fn put(&self, key: Vec<u8>, pos: RecordPosition) -> bool {
        match self.try_put(&key, pos) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "persistent index put failed");
                false
            }
        }
    }

    fn get(&self, key: &[u8]) -> Option<RecordPosition> {
        self.try_get(key).unwrap_or_else(|e| {
            error!(error = %e, "persistent index get failed");
            None
        })
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.try_delete(key).unwrap_or_else(|e| {
            error!(error = %e, "persistent index delete failed");
            false
        })
    }

    fn apply_batch(&self, updates: Vec<IndexUpdate>) -> bool {
        match self.try_apply_batch(&updates) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, updates = updates.len(), "persistent index batch failed");
                false
            }
        }
    }

    fn clear(&self) -> bool {
        match self.try_clear() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "persistent index clear failed");
                false
            }
        }
    }

    fn iterator(&self, reverse: bool) -> IndexIterator {
        let items = self.try_snapshot(reverse).unwrap_or_else(|e| {
            error!(error = %e, "persistent index snapshot failed");
            Vec::new()
        });
        IndexIterator::new(items, reverse)
    }

    fn size(&self) -> usize {
        self.try_len().map(|n| n as usize).unwrap_or_else(|e| {
            error!(error = %e, "persistent index length failed");
            0
        })
    }
}
