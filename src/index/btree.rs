//! Balanced-tree index
//!
//! `BTreeMap`-based index with a `RwLock` for concurrency.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::data::RecordPosition;

use super::{IndexIterator, IndexUpdate, Indexer};

/// In-memory ordered index, rebuilt from the log on every open
#[derive(Default)]
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, RecordPosition>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Vec<u8>, pos: RecordPosition) -> bool {
        self.tree.write().insert(key, pos);
        true
    }

    fn get(&self, key: &[u8]) -> Option<RecordPosition> {
        self.tree.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.tree.write().remove(key).is_some()
    }

    fn apply_batch(&self, updates: Vec<IndexUpdate>) -> bool {
        let mut tree = self.tree.write();
        for (key, pos) in updates {
            match pos {
                Some(pos) => {
                    tree.insert(key, pos);
                }
                None => {
                    tree.remove(&key);
                }
            }
        }
        true
    }

    fn clear(&self) -> bool {
        *self.tree.write() = Default::default();
        true
    }

    fn iterator(&self, reverse: bool) -> IndexIterator {
        let tree = self.tree.read();
        let items: Vec<_> = if reverse {
            tree.iter().rev().map(|(k, p)| (k.clone(), *p)).collect()
        } else {
            tree.iter().map(|(k, p)| (k.clone(), *p)).collect()
        };
        IndexIterator::new(items, reverse)
    }

    fn size(&self) -> usize {
        self.tree.read().len()
    }
}
