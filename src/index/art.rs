//! Adaptive radix tree index

use parking_lot::RwLock;

use crate::data::RecordPosition;

use super::radix::RadixTree;
use super::{IndexIterator, IndexUpdate, Indexer};

/// In-memory radix-tree index, rebuilt from the log on every open
///
/// Shares long key prefixes between entries, which keeps memory down for
/// keyspaces like `user:{id}:...`.
#[derive(Default)]
pub struct ArtIndex {
    tree: RwLock<RadixTree<RecordPosition>>,
}

impl ArtIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for ArtIndex {
    fn put(&self, key: Vec<u8>, pos: RecordPosition) -> bool {
        self.tree.write().insert(&key, pos);
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
                    tree.insert(&key, pos);
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
        let mut items = self.tree.read().entries();
        if reverse {
            items.reverse();
        }
        IndexIterator::new(items, reverse)
    }

    fn size(&self) -> usize {
        self.tree.read().len()
    }
}
