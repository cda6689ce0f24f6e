//! Iterator Module
//!
//! Ordered traversal over a snapshot of the index, with values read back
//! from the segments on demand.

use crate::config::IteratorConfig;
use crate::engine::Engine;
use crate::error::{CaskError, Result};
use crate::index::IndexIterator;

/// Cursor over the live keys of an engine
///
/// Keys come from an index snapshot taken at creation; writes made after
/// that are not visible. Values are read when asked for, so a key removed
/// and merged away in the meantime can surface as `KeyNotFound`.
pub struct DbIterator<'a> {
    index_iter: IndexIterator,
    engine: &'a Engine,
    config: IteratorConfig,
}

impl Engine {
    /// Iterator positioned at the first key matching `config.prefix`
    pub fn new_iterator(&self, config: IteratorConfig) -> DbIterator<'_> {
        let index_iter = self.index.iterator(config.reverse);
        let mut iter = DbIterator {
            index_iter,
            engine: self,
            config,
        };
        iter.skip_to_next();
        iter
    }
}

impl DbIterator<'_> {
    /// Back to the first matching entry
    pub fn rewind(&mut self) {
        self.index_iter.rewind();
        self.skip_to_next();
    }

    /// First matching entry >= `key`, or <= `key` when reversed
    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
        self.skip_to_next();
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) {
        self.index_iter.next();
        self.skip_to_next();
    }

    pub fn valid(&self) -> bool {
        self.index_iter.valid()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.index_iter.key()
    }

    /// Read the current entry's value from disk
    pub fn value(&self) -> Result<Vec<u8>> {
        let (Some(key), Some(pos)) = (self.index_iter.key(), self.index_iter.value()) else {
            return Err(CaskError::KeyNotFound);
        };
        self.engine.value_at(key, pos)
    }

    /// Drop the snapshot; the iterator is invalid afterwards
    pub fn close(&mut self) {
        self.index_iter.close();
    }

    /// Advance past entries outside the configured prefix
    fn skip_to_next(&mut self) {
        if self.config.prefix.is_empty() {
            return;
        }
        while let Some(key) = self.index_iter.key() {
            if key.starts_with(&self.config.prefix) {
                break;
            }
            self.index_iter.next();
        }
    }
}
