//! Write Batch Module
//!
//! Stages puts and deletes and commits them atomically.
//!
//! ## Commit Layout
//! ```text
//! ┌────────────────────┬────────────────────┬─────┬─────────────────────────┐
//! │ seq=N key1 (put)   │ seq=N key2 (del)   │ ... │ seq=N "txn-fin" (fin)   │
//! └────────────────────┴────────────────────┴─────┴─────────────────────────┘
//! ```
//! Recovery applies the records of sequence N only once it reads the
//! finish record, so a crash mid-commit leaves none of them visible.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::config::WriteBatchConfig;
use crate::data::{LogRecord, LogRecordType, SeqKey, TXN_FIN_KEY};
use crate::engine::Engine;
use crate::error::{CaskError, Result};
use crate::index::IndexUpdate;

/// Grouped mutations against one engine
///
/// Nothing reaches the log or the index until [`WriteBatch::commit`].
pub struct WriteBatch<'a> {
    config: WriteBatchConfig,

    /// Real key → staged record, last staging wins
    pending: Mutex<BTreeMap<Vec<u8>, LogRecord>>,

    engine: &'a Engine,
}

impl Engine {
    /// Start a new, empty batch
    pub fn new_write_batch(&self, config: WriteBatchConfig) -> Result<WriteBatch<'_>> {
        if config.max_pending_writes == 0 {
            return Err(CaskError::InvalidConfiguration(
                "max_pending_writes must be positive".to_string(),
            ));
        }
        Ok(WriteBatch {
            config,
            pending: Mutex::new(BTreeMap::new()),
            engine: self,
        })
    }
}

impl WriteBatch<'_> {
    /// Stage a put
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::EmptyKey);
        }

        let record = LogRecord::normal(key.to_vec(), value.to_vec());
        self.pending.lock().insert(key.to_vec(), record);
        Ok(())
    }

    /// Stage a delete
    ///
    /// A key unknown to both the engine and this batch is ignored. A key
    /// that only exists in this batch is simply unstaged.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::EmptyKey);
        }

        let mut pending = self.pending.lock();
        if self.engine.index.get(key).is_none() {
            pending.remove(key);
            return Ok(());
        }

        pending.insert(key.to_vec(), LogRecord::deleted(key.to_vec()));
        Ok(())
    }

    /// Number of staged writes
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Write every staged record plus a finish record, then publish them
    ///
    /// Steps:
    /// 1. Take the engine's segments lock
    /// 2. Allocate the next sequence number
    /// 3. Append each staged record under that sequence number
    /// 4. Append the finish record and optionally sync
    /// 5. Apply the staged writes to the index as one update and clear the batch
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.config.max_pending_writes {
            return Err(CaskError::BatchTooLarge {
                pending: pending.len(),
                max: self.config.max_pending_writes,
            });
        }

        let engine = self.engine;
        let mut segments = engine.segments.write();
        let seq_no = engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut positions = Vec::with_capacity(pending.len());
        for (key, staged) in pending.iter() {
            let record = LogRecord {
                key: SeqKey::new(seq_no, key.as_slice()).encode(),
                value: staged.value.clone(),
                rec_type: staged.rec_type,
            };
            positions.push(segments.append(&record.encode())?);
        }

        let finished = LogRecord::txn_finished(SeqKey::new(seq_no, TXN_FIN_KEY).encode());
        segments.append(&finished.encode())?;

        if self.config.sync_on_commit {
            segments.sync_active()?;
        }

        // All of the batch becomes visible in one index update
        let updates: Vec<IndexUpdate> = pending
            .iter()
            .zip(positions)
            .filter_map(|((key, staged), pos)| match staged.rec_type {
                LogRecordType::Normal => Some((key.clone(), Some(pos))),
                LogRecordType::Deleted => Some((key.clone(), None)),
                LogRecordType::TxnFinished => None,
            })
            .collect();
        if !engine.index.apply_batch(updates) {
            return Err(CaskError::IndexUpdateFailed);
        }
        drop(segments);

        tracing::debug!(seq_no, writes = pending.len(), "write batch committed");
        pending.clear();
        Ok(())
    }
}
