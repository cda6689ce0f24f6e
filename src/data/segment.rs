//! Segment file
//!
//! One append-only file of log records. The same type backs data segments,
//! the merge hint file, the merge-finished marker, and the sequence-number file.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{CaskError, Result};
use crate::fio::{new_io_manager, IoManager};

use super::log_record::{
    record_checksum, LogRecord, LogRecordHeader, LogRecordType, RecordPosition, CRC_SIZE,
    MAX_HEADER_SIZE,
};

// =============================================================================
// File Naming
// =============================================================================

/// Suffix shared by every data segment
pub const SEGMENT_FILE_SUFFIX: &str = ".data";

/// Key → position records produced by merge
pub const HINT_FILE_NAME: &str = "hint-index";

/// Single record holding the first segment id a merge did not cover
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";

/// Sequence counter saved on clean close (persistent index only)
pub const SEQ_NO_FILE_NAME: &str = "seq-no";

/// "000000042.data"
pub fn segment_file_name(id: u32) -> String {
    format!("{:09}{}", id, SEGMENT_FILE_SUFFIX)
}

pub fn segment_path(dir: &Path, id: u32) -> PathBuf {
    dir.join(segment_file_name(id))
}

// =============================================================================
// Segment
// =============================================================================

/// An append-only file of encoded log records
pub struct Segment {
    id: u32,
    path: PathBuf,
    /// Where the next append lands
    write_offset: u64,
    io: Box<dyn IoManager>,
}

impl Segment {
    /// Open or create data segment `id` in `dir`
    pub fn open(dir: &Path, id: u32) -> Result<Self> {
        Self::open_at(segment_path(dir, id), id)
    }

    pub fn open_hint_file(dir: &Path) -> Result<Self> {
        Self::open_at(dir.join(HINT_FILE_NAME), 0)
    }

    pub fn open_merge_finished_file(dir: &Path) -> Result<Self> {
        Self::open_at(dir.join(MERGE_FINISHED_FILE_NAME), 0)
    }

    pub fn open_seq_no_file(dir: &Path) -> Result<Self> {
        Self::open_at(dir.join(SEQ_NO_FILE_NAME), 0)
    }

    fn open_at(path: PathBuf, id: u32) -> Result<Self> {
        let io = new_io_manager(&path)?;
        Self::with_io(path, id, io)
    }

    /// Wrap an already opened I/O manager
    pub(crate) fn with_io(path: PathBuf, id: u32, io: Box<dyn IoManager>) -> Result<Self> {
        let write_offset = io.size()?;
        Ok(Self {
            id,
            path,
            write_offset,
            io,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_offset(&self) -> u64 {
        self.write_offset
    }

    pub fn set_write_offset(&mut self, offset: u64) {
        self.write_offset = offset;
    }

    /// Append raw bytes, returning the offset they were written at
    ///
    /// A failed append is cut back off the file so the next one still
    /// starts at the current write offset.
    pub fn write(&mut self, buf: &[u8]) -> Result<u64> {
        let offset = self.write_offset;
        match self.io.write(buf) {
            Ok(n) => {
                self.write_offset += n as u64;
                Ok(offset)
            }
            Err(err) => {
                if let Err(cut_err) = self.io.truncate(offset) {
                    warn!(
                        path = %self.path.display(),
                        error = %cut_err,
                        "could not drop partial append"
                    );
                    self.write_offset = self.io.size().unwrap_or(offset);
                }
                Err(err)
            }
        }
    }

    /// Append a `key → position` record (hint file format)
    pub fn write_hint_record(&mut self, key: &[u8], pos: RecordPosition) -> Result<()> {
        let record = LogRecord::normal(key.to_vec(), pos.encode()?);
        self.write(&record.encode())?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    pub fn size(&self) -> Result<u64> {
        self.io.size()
    }

    /// Drop everything past `len` and move the write offset there
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.io.truncate(len)?;
        self.write_offset = len;
        Ok(())
    }

    /// Read the record starting at `offset`
    ///
    /// Returns:
    /// - `Ok(Some((record, size)))`: a verified record and its encoded size
    /// - `Ok(None)`: end of log: past EOF, a zeroed header, or a record cut
    ///   short by the end of the file
    /// - `Err(ChecksumMismatch)`: the bytes are there but fail verification
    pub fn read_log_record(&self, offset: u64) -> Result<Option<(LogRecord, u64)>> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Ok(None);
        }

        // Header window: never read past EOF
        let window = (MAX_HEADER_SIZE as u64).min(file_size - offset) as usize;
        let mut header_buf = vec![0u8; window];
        let n = self.io.read(&mut header_buf, offset)?;
        header_buf.truncate(n);

        let Some((header, header_len)) = LogRecordHeader::decode(&header_buf) else {
            if header_buf.len() < MAX_HEADER_SIZE {
                return Ok(None);
            }
            return Err(self.checksum_mismatch(offset));
        };

        if header.is_end_of_log() {
            return Ok(None);
        }

        let kv_len = header.key_size as u64 + header.value_size as u64;
        let record_len = header_len as u64 + kv_len;
        if offset + record_len > file_size {
            return Ok(None);
        }

        let mut kv_buf = vec![0u8; kv_len as usize];
        let n = self.io.read(&mut kv_buf, offset + header_len as u64)?;
        if n < kv_buf.len() {
            return Ok(None);
        }

        let (key, value) = kv_buf.split_at(header.key_size as usize);
        let crc = record_checksum(&header_buf[CRC_SIZE..header_len], key, value);
        if crc != header.crc {
            return Err(self.checksum_mismatch(offset));
        }

        let record = LogRecord {
            key: key.to_vec(),
            value: value.to_vec(),
            rec_type: LogRecordType::try_from(header.rec_type)?,
        };
        Ok(Some((record, record_len)))
    }

    fn checksum_mismatch(&self, offset: u64) -> CaskError {
        CaskError::ChecksumMismatch {
            path: self.path.clone(),
            offset,
        }
    }
}
