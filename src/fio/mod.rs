//! File I/O Module
//!
//! The narrow set of file primitives the segment layer is built on.
//!
//! ## Responsibilities
//! - Positional reads that are safe alongside an in-progress append
//! - Append-only writes
//! - Durability (fsync) and size queries
//! - Truncating a torn tail after a crash

mod file_io;

use std::path::Path;

use crate::error::Result;

pub use file_io::FileIo;

/// Handle to one append-only file
pub trait IoManager: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`, returns bytes read
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Append `buf` at the end of the file
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Flush file contents to stable storage
    fn sync(&self) -> Result<()>;

    /// Current file length in bytes
    fn size(&self) -> Result<u64>;

    /// Cut the file down to `len` bytes
    fn truncate(&self, len: u64) -> Result<()>;
}

/// Open the default I/O manager for a path
pub fn new_io_manager(path: &Path) -> Result<Box<dyn IoManager>> {
    Ok(Box::new(FileIo::open(path)?))
}
