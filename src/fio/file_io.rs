//! Standard file-backed I/O manager

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::Path;

use crate::error::Result;

use super::IoManager;

/// `std::fs::File` opened in append mode
pub struct FileIo {
    fd: File,
}

impl FileIo {
    /// Open or create the file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let fd = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        Ok(Self { fd })
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.fd.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.fd.seek_read(buf, offset)
    }
}

impl IoManager for FileIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        Ok(read_full_at(buf, offset, |chunk, at| self.read_at(chunk, at))?)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        (&self.fd).write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.fd.metadata()?.len())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.fd.set_len(len)?;
        Ok(())
    }
}

/// Fill `buf` from `offset` until it is full or EOF is reached
///
/// Positional reads may come back short or be interrupted by a signal;
/// both just mean "ask again".
fn read_full_at<F>(buf: &mut [u8], offset: u64, mut read_at: F) -> io::Result<usize>
where
    F: FnMut(&mut [u8], u64) -> io::Result<usize>,
{
    let mut filled = 0;
    while filled < buf.len() {
        match read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
