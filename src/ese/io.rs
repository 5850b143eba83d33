//! Block I/O abstraction.
//!
//! The reader pulls aligned, fixed-size pages through the [`DataSource`]
//! trait: exact-length reads at absolute offsets plus a total size. The
//! standard implementation is [`FileSource`], a plain buffered file; callers
//! with data in memory or behind another transport can supply their own
//! source to [`EseDb::open_source`](crate::ese::database::EseDb::open_source).
//!
//! Short reads are fatal and reported as I/O errors, distinct from reads past
//! the end of the source, which are reported as bounds errors.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::EseError;

/// A readable, seekable byte source the database is parsed from.
pub trait DataSource: Send {
    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), EseError>;

    /// Total size of the source in bytes.
    fn size(&self) -> u64;
}

/// A [`DataSource`] backed by a file on disk.
pub struct FileSource {
    file: File,
    file_size: u64,
}

impl FileSource {
    /// Open a file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EseError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| EseError::Io(format!("Cannot open {}: {}", path.display(), e)))?;

        let file_size = file
            .metadata()
            .map_err(|e| EseError::Io(format!("Cannot stat {}: {}", path.display(), e)))?
            .len();

        Ok(FileSource { file, file_size })
    }
}

impl DataSource for FileSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), EseError> {
        if offset + buf.len() as u64 > self.file_size {
            return Err(EseError::Bounds(format!(
                "Read of {} bytes at offset {} past end of file ({} bytes)",
                buf.len(),
                offset,
                self.file_size
            )));
        }

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| EseError::Io(format!("Cannot seek to offset {}: {}", offset, e)))?;

        self.file
            .read_exact(buf)
            .map_err(|e| EseError::Io(format!("Cannot read {} bytes at offset {}: {}", buf.len(), offset, e)))
    }

    fn size(&self) -> u64 {
        self.file_size
    }
}

/// A [`DataSource`] over an in-memory buffer. Used by tests and by callers
/// that already hold the whole database in memory.
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        MemorySource { data }
    }
}

impl DataSource for MemorySource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), EseError> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(EseError::Bounds(format!(
                "Read of {} bytes at offset {} past end of buffer ({} bytes)",
                buf.len(),
                offset,
                self.data.len()
            )));
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
