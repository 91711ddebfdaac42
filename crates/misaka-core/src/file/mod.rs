//! Byte-addressable file abstraction shared by both I/O backends.

mod mmap;
mod positional;

pub use mmap::MmapFile;
pub use positional::PositionalFile;

use crate::error::Result;
use std::path::Path;

/// The I/O mode a segment's backing file uses, selected at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// Positional reads/writes on a plain OS file handle.
    Positional,
    /// Memory-mapped, fixed-capacity file.
    Mmap,
}

/// Contract shared by both storage backends for one segment file.
pub trait FileWriter: Send + Sync {
    /// Writes `bytes` at `offset`, extending the file if `offset` is past
    /// the current content size (subject to backend-specific limits).
    fn write(&self, offset: u64, bytes: &[u8]) -> Result<()>;

    /// Fills `buf` entirely from `offset`, failing with `UnexpectedEof` if
    /// the file does not contain that many bytes there.
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Flushes to durable storage.
    fn sync(&self) -> Result<()>;

    /// Closes the file. Idempotent.
    fn close(&self) -> Result<()>;

    /// Closes and removes the backing file from disk.
    fn delete(self: Box<Self>) -> Result<()>;

    /// Logical length of the file's live content in bytes.
    fn len(&self) -> Result<u64>;
}

/// Opens (creating if absent) a segment file at `path` with capacity `cap`
/// using the requested I/O mode.
pub fn open(path: &Path, cap: u64, mode: IoMode) -> Result<Box<dyn FileWriter>> {
    match mode {
        IoMode::Positional => Ok(Box::new(PositionalFile::open(path)?)),
        IoMode::Mmap => Ok(Box::new(MmapFile::open(path, cap)?)),
    }
}
