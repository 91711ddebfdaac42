//! Memory-mapped, fixed-capacity [`FileWriter`](super::FileWriter).
//!
//! The backing file is truncated to its full capacity up front and mapped
//! once; a logical "content size" tracks how much of `[0, cap)` is actually
//! live data. `[content_size, cap)` is scratch space reserved for future
//! appends and must never be interpreted as a record.

use super::FileWriter;
use crate::error::{Error, Result};
use memmap2::MmapMut;
use parking_lot::RwLock;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Memory-mapped segment file with a fixed on-disk capacity.
pub struct MmapFile {
    path: PathBuf,
    cap: u64,
    mmap: RwLock<MmapMut>,
    content_size: AtomicU64,
}

impl MmapFile {
    /// Opens (creating if absent) the file at `path`, truncated/extended to
    /// `cap` bytes and mapped read-write. If the file already has content
    /// (a reopen), the logical content size is taken from the current file
    /// length observed before truncation, capped at `cap`.
    pub fn open(path: &Path, cap: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let existing_len = file.metadata()?.len();
        let content_size = existing_len.min(cap);
        file.set_len(cap)?;

        // SAFETY: `file` was just opened read-write and resized to `cap`,
        // so the full mapped range is backed by allocated file space.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(MmapFile {
            path: path.to_path_buf(),
            cap,
            mmap: RwLock::new(mmap),
            content_size: AtomicU64::new(content_size),
        })
    }
}

impl FileWriter for MmapFile {
    fn write(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let content_size = self.content_size.load(Ordering::Acquire);
        if offset > content_size {
            return Err(Error::OffsetIllegal {
                offset,
                content_size,
            });
        }
        let end = offset
            .checked_add(bytes.len() as u64)
            .ok_or(Error::WriteOverflow {
                offset,
                len: bytes.len() as u64,
                cap: self.cap,
            })?;
        if end > self.cap {
            return Err(Error::WriteOverflow {
                offset,
                len: bytes.len() as u64,
                cap: self.cap,
            });
        }

        let mut mmap = self.mmap.write();
        mmap[offset as usize..end as usize].copy_from_slice(bytes);
        drop(mmap);

        self.content_size.fetch_max(end, Ordering::AcqRel);
        Ok(())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let content_size = self.content_size.load(Ordering::Acquire);
        let end = offset + buf.len() as u64;
        if end > content_size {
            return Err(Error::UnexpectedEof {
                offset,
                requested: buf.len(),
            });
        }
        let mmap = self.mmap.read();
        buf.copy_from_slice(&mmap[offset as usize..end as usize]);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let content_size = self.content_size.load(Ordering::Acquire) as usize;
        let mmap = self.mmap.read();
        if content_size > 0 {
            mmap.flush_range(0, content_size)?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.sync()?;
        let content_size = self.content_size.load(Ordering::Acquire);
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(content_size)?;
        Ok(())
    }

    fn delete(self: Box<Self>) -> Result<()> {
        self.close()?;
        std::fs::remove_file(&self.path)?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.content_size.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        let f = MmapFile::open(&path, 4096).unwrap();
        f.write(0, b"hello world").unwrap();
        let mut buf = [0u8; 5];
        f.read(6, &mut buf).unwrap();
        assert_eq!(&buf, b"world");
        assert_eq!(f.len().unwrap(), 11);
    }

    #[test]
    fn write_past_content_size_is_illegal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        let f = MmapFile::open(&path, 4096).unwrap();
        f.write(0, b"ab").unwrap();
        assert!(matches!(
            f.write(10, b"x"),
            Err(Error::OffsetIllegal { .. })
        ));
    }

    #[test]
    fn write_past_cap_overflows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        let f = MmapFile::open(&path, 8).unwrap();
        assert!(matches!(
            f.write(0, &[0u8; 16]),
            Err(Error::WriteOverflow { .. })
        ));
    }

    #[test]
    fn close_truncates_to_content_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        let f = MmapFile::open(&path, 4096).unwrap();
        f.write(0, b"abc").unwrap();
        f.close().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3);
    }

    #[test]
    fn reopen_recovers_content_size_up_to_cap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        {
            let f = MmapFile::open(&path, 4096).unwrap();
            f.write(0, b"persisted").unwrap();
            f.close().unwrap();
        }
        let f = MmapFile::open(&path, 4096).unwrap();
        assert_eq!(f.len().unwrap(), 9);
        let mut buf = [0u8; 9];
        f.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"persisted");
    }
}
