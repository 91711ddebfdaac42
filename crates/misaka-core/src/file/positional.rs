//! Positional-I/O backed [`FileWriter`](super::FileWriter).

use super::FileWriter;
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Plain OS file accessed through positional reads/writes.
///
/// No internal locking is needed for concurrent reads/writes at distinct
/// offsets (the OS file descriptor supports positional I/O natively); a
/// mutex still guards the handle on non-Unix targets where positional I/O
/// is emulated with seek+read/write.
pub struct PositionalFile {
    path: PathBuf,
    file: File,
    #[cfg(not(unix))]
    io_lock: Mutex<()>,
    len: AtomicU64,
}

impl PositionalFile {
    /// Opens (creating if absent) the file at `path` for positional I/O.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(PositionalFile {
            path: path.to_path_buf(),
            file,
            #[cfg(not(unix))]
            io_lock: Mutex::new(()),
            len: AtomicU64::new(len),
        })
    }

    #[cfg(unix)]
    fn write_at(&self, offset: u64, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all_at(bytes, offset)
    }

    #[cfg(not(unix))]
    fn write_at(&self, offset: u64, bytes: &[u8]) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let _guard = self.io_lock.lock().unwrap();
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)
    }

    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(not(unix))]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let _guard = self.io_lock.lock().unwrap();
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

impl FileWriter for PositionalFile {
    fn write(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.write_at(offset, bytes)?;
        let end = offset + bytes.len() as u64;
        self.len.fetch_max(end, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.read_at(offset, buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::UnexpectedEof {
                    offset,
                    requested: buf.len(),
                }
            } else {
                Error::Io(e)
            }
        })
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.file.sync_all().ok();
        Ok(())
    }

    fn delete(self: Box<Self>) -> Result<()> {
        self.close()?;
        std::fs::remove_file(&self.path)?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.len.load(Ordering::SeqCst))
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
        let f = PositionalFile::open(&path).unwrap();
        f.write(0, b"hello world").unwrap();
        let mut buf = [0u8; 5];
        f.read(6, &mut buf).unwrap();
        assert_eq!(&buf, b"world");
        assert_eq!(f.len().unwrap(), 11);
    }

    #[test]
    fn read_past_eof_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        let f = PositionalFile::open(&path).unwrap();
        f.write(0, b"ab").unwrap();
        let mut buf = [0u8; 10];
        assert!(matches!(f.read(0, &mut buf), Err(Error::UnexpectedEof { .. })));
    }

    #[test]
    fn reopen_preserves_len() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        {
            let f = PositionalFile::open(&path).unwrap();
            f.write(0, b"persisted").unwrap();
            f.sync().unwrap();
        }
        let f = PositionalFile::open(&path).unwrap();
        assert_eq!(f.len().unwrap(), 9);
    }
}
