//! Record file: a single append-only log segment.
//!
//! Wraps the entry codec over a [`FileWriter`] backend, adding the size cap,
//! append cursor, and periodic-fsync background task.

use crate::category::{segment_filename, Category};
use crate::entry::{Entry, HEADER_LEN};
use crate::error::{Error, Result};
use crate::file::{self, FileWriter, IoMode};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// One log segment: a fixed-capacity, append-only sequence of entries.
pub struct RecordFile {
    id: u32,
    category: Category,
    cap: u64,
    writer: Box<dyn FileWriter>,
    offset: AtomicU64,
    is_syncing: Arc<AtomicBool>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl RecordFile {
    /// Opens (creating if absent) segment `id` of `category` under `dir`.
    pub fn open(dir: &Path, category: Category, id: u32, cap: u64, mode: IoMode) -> Result<Self> {
        let path = dir.join(segment_filename(category, id));
        let writer = file::open(&path, cap, mode)?;
        let offset = writer.len()?;
        Ok(RecordFile {
            id,
            category,
            cap,
            writer,
            offset: AtomicU64::new(offset),
            is_syncing: Arc::new(AtomicBool::new(false)),
            sync_task: Mutex::new(None),
        })
    }

    /// The segment's ID, unique and strictly increasing within its category.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The category this segment belongs to.
    pub fn category(&self) -> Category {
        self.category
    }

    /// The current append offset (equivalently, the byte length of live data).
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    /// The segment's fixed byte capacity.
    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// Logical length, identical to [`RecordFile::offset`].
    pub fn len(&self) -> u64 {
        self.offset()
    }

    /// Whether the segment currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.offset() == 0
    }

    /// Encodes and appends `entry`, returning the byte offset it was written
    /// at. Fails with `SegmentFull` (leaving `offset` unchanged) if the
    /// entry does not fit within the remaining capacity.
    pub fn append(&self, entry: &Entry) -> Result<u64> {
        let (buf, len) = entry.encode();
        let len = len as u64;
        let offset = self.offset.load(Ordering::Acquire);
        if offset + len > self.cap {
            return Err(Error::SegmentFull {
                segment_id: self.id,
            });
        }
        self.writer.write(offset, &buf)?;
        self.offset.fetch_add(len, Ordering::AcqRel);
        Ok(offset)
    }

    /// Reads and decodes the entry at `offset`, verifying its CRC.
    ///
    /// Returns the decoded entry and the number of bytes it occupied, i.e.
    /// `offset + bytes_consumed` is the offset of the next entry.
    pub fn read_at(&self, offset: u64) -> Result<(Entry, usize)> {
        let mut header = [0u8; HEADER_LEN];
        self.writer.read(offset, &mut header)?;
        Entry::decode(&header, |rel_offset, len| {
            let mut buf = vec![0u8; len];
            self.writer.read(offset + rel_offset as u64, &mut buf)?;
            Ok(buf)
        })
    }

    /// Starts a background task that calls `sync` every `interval`. The
    /// task observes `is_syncing` each wakeup and exits once it is cleared
    /// by [`RecordFile::stop_periodic_sync`]; a sync error also ends the
    /// task silently; the next mutation to hit this segment surfaces the
    /// write error to its caller instead.
    pub fn start_periodic_sync(self: &Arc<Self>, interval: Duration) {
        self.is_syncing.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !this.is_syncing.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = this.writer.sync() {
                    error!(segment_id = this.id, category = %this.category, %err, "periodic sync failed, stopping");
                    break;
                }
                debug!(segment_id = this.id, category = %this.category, "periodic sync completed");
            }
        });
        *self.sync_task.lock() = Some(handle);
    }

    /// Stops the periodic-sync task started by
    /// [`RecordFile::start_periodic_sync`], if any. Idempotent.
    pub fn stop_periodic_sync(&self) {
        self.is_syncing.store(false, Ordering::SeqCst);
        if let Some(handle) = self.sync_task.lock().take() {
            handle.abort();
        }
    }

    /// Flushes the backing file to durable storage.
    pub fn sync(&self) -> Result<()> {
        self.writer.sync()
    }

    /// Stops the sync task and closes the backing file.
    pub fn close(&self) -> Result<()> {
        self.stop_periodic_sync();
        self.writer.close()?;
        info!(segment_id = self.id, category = %self.category, "segment closed");
        Ok(())
    }

    /// Stops the sync task, closes, and deletes the backing file. Used when
    /// trimming obsolete segments (not exercised by the present design,
    /// which never compacts, but kept as a primitive for completeness).
    pub fn delete(self) -> Result<()> {
        self.stop_periodic_sync();
        // Box::delete requires an owned `Box<dyn FileWriter>`.
        let RecordFile { writer, .. } = self;
        writer.delete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_at() {
        let dir = tempdir().unwrap();
        let seg = RecordFile::open(dir.path(), Category::String, 1, 4096, IoMode::Positional).unwrap();
        let entry = Entry::record("k", "v");
        let offset = seg.append(&entry).unwrap();
        let (decoded, _) = seg.read_at(offset).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn append_past_cap_fails_without_advancing_offset() {
        let dir = tempdir().unwrap();
        let seg = RecordFile::open(dir.path(), Category::String, 1, HEADER_LEN as u64, IoMode::Positional).unwrap();
        let before = seg.offset();
        let big = Entry::record("k", vec![0u8; 4096]);
        assert!(matches!(seg.append(&big), Err(Error::SegmentFull { .. })));
        assert_eq!(seg.offset(), before);
    }

    #[test]
    fn offset_advances_by_encoded_len() {
        let dir = tempdir().unwrap();
        let seg = RecordFile::open(dir.path(), Category::String, 1, 65536, IoMode::Mmap).unwrap();
        let entry = Entry::record("k", "v");
        let (_, len) = entry.encode();
        seg.append(&entry).unwrap();
        assert_eq!(seg.offset(), len as u64);
    }

    #[test]
    fn reopen_recovers_offset_and_prior_entries() {
        let dir = tempdir().unwrap();
        let offset = {
            let seg = RecordFile::open(dir.path(), Category::String, 1, 4096, IoMode::Positional).unwrap();
            let offset = seg.append(&Entry::record("k", "v")).unwrap();
            seg.close().unwrap();
            offset
        };
        let seg = RecordFile::open(dir.path(), Category::String, 1, 4096, IoMode::Positional).unwrap();
        let (decoded, _) = seg.read_at(offset).unwrap();
        assert_eq!(decoded, Entry::record("k", "v"));
    }
}
