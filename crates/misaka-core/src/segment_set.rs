//! Segment set: the active segment plus archived segments for one
//! category, and the rotate-on-overflow write path they share.

use crate::category::Category;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::file::IoMode;
use crate::segment::RecordFile;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// All segments for one category: a map `id -> segment` plus the ID of the
/// segment currently accepting appends (the one with the largest ID).
pub struct SegmentSet {
    category: Category,
    dir: PathBuf,
    cap: u64,
    mode: IoMode,
    sync_interval: Duration,
    segments: RwLock<FxHashMap<u32, Arc<RecordFile>>>,
    active_id: AtomicU32,
}

impl SegmentSet {
    /// Builds an empty segment set; the first segment is created lazily on
    /// the first [`SegmentSet::append`] (or eagerly via bootstrap).
    pub fn new(category: Category, dir: PathBuf, cap: u64, mode: IoMode, sync_interval: Duration) -> Self {
        SegmentSet {
            category,
            dir,
            cap,
            mode,
            sync_interval,
            segments: RwLock::new(FxHashMap::default()),
            active_id: AtomicU32::new(0),
        }
    }

    /// Registers a segment discovered by bootstrap without starting its
    /// sync task or marking it active; the caller finishes with
    /// [`SegmentSet::activate_highest`].
    pub fn insert_bootstrapped(&self, segment: Arc<RecordFile>) {
        self.segments.write().insert(segment.id(), segment);
    }

    /// After bootstrap has inserted every discovered segment, marks the
    /// highest-ID one active and starts its periodic sync task. No-op if
    /// no segments were registered (the category is empty so far).
    pub fn activate_highest(&self) -> Result<()> {
        let highest = self.segments.read().keys().copied().max();
        if let Some(id) = highest {
            let seg = self.segments.read().get(&id).cloned().expect("just found");
            seg.start_periodic_sync(self.sync_interval);
            self.active_id.store(id, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Segment IDs present, ascending. Used by bootstrap replay.
    pub fn sorted_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.segments.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Looks up a segment (active or archived) by ID.
    pub fn get(&self, id: u32) -> Option<Arc<RecordFile>> {
        self.segments.read().get(&id).cloned()
    }

    /// The currently active segment, creating segment 1 if the category has
    /// no segments yet.
    pub fn active(&self) -> Result<Arc<RecordFile>> {
        let id = self.active_id.load(Ordering::SeqCst);
        if id == 0 {
            return self.create_and_activate(1);
        }
        Ok(self
            .segments
            .read()
            .get(&id)
            .cloned()
            .expect("active_id always points at a registered segment"))
    }

    fn create_and_activate(&self, id: u32) -> Result<Arc<RecordFile>> {
        let seg = Arc::new(RecordFile::open(&self.dir, self.category, id, self.cap, self.mode)?);
        seg.start_periodic_sync(self.sync_interval);
        self.segments.write().insert(id, Arc::clone(&seg));
        self.active_id.store(id, Ordering::SeqCst);
        info!(category = %self.category, segment_id = id, "segment activated");
        Ok(seg)
    }

    /// Closes the active segment's sync task and opens segment
    /// `active.id + 1` as the new active segment.
    pub fn rotate(&self) -> Result<Arc<RecordFile>> {
        let old = self.active()?;
        old.stop_periodic_sync();
        let new_id = old.id() + 1;
        warn!(category = %self.category, from = old.id(), to = new_id, "rotating segment");
        self.create_and_activate(new_id)
    }

    /// Appends `entry` to the active segment, rotating and retrying once on
    /// `SegmentFull`. A second `SegmentFull` after rotation is
    /// fatal and propagates.
    pub fn append(&self, entry: &Entry) -> Result<(u32, u64)> {
        let active = self.active()?;
        match active.append(entry) {
            Ok(offset) => Ok((active.id(), offset)),
            Err(Error::SegmentFull { .. }) => {
                let new_active = self.rotate()?;
                let offset = new_active.append(entry)?;
                Ok((new_active.id(), offset))
            }
            Err(e) => Err(e),
        }
    }

    /// Closes every segment (active and archived) under the caller's lock.
    pub fn close_all(&self) -> Result<()> {
        for seg in self.segments.read().values() {
            seg.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::HEADER_LEN;
    use tempfile::tempdir;

    fn set(dir: &std::path::Path, cap: u64) -> SegmentSet {
        SegmentSet::new(
            Category::String,
            dir.to_path_buf(),
            cap,
            IoMode::Positional,
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn first_append_creates_segment_one() {
        let dir = tempdir().unwrap();
        let set = set(dir.path(), 4096);
        let (id, _) = set.append(&Entry::record("k", "v")).unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn overflow_rotates_to_a_new_higher_id_segment() {
        let dir = tempdir().unwrap();
        let cap = HEADER_LEN as u64 + 10;
        let set = set(dir.path(), cap);
        let (first_id, _) = set.append(&Entry::record("a", "1")).unwrap();
        let (second_id, _) = set.append(&Entry::record("b", "2")).unwrap();
        assert_eq!(first_id, 1);
        assert_eq!(second_id, 2);
        assert_eq!(set.sorted_ids(), vec![1, 2]);
    }
}
