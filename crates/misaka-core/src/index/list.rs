//! List index and its TTL monitor: an ordered sequence of
//! `Arc`-shared slots per key, with per-element expiry handled by a
//! background task rather than lazily on read.
//!
//! Each TTL-bearing insertion spawns a short-lived timer task that sleeps
//! until the element's deadline, then posts `(key, Arc<Slot>)` on a channel
//! consumed by one long-lived monitor task. The monitor re-checks the
//! element is still present via `Arc::ptr_eq` (a concurrent `lset`/`lrem`/
//! `lpop` may have already replaced or removed it) before writing a
//! `ListExpired` tombstone and removing it.

use crate::entry::{decode_value_index, encode_value_index, Entry, EntryType, NO_EXPIRY};
use crate::error::{Error, Result};
use crate::segment_set::SegmentSet;
use crate::slot::{now_ms, Slot};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

type Lists = FxHashMap<Vec<u8>, VecDeque<Arc<Slot>>>;

struct Inner {
    lists: RwLock<Lists>,
    segments: Arc<SegmentSet>,
    notify_tx: mpsc::UnboundedSender<(Vec<u8>, Arc<Slot>)>,
    shutdown_tx: watch::Sender<bool>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

/// In-memory list index for the list category's segment set.
pub struct ListIndex(Arc<Inner>);

impl ListIndex {
    /// Builds an empty index and starts its TTL monitor task. `segments` is
    /// held for the lifetime of the index so the monitor can write
    /// `ListExpired` tombstones without going through the engine facade.
    pub fn new(segments: Arc<SegmentSet>) -> Self {
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let inner = Arc::new(Inner {
            lists: RwLock::new(FxHashMap::default()),
            segments,
            notify_tx,
            shutdown_tx,
            monitor_handle: Mutex::new(None),
        });

        let monitor_inner = Arc::clone(&inner);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    received = notify_rx.recv() => {
                        match received {
                            Some((key, slot)) => Self::handle_expiry(&monitor_inner, key, slot),
                            None => break,
                        }
                    }
                }
            }
        });
        *inner.monitor_handle.lock() = Some(handle);

        ListIndex(inner)
    }

    /// Stops the TTL monitor task. Idempotent; in-flight per-element timer
    /// tasks are left to exit on their own (they are short-lived and
    /// harmless once the index they'd notify is gone).
    pub fn stop(&self) {
        let _ = self.0.shutdown_tx.send(true);
        if let Some(handle) = self.0.monitor_handle.lock().take() {
            handle.abort();
        }
    }

    fn schedule_expiry(&self, key: Vec<u8>, slot: Arc<Slot>) {
        if slot.expiry_ms == NO_EXPIRY {
            return;
        }
        let delay_ms = (slot.expiry_ms - now_ms()).max(0) as u64;
        let tx = self.0.notify_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = tx.send((key, slot));
        });
    }

    fn handle_expiry(inner: &Arc<Inner>, key: Vec<u8>, slot: Arc<Slot>) {
        let mut lists = inner.lists.write();
        let Some(dq) = lists.get_mut(&key) else { return };
        let Some(pos) = dq.iter().position(|e| Arc::ptr_eq(e, &slot)) else {
            return;
        };
        let entry = Entry {
            entry_type: EntryType::ListExpired,
            expiry_ms: NO_EXPIRY,
            key: key.clone(),
            value: slot.value.clone(),
        };
        if let Err(err) = inner.segments.append(&entry) {
            tracing::warn!(%err, "failed to write ListExpired tombstone");
            return;
        }
        dq.remove(pos);
        if dq.is_empty() {
            lists.remove(&key);
        }
        debug!(key = %String::from_utf8_lossy(&key), "list element expired");
    }

    /// Applies an already-durable log entry during bootstrap replay.
    /// Also re-schedules expiry for any TTL-bearing element it installs,
    /// since the monitor has no other way to learn about it.
    pub fn apply_replay(&self, segment_id: u32, offset: u64, entry: Entry) -> Result<()> {
        let mut lists = self.0.lists.write();
        match entry.entry_type {
            EntryType::ListPush => {
                let slot = Arc::new(Slot::with_expiry(entry.value, segment_id, offset, entry.expiry_ms));
                lists.entry(entry.key.clone()).or_default().push_front(Arc::clone(&slot));
                drop(lists);
                self.schedule_expiry(entry.key, slot);
            }
            EntryType::ListPop => {
                if let Some(dq) = lists.get_mut(&entry.key) {
                    dq.pop_front();
                    if dq.is_empty() {
                        lists.remove(&entry.key);
                    }
                }
            }
            EntryType::ListInsert => {
                let (value, index) = decode_value_index(&entry.value)?;
                let slot = Arc::new(Slot::with_expiry(value, segment_id, offset, entry.expiry_ms));
                let dq = lists.entry(entry.key.clone()).or_default();
                let idx = validate_insert_index(index, dq.len())?;
                dq.insert(idx, Arc::clone(&slot));
                drop(lists);
                self.schedule_expiry(entry.key, slot);
            }
            EntryType::Record => {
                let (value, index) = decode_value_index(&entry.value)?;
                if let Some(dq) = lists.get_mut(&entry.key) {
                    let idx = validate_element_index(index, dq.len())?;
                    let slot = Arc::new(Slot::with_expiry(value, segment_id, offset, entry.expiry_ms));
                    dq[idx] = Arc::clone(&slot);
                    drop(lists);
                    self.schedule_expiry(entry.key, slot);
                }
            }
            EntryType::Delete => {
                let text = std::str::from_utf8(&entry.value).map_err(|_| Error::DecodeKeyField)?;
                let idx: usize = text.parse().map_err(|_| Error::DecodeKeyField)?;
                if let Some(dq) = lists.get_mut(&entry.key) {
                    if idx < dq.len() {
                        dq.remove(idx);
                    }
                    if dq.is_empty() {
                        lists.remove(&entry.key);
                    }
                }
            }
            EntryType::ListExpired => {
                if let Some(dq) = lists.get_mut(&entry.key) {
                    if let Some(pos) = dq.iter().position(|s| s.value == entry.value) {
                        dq.remove(pos);
                    }
                    if dq.is_empty() {
                        lists.remove(&entry.key);
                    }
                }
            }
        }
        Ok(())
    }

    /// `LPUSH key value [expiry_ms]` — inserts at the head, creating the
    /// list if absent.
    pub fn lpush(&self, key: &[u8], value: &[u8], expiry_ms: i64) -> Result<()> {
        let mut lists = self.0.lists.write();
        let entry = Entry { entry_type: EntryType::ListPush, expiry_ms, key: key.to_vec(), value: value.to_vec() };
        let (segment_id, offset) = self.0.segments.append(&entry)?;
        let slot = Arc::new(Slot::with_expiry(value.to_vec(), segment_id, offset, expiry_ms));
        lists.entry(key.to_vec()).or_default().push_front(Arc::clone(&slot));
        drop(lists);
        self.schedule_expiry(key.to_vec(), slot);
        Ok(())
    }

    /// `LPOP key` — removes and returns the head element.
    pub fn lpop(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut lists = self.0.lists.write();
        let dq = lists.get(key).ok_or(Error::KeyNotFound)?;
        let head_value = dq.front().ok_or(Error::KeyNotFound)?.value.clone();
        let entry = Entry { entry_type: EntryType::ListPop, expiry_ms: NO_EXPIRY, key: key.to_vec(), value: Vec::new() };
        self.0.segments.append(&entry)?;
        let dq = lists.get_mut(key).expect("checked above");
        dq.pop_front();
        if dq.is_empty() {
            lists.remove(key);
        }
        Ok(head_value)
    }

    /// `LINSERT key index value [expiry_ms]` — inserts before the given
    /// index, shifting later elements right. `index == len` appends.
    pub fn linsert(&self, key: &[u8], index: i64, value: &[u8], expiry_ms: i64) -> Result<()> {
        let mut lists = self.0.lists.write();
        let len = lists.get(key).map_or(0, VecDeque::len);
        let idx = validate_insert_index(index, len)?;
        let entry = Entry {
            entry_type: EntryType::ListInsert,
            expiry_ms,
            key: key.to_vec(),
            value: encode_value_index(value, index),
        };
        let (segment_id, offset) = self.0.segments.append(&entry)?;
        let slot = Arc::new(Slot::with_expiry(value.to_vec(), segment_id, offset, expiry_ms));
        lists.entry(key.to_vec()).or_default().insert(idx, Arc::clone(&slot));
        drop(lists);
        self.schedule_expiry(key.to_vec(), slot);
        Ok(())
    }

    /// `LSET key index value` — replaces the element at `index`, preserving
    /// its prior expiry.
    pub fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> Result<()> {
        let mut lists = self.0.lists.write();
        let dq = lists.get(key).ok_or(Error::KeyNotFound)?;
        let idx = validate_element_index(index, dq.len())?;
        let existing_expiry = dq[idx].expiry_ms;
        let entry = Entry {
            entry_type: EntryType::Record,
            expiry_ms: existing_expiry,
            key: key.to_vec(),
            value: encode_value_index(value, index),
        };
        let (segment_id, offset) = self.0.segments.append(&entry)?;
        let slot = Arc::new(Slot::with_expiry(value.to_vec(), segment_id, offset, existing_expiry));
        let dq = lists.get_mut(key).expect("checked above");
        dq[idx] = Arc::clone(&slot);
        drop(lists);
        self.schedule_expiry(key.to_vec(), slot);
        Ok(())
    }

    /// `LREM key count value` — `count > 0` scans from the head, `count < 0`
    /// from the tail, `count == 0` removes every match. Returns the number
    /// of elements removed; if `count != 0` and fewer than `|count|` matches
    /// existed, the removals performed still commit but the call reports
    /// `RemoveCountInsufficient`.
    pub fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> Result<usize> {
        let mut lists = self.0.lists.write();
        if !lists.contains_key(key) {
            return Err(Error::KeyNotFound);
        }
        let target = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
        let mut removed = 0usize;
        while removed < target {
            let dq = lists.get(key).expect("checked above");
            let pos = if count < 0 {
                dq.iter().rposition(|s| s.value == value)
            } else {
                dq.iter().position(|s| s.value == value)
            };
            let Some(pos) = pos else { break };
            let entry = Entry {
                entry_type: EntryType::Delete,
                expiry_ms: NO_EXPIRY,
                key: key.to_vec(),
                value: pos.to_string().into_bytes(),
            };
            self.0.segments.append(&entry)?;
            let dq = lists.get_mut(key).expect("checked above");
            dq.remove(pos);
            removed += 1;
            if dq.is_empty() {
                break;
            }
        }
        if lists.get(key).is_some_and(VecDeque::is_empty) {
            lists.remove(key);
        }
        if count != 0 && removed < target {
            return Err(Error::RemoveCountInsufficient);
        }
        Ok(removed)
    }

    /// `LINDEX key index` — supports negative indices counting from the
    /// tail, as a read-only convenience.
    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Vec<u8>> {
        let lists = self.0.lists.read();
        let dq = lists.get(key).ok_or(Error::KeyNotFound)?;
        let idx = resolve_read_index(index, dq.len()).ok_or(Error::IndexOutOfRange { index, len: dq.len() })?;
        Ok(dq[idx].value.clone())
    }

    /// `LLEN key`.
    pub fn llen(&self, key: &[u8]) -> Result<usize> {
        let lists = self.0.lists.read();
        lists.get(key).map(VecDeque::len).ok_or(Error::KeyNotFound)
    }

    /// `LRANGE key start end` — inclusive range, clamped to bounds; negative
    /// indices count from the tail. An empty or fully out-of-range request
    /// yields an empty vector rather than an error.
    pub fn lrange(&self, key: &[u8], start: i64, end: i64) -> Result<Vec<Vec<u8>>> {
        let lists = self.0.lists.read();
        let dq = lists.get(key).ok_or(Error::KeyNotFound)?;
        let len = dq.len();
        if len == 0 {
            return Ok(Vec::new());
        }
        let len_i = len as i64;
        let clamp = |i: i64| -> i64 { if i < 0 { (len_i + i).max(0) } else { i } };
        let start = clamp(start).min(len_i - 1).max(0);
        let end = clamp(end).min(len_i - 1);
        if end < start {
            return Ok(Vec::new());
        }
        Ok(dq.iter().skip(start as usize).take((end - start + 1) as usize).map(|s| s.value.clone()).collect())
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.0.lists.read().len()
    }

    /// Whether the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.0.lists.read().is_empty()
    }
}

/// Validates an insertion position: any index in `[0, len]` (appending at
/// the tail is `index == len`).
fn validate_insert_index(index: i64, len: usize) -> Result<usize> {
    if index < 0 || index as usize > len {
        return Err(Error::IndexOutOfRange { index, len });
    }
    Ok(index as usize)
}

/// Validates a position that must reference an existing element.
fn validate_element_index(index: i64, len: usize) -> Result<usize> {
    if index < 0 || index as usize >= len {
        return Err(Error::IndexOutOfRange { index, len });
    }
    Ok(index as usize)
}

/// Resolves a read-only index, allowing negative values counted from the
/// tail (Redis-style), returning `None` if still out of bounds.
fn resolve_read_index(index: i64, len: usize) -> Option<usize> {
    let len_i = len as i64;
    let idx = if index < 0 { len_i + index } else { index };
    if idx < 0 || idx >= len_i {
        None
    } else {
        Some(idx as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::file::IoMode;
    use tempfile::tempdir;

    fn setup() -> (Arc<SegmentSet>, ListIndex) {
        let dir = tempdir().unwrap();
        let segments = Arc::new(SegmentSet::new(
            Category::List,
            dir.path().to_path_buf(),
            1 << 20,
            IoMode::Positional,
            Duration::from_secs(3600),
        ));
        let idx = ListIndex::new(Arc::clone(&segments));
        (segments, idx)
    }

    #[tokio::test]
    async fn lpush_then_lpop_is_lifo() {
        let (_segments, idx) = setup();
        idx.lpush(b"q", b"a", NO_EXPIRY).unwrap();
        idx.lpush(b"q", b"b", NO_EXPIRY).unwrap();
        assert_eq!(idx.lpop(b"q").unwrap(), b"b");
        assert_eq!(idx.lpop(b"q").unwrap(), b"a");
        assert!(matches!(idx.lpop(b"q"), Err(Error::KeyNotFound)));
        idx.stop();
    }

    #[tokio::test]
    async fn linsert_and_lrange() {
        let (_segments, idx) = setup();
        idx.lpush(b"q", b"a", NO_EXPIRY).unwrap();
        idx.lpush(b"q", b"c", NO_EXPIRY).unwrap();
        idx.linsert(b"q", 1, b"b", NO_EXPIRY).unwrap();
        assert_eq!(idx.lrange(b"q", 0, -1).unwrap(), vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
        idx.stop();
    }

    #[tokio::test]
    async fn lset_replaces_element_in_place() {
        let (_segments, idx) = setup();
        idx.lpush(b"q", b"a", NO_EXPIRY).unwrap();
        idx.lset(b"q", 0, b"z").unwrap();
        assert_eq!(idx.lindex(b"q", 0).unwrap(), b"z");
        idx.stop();
    }

    #[tokio::test]
    async fn lrem_from_head_and_tail() {
        let (_segments, idx) = setup();
        for v in [b"x".to_vec(), b"a".to_vec(), b"x".to_vec(), b"a".to_vec(), b"x".to_vec()] {
            idx.linsert(b"q", idx.llen(b"q").unwrap_or(0) as i64, &v, NO_EXPIRY).unwrap();
        }
        let removed = idx.lrem(b"q", 2, b"x").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(idx.lrange(b"q", 0, -1).unwrap(), vec![b"a".to_vec(), b"a".to_vec(), b"x".to_vec()]);
        idx.stop();
    }

    #[tokio::test]
    async fn lrem_insufficient_reports_error_but_commits_removals() {
        let (_segments, idx) = setup();
        idx.lpush(b"q", b"a", NO_EXPIRY).unwrap();
        assert!(matches!(idx.lrem(b"q", 3, b"a"), Err(Error::RemoveCountInsufficient)));
        assert!(matches!(idx.llen(b"q"), Err(Error::KeyNotFound)));
        idx.stop();
    }

    #[tokio::test]
    async fn lindex_negative_counts_from_tail() {
        let (_segments, idx) = setup();
        idx.lpush(b"q", b"a", NO_EXPIRY).unwrap();
        idx.lpush(b"q", b"b", NO_EXPIRY).unwrap();
        assert_eq!(idx.lindex(b"q", -1).unwrap(), b"a");
        idx.stop();
    }

    #[tokio::test]
    async fn ttl_monitor_expires_element_and_writes_tombstone() {
        let (segments, idx) = setup();
        idx.lpush(b"q", b"x", now_ms() + 20).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(matches!(idx.lindex(b"q", 0), Err(Error::KeyNotFound)));
        assert!(segments.active().unwrap().offset() > 0);
        idx.stop();
    }
}
