//! String index: a thin, lock-protected wrapper over [`Art`] that
//! implements the `set`/`get`/`getset`/`append`/`setnx`/`del`/`get_range`
//! operations, including lazy expiry on read.

use super::trie::Art;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::segment_set::SegmentSet;
use crate::slot::{now_ms, Slot};
use parking_lot::RwLock;

/// In-memory string index for one category's segment set.
pub struct StringIndex {
    trie: RwLock<Art<Slot>>,
}

impl Default for StringIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl StringIndex {
    /// Builds an empty index, ready to be filled by bootstrap replay.
    pub fn new() -> Self {
        StringIndex { trie: RwLock::new(Art::new()) }
    }

    /// Applies an already-durable log entry during bootstrap replay,
    /// without touching the segment set.
    pub fn apply_replay(&self, segment_id: u32, offset: u64, entry: Entry) {
        let mut trie = self.trie.write();
        match entry.entry_type {
            crate::entry::EntryType::Record => {
                trie.insert(&entry.key, Slot::with_expiry(entry.value, segment_id, offset, entry.expiry_ms));
            }
            crate::entry::EntryType::Delete => {
                trie.delete(&entry.key);
            }
            _ => {}
        }
    }

    /// `SET key value [expiry_ms]`.
    pub fn set(&self, segments: &SegmentSet, key: &[u8], value: &[u8], expiry_ms: i64) -> Result<()> {
        let mut trie = self.trie.write();
        let entry = Entry::record_with_expiry(key.to_vec(), value.to_vec(), expiry_ms);
        let (segment_id, offset) = segments.append(&entry)?;
        trie.insert(key, Slot::with_expiry(value.to_vec(), segment_id, offset, expiry_ms));
        Ok(())
    }

    /// `SETNX key value [expiry_ms]` — fails with `KeyAlreadyExists` if the
    /// key is already present (and not expired).
    pub fn setnx(&self, segments: &SegmentSet, key: &[u8], value: &[u8], expiry_ms: i64) -> Result<()> {
        let mut trie = self.trie.write();
        if let Some(existing) = trie.search(key) {
            if !existing.is_expired(now_ms()) {
                return Err(Error::KeyAlreadyExists);
            }
        }
        let entry = Entry::record_with_expiry(key.to_vec(), value.to_vec(), expiry_ms);
        let (segment_id, offset) = segments.append(&entry)?;
        trie.insert(key, Slot::with_expiry(value.to_vec(), segment_id, offset, expiry_ms));
        Ok(())
    }

    /// `GET key` — returns the value, lazily deleting and signalling
    /// `ValueExpired` if the slot's expiry has passed.
    pub fn get(&self, segments: &SegmentSet, key: &[u8]) -> Result<Vec<u8>> {
        {
            let trie = self.trie.read();
            match trie.search(key) {
                None => return Err(Error::KeyNotFound),
                Some(slot) if !slot.is_expired(now_ms()) => return Ok(slot.value.clone()),
                Some(_) => {}
            }
        }
        // Expired: drop the read lock and perform a best-effort lazy delete.
        let _ = self.del(segments, key);
        Err(Error::ValueExpired)
    }

    /// `GETSET key value [expiry_ms]` — returns the previous value (if any
    /// and unexpired) and installs the new one.
    pub fn getset(&self, segments: &SegmentSet, key: &[u8], value: &[u8], expiry_ms: i64) -> Result<Option<Vec<u8>>> {
        let mut trie = self.trie.write();
        let previous = trie.search(key).filter(|s| !s.is_expired(now_ms())).map(|s| s.value.clone());
        let entry = Entry::record_with_expiry(key.to_vec(), value.to_vec(), expiry_ms);
        let (segment_id, offset) = segments.append(&entry)?;
        trie.insert(key, Slot::with_expiry(value.to_vec(), segment_id, offset, expiry_ms));
        Ok(previous)
    }

    /// `APPEND key value` — concatenates onto an existing (unexpired)
    /// value, or behaves like `set` with no expiry if absent.
    pub fn append(&self, segments: &SegmentSet, key: &[u8], value: &[u8]) -> Result<usize> {
        let mut trie = self.trie.write();
        let mut combined = trie
            .search(key)
            .filter(|s| !s.is_expired(now_ms()))
            .map(|s| s.value.clone())
            .unwrap_or_default();
        combined.extend_from_slice(value);
        let entry = Entry::record(key.to_vec(), combined.clone());
        let (segment_id, offset) = segments.append(&entry)?;
        let len = combined.len();
        trie.insert(key, Slot::new(combined, segment_id, offset));
        Ok(len)
    }

    /// `DEL key`.
    pub fn del(&self, segments: &SegmentSet, key: &[u8]) -> Result<()> {
        let mut trie = self.trie.write();
        if trie.search(key).is_none() {
            return Err(Error::KeyNotFound);
        }
        segments.append(&Entry::delete(key.to_vec()))?;
        trie.delete(key);
        Ok(())
    }

    /// `GETRANGE key start end` — byte-range slice of the value, clamped
    /// to the value's bounds. Fails with `BadRange` if `start > end`.
    pub fn get_range(&self, segments: &SegmentSet, key: &[u8], start: i64, end: i64) -> Result<Vec<u8>> {
        if start > end {
            return Err(Error::BadRange { start, end });
        }
        let value = self.get(segments, key)?;
        let len = value.len() as i64;
        let start = start.clamp(0, len) as usize;
        let end = end.clamp(0, len) as usize;
        Ok(value[start..end.max(start)].to_vec())
    }

    /// Number of live (not-necessarily-unexpired) keys.
    pub fn len(&self) -> usize {
        self.trie.read().len()
    }

    /// Whether the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.trie.read().is_empty()
    }
}
