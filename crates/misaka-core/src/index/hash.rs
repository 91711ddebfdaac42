//! Hash index: a thin, lock-protected wrapper over a two-level map
//! that implements the `hset`/`hsetnx`/`hget`/`hdel`/`hlen`/`hexists`/
//! `hstrlen` operations, including lazy expiry on read.
//!
//! Writes encode `(key, field)` into the entry's key bytes via
//! [`crate::entry::encode_key_field`]. A `Delete` entry with an empty field
//! removes the whole outer key; a `Delete` entry with a non-empty field
//! removes just that field, and the inner map is eagerly dropped once empty.

use crate::entry::{decode_key_field, encode_key_field, Entry, EntryType};
use crate::error::{Error, Result};
use crate::segment_set::SegmentSet;
use crate::slot::{now_ms, Slot};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// In-memory hash index for one category's segment set.
pub struct HashIndex {
    outer: RwLock<FxHashMap<Vec<u8>, FxHashMap<Vec<u8>, Slot>>>,
}

impl Default for HashIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl HashIndex {
    /// Builds an empty index, ready to be filled by bootstrap replay.
    pub fn new() -> Self {
        HashIndex {
            outer: RwLock::new(FxHashMap::default()),
        }
    }

    /// Applies an already-durable log entry during bootstrap replay.
    pub fn apply_replay(&self, segment_id: u32, offset: u64, entry: Entry) {
        let mut outer = self.outer.write();
        match entry.entry_type {
            EntryType::Record => {
                let Ok((key, field)) = decode_key_field(&entry.key) else {
                    return;
                };
                outer.entry(key).or_default().insert(
                    field,
                    Slot::with_expiry(entry.value, segment_id, offset, entry.expiry_ms),
                );
            }
            EntryType::Delete => {
                let Ok((key, field)) = decode_key_field(&entry.key) else {
                    return;
                };
                if field.is_empty() {
                    outer.remove(&key);
                } else if let Some(inner) = outer.get_mut(&key) {
                    inner.remove(&field);
                    if inner.is_empty() {
                        outer.remove(&key);
                    }
                }
            }
            _ => {}
        }
    }

    /// `HSET key field value` — inserts or overwrites a field.
    pub fn hset(&self, segments: &SegmentSet, key: &[u8], field: &[u8], value: &[u8]) -> Result<()> {
        let mut outer = self.outer.write();
        let entry = Entry::record(encode_key_field(key, field), value.to_vec());
        let (segment_id, offset) = segments.append(&entry)?;
        outer
            .entry(key.to_vec())
            .or_default()
            .insert(field.to_vec(), Slot::new(value.to_vec(), segment_id, offset));
        Ok(())
    }

    /// `HSETNX key field value` — fails with `FieldAlreadyExists` if the
    /// field is already present (and not expired).
    pub fn hsetnx(&self, segments: &SegmentSet, key: &[u8], field: &[u8], value: &[u8]) -> Result<()> {
        let mut outer = self.outer.write();
        if let Some(existing) = outer.get(key).and_then(|inner| inner.get(field)) {
            if !existing.is_expired(now_ms()) {
                return Err(Error::FieldAlreadyExists);
            }
        }
        let entry = Entry::record(encode_key_field(key, field), value.to_vec());
        let (segment_id, offset) = segments.append(&entry)?;
        outer
            .entry(key.to_vec())
            .or_default()
            .insert(field.to_vec(), Slot::new(value.to_vec(), segment_id, offset));
        Ok(())
    }

    /// `HGET key field` — lazily deletes and signals `FieldExpired`-style
    /// `ValueExpired` if the field's expiry has passed.
    pub fn hget(&self, segments: &SegmentSet, key: &[u8], field: &[u8]) -> Result<Vec<u8>> {
        {
            let outer = self.outer.read();
            let inner = outer.get(key).ok_or(Error::KeyNotFound)?;
            match inner.get(field) {
                None => return Err(Error::FieldNotFound),
                Some(slot) if !slot.is_expired(now_ms()) => return Ok(slot.value.clone()),
                Some(_) => {}
            }
        }
        let _ = self.hdel(segments, key, field);
        Err(Error::ValueExpired)
    }

    /// `HDEL key field`.
    pub fn hdel(&self, segments: &SegmentSet, key: &[u8], field: &[u8]) -> Result<()> {
        let mut outer = self.outer.write();
        let inner = outer.get(key).ok_or(Error::KeyNotFound)?;
        if !inner.contains_key(field) {
            return Err(Error::FieldNotFound);
        }
        segments.append(&Entry::delete(encode_key_field(key, field)))?;
        let inner = outer.get_mut(key).expect("checked above");
        inner.remove(field);
        if inner.is_empty() {
            outer.remove(key);
        }
        Ok(())
    }

    /// `HLEN key` — number of fields in the hash.
    pub fn hlen(&self, key: &[u8]) -> Result<usize> {
        let outer = self.outer.read();
        let inner = outer.get(key).ok_or(Error::KeyNotFound)?;
        Ok(inner.len())
    }

    /// `HEXISTS key field`.
    pub fn hexists(&self, key: &[u8], field: &[u8]) -> bool {
        let outer = self.outer.read();
        outer
            .get(key)
            .and_then(|inner| inner.get(field))
            .is_some_and(|slot| !slot.is_expired(now_ms()))
    }

    /// `HSTRLEN key field` — byte length of the field's value, or 0 if
    /// absent (per the conventional Redis semantics for this command).
    pub fn hstrlen(&self, key: &[u8], field: &[u8]) -> usize {
        let outer = self.outer.read();
        outer
            .get(key)
            .and_then(|inner| inner.get(field))
            .filter(|slot| !slot.is_expired(now_ms()))
            .map_or(0, |slot| slot.value.len())
    }

    /// Number of outer keys currently tracked.
    pub fn len(&self) -> usize {
        self.outer.read().len()
    }

    /// Whether the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.outer.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::file::IoMode;
    use std::time::Duration;
    use tempfile::tempdir;

    fn setup() -> (SegmentSet, HashIndex) {
        let dir = tempdir().unwrap();
        let segments = SegmentSet::new(
            Category::Hash,
            dir.path().to_path_buf(),
            1 << 20,
            IoMode::Positional,
            Duration::from_secs(3600),
        );
        (segments, HashIndex::new())
    }

    #[tokio::test]
    async fn hset_then_hget_roundtrip() {
        let (segments, idx) = setup();
        idx.hset(&segments, b"user:1", b"name", b"alice").unwrap();
        assert_eq!(idx.hget(&segments, b"user:1", b"name").unwrap(), b"alice");
    }

    #[tokio::test]
    async fn hget_missing_key_and_field() {
        let (segments, idx) = setup();
        assert!(matches!(idx.hget(&segments, b"user:1", b"name"), Err(Error::KeyNotFound)));
        idx.hset(&segments, b"user:1", b"name", b"alice").unwrap();
        assert!(matches!(idx.hget(&segments, b"user:1", b"age"), Err(Error::FieldNotFound)));
    }

    #[tokio::test]
    async fn hsetnx_refuses_existing_field() {
        let (segments, idx) = setup();
        idx.hset(&segments, b"user:1", b"name", b"alice").unwrap();
        assert!(matches!(
            idx.hsetnx(&segments, b"user:1", b"name", b"bob"),
            Err(Error::FieldAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn hdel_removes_field_and_drops_empty_outer_key() {
        let (segments, idx) = setup();
        idx.hset(&segments, b"user:1", b"name", b"alice").unwrap();
        idx.hdel(&segments, b"user:1", b"name").unwrap();
        assert!(matches!(idx.hget(&segments, b"user:1", b"name"), Err(Error::KeyNotFound)));
        assert_eq!(idx.len(), 0);
    }

    #[tokio::test]
    async fn hlen_hexists_hstrlen() {
        let (segments, idx) = setup();
        idx.hset(&segments, b"user:1", b"name", b"alice").unwrap();
        idx.hset(&segments, b"user:1", b"age", b"30").unwrap();
        assert_eq!(idx.hlen(b"user:1").unwrap(), 2);
        assert!(idx.hexists(b"user:1", b"name"));
        assert!(!idx.hexists(b"user:1", b"missing"));
        assert_eq!(idx.hstrlen(b"user:1", b"name"), 5);
        assert_eq!(idx.hstrlen(b"user:1", b"missing"), 0);
    }

    #[tokio::test]
    async fn expired_field_downgrades_to_value_expired() {
        let (segments, idx) = setup();
        let entry = Entry::record_with_expiry(encode_key_field(b"user:1", b"name"), b"alice".to_vec(), now_ms() - 1000);
        segments.append(&entry).unwrap();
        idx.apply_replay(1, 0, entry);
        assert!(matches!(idx.hget(&segments, b"user:1", b"name"), Err(Error::ValueExpired)));
        assert!(matches!(idx.hget(&segments, b"user:1", b"name"), Err(Error::KeyNotFound)));
    }
}
