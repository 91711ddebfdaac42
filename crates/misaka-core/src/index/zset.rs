//! Sorted-set index: per key, a dict `field -> node` plus a rank
//! skip-list ordered by score, giving `zrange`/`zcount` without a linear
//! scan. Expired members are swept lazily: any read-side operation first
//! purges expired nodes when `expire_count > 0`.

use super::skiplist::SkipList;
use crate::entry::{decode_key_field, encode_key_field, Entry, EntryType, NO_EXPIRY};
use crate::error::{Error, Result};
use crate::segment_set::SegmentSet;
use crate::slot::now_ms;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy)]
struct ZNode {
    score: i64,
    segment_id: u32,
    offset: u64,
    expiry_ms: i64,
}

/// One key's sorted set: the dict is the authoritative membership set, the
/// skip-list only answers ordered range queries over it.
#[derive(Default)]
struct ZSet {
    dict: FxHashMap<Vec<u8>, ZNode>,
    ranks: SkipList<Vec<u8>>,
    expire_count: usize,
}

/// In-memory sorted-set index for one category's segment set.
pub struct ZSetIndex {
    outer: RwLock<FxHashMap<Vec<u8>, ZSet>>,
}

impl Default for ZSetIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ZSetIndex {
    /// Builds an empty index, ready to be filled by bootstrap replay.
    pub fn new() -> Self {
        ZSetIndex { outer: RwLock::new(FxHashMap::default()) }
    }

    /// Applies an already-durable log entry during bootstrap replay.
    pub fn apply_replay(&self, segment_id: u32, offset: u64, entry: Entry) {
        let mut outer = self.outer.write();
        match entry.entry_type {
            EntryType::Record => {
                let Ok((key, member)) = decode_key_field(&entry.key) else { return };
                let Ok(score) = std::str::from_utf8(&entry.value).unwrap_or_default().parse::<i64>() else {
                    return;
                };
                let zset = outer.entry(key).or_default();
                Self::unlink(zset, &member);
                zset.ranks.insert(score, member.clone());
                if entry.expiry_ms != NO_EXPIRY {
                    zset.expire_count += 1;
                }
                zset.dict.insert(member, ZNode { score, segment_id, offset, expiry_ms: entry.expiry_ms });
            }
            EntryType::Delete => {
                let Ok((key, member)) = decode_key_field(&entry.key) else { return };
                if let Some(zset) = outer.get_mut(&key) {
                    Self::unlink(zset, &member);
                    if zset.dict.is_empty() {
                        outer.remove(&key);
                    }
                }
            }
            _ => {}
        }
    }

    /// Removes `member` from both halves of `zset` if present, keeping
    /// `expire_count` consistent. Does not touch the log.
    fn unlink(zset: &mut ZSet, member: &[u8]) {
        if let Some(old) = zset.dict.remove(member) {
            zset.ranks.delete_by_score(old.score, &member.to_vec());
            if old.expiry_ms != NO_EXPIRY {
                zset.expire_count -= 1;
            }
        }
    }

    /// Purges every expired member of `zset`, writing a tombstone for each.
    fn sweep(zset: &mut ZSet, segments: &SegmentSet, key: &[u8]) {
        if zset.expire_count == 0 {
            return;
        }
        let now = now_ms();
        let expired: Vec<Vec<u8>> = zset
            .dict
            .iter()
            .filter(|(_, node)| node.expiry_ms != NO_EXPIRY && node.expiry_ms <= now)
            .map(|(member, _)| member.clone())
            .collect();
        for member in expired {
            Self::unlink(zset, &member);
            let _ = segments.append(&Entry::delete(encode_key_field(key, &member)));
        }
    }

    /// Sweeps `key`'s set and returns it, dropping the outer entry (and
    /// returning `None`) if nothing live remains.
    fn sweep_and_get<'a>(
        outer: &'a mut FxHashMap<Vec<u8>, ZSet>,
        segments: &SegmentSet,
        key: &[u8],
    ) -> Option<&'a mut ZSet> {
        let zset = outer.get_mut(key)?;
        Self::sweep(zset, segments, key);
        if zset.dict.is_empty() {
            outer.remove(key);
            return None;
        }
        outer.get_mut(key)
    }

    /// `ZADD key score member [expiry_ms]` — inserts or re-scores a member.
    pub fn zadd(&self, segments: &SegmentSet, key: &[u8], member: &[u8], score: i64, expiry_ms: i64) -> Result<()> {
        let mut outer = self.outer.write();
        let entry = Entry::record_with_expiry(encode_key_field(key, member), score.to_string().into_bytes(), expiry_ms);
        let (segment_id, offset) = segments.append(&entry)?;
        let zset = outer.entry(key.to_vec()).or_default();
        Self::unlink(zset, member);
        zset.ranks.insert(score, member.to_vec());
        if expiry_ms != NO_EXPIRY {
            zset.expire_count += 1;
        }
        zset.dict.insert(member.to_vec(), ZNode { score, segment_id, offset, expiry_ms });
        Ok(())
    }

    /// `ZREM key member`.
    pub fn zrem(&self, segments: &SegmentSet, key: &[u8], member: &[u8]) -> Result<()> {
        let mut outer = self.outer.write();
        let zset = Self::sweep_and_get(&mut outer, segments, key).ok_or(Error::KeyNotFound)?;
        let node = zset.dict.get(member).copied().ok_or(Error::MemberNotFound)?;
        segments.append(&Entry::delete(encode_key_field(key, member)))?;
        let zset = outer.get_mut(key).expect("checked above");
        zset.dict.remove(member);
        zset.ranks.delete_by_score(node.score, &member.to_vec());
        if node.expiry_ms != NO_EXPIRY {
            zset.expire_count -= 1;
        }
        if zset.dict.is_empty() {
            outer.remove(key);
        }
        Ok(())
    }

    /// `ZSCORE key member`.
    pub fn zscore(&self, segments: &SegmentSet, key: &[u8], member: &[u8]) -> Result<i64> {
        let mut outer = self.outer.write();
        let zset = Self::sweep_and_get(&mut outer, segments, key).ok_or(Error::KeyNotFound)?;
        zset.dict.get(member).map(|n| n.score).ok_or(Error::MemberNotFound)
    }

    /// `ZCARD key` — number of live members.
    pub fn zcard(&self, segments: &SegmentSet, key: &[u8]) -> Result<usize> {
        let mut outer = self.outer.write();
        let zset = Self::sweep_and_get(&mut outer, segments, key).ok_or(Error::KeyNotFound)?;
        Ok(zset.dict.len())
    }

    /// `ZCOUNT key lo hi` — count of members whose score lies in `[min(lo,hi), max(lo,hi)]`.
    pub fn zcount(&self, segments: &SegmentSet, key: &[u8], lo: i64, hi: i64) -> Result<usize> {
        let mut outer = self.outer.write();
        let zset = Self::sweep_and_get(&mut outer, segments, key).ok_or(Error::KeyNotFound)?;
        Ok(zset.ranks.range_by_score(lo, hi).len())
    }

    /// `ZRANGE key lo hi` — members whose score lies in `[min(lo,hi), max(lo,hi)]`, ascending.
    pub fn zrange(&self, segments: &SegmentSet, key: &[u8], lo: i64, hi: i64) -> Result<Vec<Vec<u8>>> {
        let mut outer = self.outer.write();
        let zset = Self::sweep_and_get(&mut outer, segments, key).ok_or(Error::KeyNotFound)?;
        Ok(zset.ranks.range_by_score(lo, hi).into_iter().map(|(_, member)| member).collect())
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
