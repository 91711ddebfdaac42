//! Engine facade: owns one segment set plus matching index per category,
//! opened through bootstrap, and exposes the per-category operations
//! directly so callers never touch segment sets or the codec themselves.

use crate::bootstrap::{self, SegmentSets};
use crate::category::Category;
use crate::config::MisakaConfig;
use crate::error::{Error, Result};
use crate::index::{HashIndex, ListIndex, StringIndex, ZSetIndex};
use std::sync::Arc;
use tracing::info;

/// The open storage engine: every category's segment set and index, wired
/// together under a single open/close lifecycle.
pub struct Engine {
    segments: SegmentSets,
    strings: StringIndex,
    hashes: HashIndex,
    lists: ListIndex,
    zsets: ZSetIndex,
}

impl Engine {
    /// Opens the engine rooted at `config.storage.data_dir`: scans and
    /// replays every category's log, then returns the ready-to-serve
    /// engine wrapped in an `Arc` for sharing with the server's connection
    /// tasks.
    pub fn open(config: &MisakaConfig) -> Result<Arc<Engine>> {
        let segments = bootstrap::scan(
            &config.storage.data_dir,
            config.storage.segment_cap_bytes,
            config.storage.io_mode,
            config.storage.sync_interval(),
        )?;

        let strings = StringIndex::new();
        let hashes = HashIndex::new();
        let zsets = ZSetIndex::new();
        let list_segments = Arc::clone(&segments[&Category::List]);
        let lists = ListIndex::new(Arc::clone(&list_segments));

        bootstrap::replay(&segments[&Category::String], |segment_id, offset, entry| {
            strings.apply_replay(segment_id, offset, entry);
            Ok(())
        })?;
        bootstrap::replay(&segments[&Category::Hash], |segment_id, offset, entry| {
            hashes.apply_replay(segment_id, offset, entry);
            Ok(())
        })?;
        bootstrap::replay(&segments[&Category::List], |segment_id, offset, entry| {
            lists.apply_replay(segment_id, offset, entry)
        })?;
        bootstrap::replay(&segments[&Category::ZSet], |segment_id, offset, entry| {
            zsets.apply_replay(segment_id, offset, entry);
            Ok(())
        })?;

        info!(data_dir = %config.storage.data_dir.display(), "engine opened");

        Ok(Arc::new(Engine { segments, strings, hashes, lists, zsets }))
    }

    fn segment_set(&self, category: Category) -> &crate::segment_set::SegmentSet {
        &self.segments[&category]
    }

    // -- string --------------------------------------------------------

    /// `SET key value [expiry_ms]`.
    pub fn set(&self, key: &[u8], value: &[u8], expiry_ms: i64) -> Result<()> {
        self.strings.set(self.segment_set(Category::String), key, value, expiry_ms)
    }

    /// `SETNX key value [expiry_ms]`.
    pub fn setnx(&self, key: &[u8], value: &[u8], expiry_ms: i64) -> Result<()> {
        self.strings.setnx(self.segment_set(Category::String), key, value, expiry_ms)
    }

    /// `GET key`.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.strings.get(self.segment_set(Category::String), key)
    }

    /// `GETRANGE key start end`.
    pub fn get_range(&self, key: &[u8], start: i64, end: i64) -> Result<Vec<u8>> {
        self.strings.get_range(self.segment_set(Category::String), key, start, end)
    }

    /// `GETSET key value [expiry_ms]`.
    pub fn getset(&self, key: &[u8], value: &[u8], expiry_ms: i64) -> Result<Option<Vec<u8>>> {
        self.strings.getset(self.segment_set(Category::String), key, value, expiry_ms)
    }

    /// `APPEND key value`.
    pub fn append(&self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.strings.append(self.segment_set(Category::String), key, value)
    }

    /// `DEL key` (string category).
    pub fn del(&self, key: &[u8]) -> Result<()> {
        self.strings.del(self.segment_set(Category::String), key)
    }

    // -- hash ---------------------------------------------------------

    /// `HSET key field value`.
    pub fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> Result<()> {
        self.hashes.hset(self.segment_set(Category::Hash), key, field, value)
    }

    /// `HSETNX key field value`.
    pub fn hsetnx(&self, key: &[u8], field: &[u8], value: &[u8]) -> Result<()> {
        self.hashes.hsetnx(self.segment_set(Category::Hash), key, field, value)
    }

    /// `HGET key field`.
    pub fn hget(&self, key: &[u8], field: &[u8]) -> Result<Vec<u8>> {
        self.hashes.hget(self.segment_set(Category::Hash), key, field)
    }

    /// `HDEL key field`.
    pub fn hdel(&self, key: &[u8], field: &[u8]) -> Result<()> {
        self.hashes.hdel(self.segment_set(Category::Hash), key, field)
    }

    /// `HLEN key`.
    pub fn hlen(&self, key: &[u8]) -> Result<usize> {
        self.hashes.hlen(key)
    }

    /// `HEXISTS key field`.
    pub fn hexists(&self, key: &[u8], field: &[u8]) -> bool {
        self.hashes.hexists(key, field)
    }

    /// `HSTRLEN key field`.
    pub fn hstrlen(&self, key: &[u8], field: &[u8]) -> usize {
        self.hashes.hstrlen(key, field)
    }

    // -- list ---------------------------------------------------------

    /// `LPUSH key value [expiry_ms]`.
    pub fn lpush(&self, key: &[u8], value: &[u8], expiry_ms: i64) -> Result<()> {
        self.lists.lpush(key, value, expiry_ms)
    }

    /// `LPOP key`.
    pub fn lpop(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.lists.lpop(key)
    }

    /// `LINSERT key index value [expiry_ms]`.
    pub fn linsert(&self, key: &[u8], index: i64, value: &[u8], expiry_ms: i64) -> Result<()> {
        self.lists.linsert(key, index, value, expiry_ms)
    }

    /// `LSET key index value`.
    pub fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> Result<()> {
        self.lists.lset(key, index, value)
    }

    /// `LREM key count value`.
    pub fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> Result<usize> {
        self.lists.lrem(key, count, value)
    }

    /// `LINDEX key index`.
    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Vec<u8>> {
        self.lists.lindex(key, index)
    }

    /// `LLEN key`.
    pub fn llen(&self, key: &[u8]) -> Result<usize> {
        self.lists.llen(key)
    }

    /// `LRANGE key start end`.
    pub fn lrange(&self, key: &[u8], start: i64, end: i64) -> Result<Vec<Vec<u8>>> {
        self.lists.lrange(key, start, end)
    }

    // -- sorted set ----------------------------------------------------

    /// `ZADD key score member [expiry_ms]`.
    pub fn zadd(&self, key: &[u8], member: &[u8], score: i64, expiry_ms: i64) -> Result<()> {
        self.zsets.zadd(self.segment_set(Category::ZSet), key, member, score, expiry_ms)
    }

    /// `ZREM key member`.
    pub fn zrem(&self, key: &[u8], member: &[u8]) -> Result<()> {
        self.zsets.zrem(self.segment_set(Category::ZSet), key, member)
    }

    /// `ZSCORE key member`.
    pub fn zscore(&self, key: &[u8], member: &[u8]) -> Result<i64> {
        self.zsets.zscore(self.segment_set(Category::ZSet), key, member)
    }

    /// `ZCARD key`.
    pub fn zcard(&self, key: &[u8]) -> Result<usize> {
        self.zsets.zcard(self.segment_set(Category::ZSet), key)
    }

    /// `ZCOUNT key lo hi`.
    pub fn zcount(&self, key: &[u8], lo: i64, hi: i64) -> Result<usize> {
        self.zsets.zcount(self.segment_set(Category::ZSet), key, lo, hi)
    }

    /// `ZRANGE key lo hi`.
    pub fn zrange(&self, key: &[u8], lo: i64, hi: i64) -> Result<Vec<Vec<u8>>> {
        self.zsets.zrange(self.segment_set(Category::ZSet), key, lo, hi)
    }

    /// Stops every background task (list TTL monitor, per-segment periodic
    /// sync) and closes every open segment, across every category.
    pub fn close(&self) -> Result<()> {
        self.lists.stop();
        for category in Category::ALL {
            self.segments[&category].close_all()?;
        }
        info!("engine closed");
        Ok(())
    }
}
