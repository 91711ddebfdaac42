//! The in-memory index slot shared by every index.
//!
//! A slot caches the decoded value bytes alongside a back-reference to the
//! exact log record that produced them, so a crash that loses the cache can
//! always be reconstructed by replaying `(segment_id, offset)` again.

use crate::entry::NO_EXPIRY;

/// One index cell: cached value plus its log back-reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Cached value bytes, as of the most recent write to this slot.
    pub value: Vec<u8>,
    /// ID of the segment holding the record this slot was built from.
    pub segment_id: u32,
    /// Byte offset of that record within the segment.
    pub offset: u64,
    /// Absolute expiry in milliseconds since epoch, or [`NO_EXPIRY`].
    pub expiry_ms: i64,
}

impl Slot {
    /// Builds a slot with no expiry.
    pub fn new(value: Vec<u8>, segment_id: u32, offset: u64) -> Self {
        Slot {
            value,
            segment_id,
            offset,
            expiry_ms: NO_EXPIRY,
        }
    }

    /// Builds a slot carrying an explicit expiry.
    pub fn with_expiry(value: Vec<u8>, segment_id: u32, offset: u64, expiry_ms: i64) -> Self {
        Slot {
            value,
            segment_id,
            offset,
            expiry_ms,
        }
    }

    /// Whether this slot's expiry has elapsed as of `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry_ms != NO_EXPIRY && self.expiry_ms <= now_ms
    }
}

/// Milliseconds since the Unix epoch, used throughout for expiry comparisons.
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
