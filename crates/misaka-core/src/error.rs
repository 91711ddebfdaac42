//! Error types for the storage engine and index layer.

use thiserror::Error;

/// Every failure mode the engine can surface, grouped by the layer that raises it.
#[derive(Error, Debug)]
pub enum Error {
    // -- codec ----------------------------------------------------------
    /// CRC recomputed over header+key+value did not match the stored checksum.
    #[error("CRC mismatch while decoding entry at offset {offset}")]
    CrcMismatch {
        /// Byte offset of the entry within its segment.
        offset: u64,
    },

    /// A varint in the entry header would have read past the fixed header window.
    #[error("truncated varint while decoding entry header")]
    TruncatedVarint,

    /// Input buffer handed to the codec was too short to contain a header.
    #[error("buffer too short to decode an entry header: {0} bytes")]
    ShortBuffer(usize),

    /// A segment filename did not encode a recognised category token.
    #[error("unsupported segment category: {0}")]
    UnsupportedCategory(String),

    /// A hash/list composite key (key+field or value+index) could not be decoded.
    #[error("failed to decode composite key/field pair")]
    DecodeKeyField,

    // -- file / segment ---------------------------------------------------
    /// The active segment has no room left for the entry being appended.
    #[error("segment {segment_id} is full")]
    SegmentFull {
        /// The segment that rejected the append.
        segment_id: u32,
    },

    /// An mmap write targeted an offset past the tracked content size.
    #[error("offset {offset} is past the current content size {content_size}")]
    OffsetIllegal {
        /// Offset the caller attempted to write at.
        offset: u64,
        /// Logical content size of the mapped file at the time of the write.
        content_size: u64,
    },

    /// An mmap write would have extended past the file's fixed capacity.
    #[error("write of {len} bytes at offset {offset} overflows capacity {cap}")]
    WriteOverflow {
        /// Offset the caller attempted to write at.
        offset: u64,
        /// Length of the write.
        len: u64,
        /// Capacity of the backing file.
        cap: u64,
    },

    /// A read did not fill the full requested buffer.
    #[error("unexpected EOF reading {requested} bytes at offset {offset}")]
    UnexpectedEof {
        /// Offset the read started at.
        offset: u64,
        /// Number of bytes requested.
        requested: usize,
    },

    /// The segment file named by a bootstrap scan no longer exists.
    #[error("segment file not found: {0}")]
    FileNotFound(String),

    // -- index semantics ---------------------------------------------------
    /// No slot exists for the requested key.
    #[error("key not found")]
    KeyNotFound,

    /// `setnx`/`hsetnx` found an existing entry it refused to overwrite.
    #[error("key already exists")]
    KeyAlreadyExists,

    /// The outer hash key exists but the requested field does not.
    #[error("field not found")]
    FieldNotFound,

    /// `hsetnx` found an existing field it refused to overwrite.
    #[error("field already exists")]
    FieldAlreadyExists,

    /// The sorted set exists but the requested member does not.
    #[error("member not found")]
    MemberNotFound,

    /// The slot was found but its expiry has already elapsed (string/hash).
    #[error("value expired")]
    ValueExpired,

    /// The zset node was found but its expiry has already elapsed.
    #[error("member expired")]
    MemberExpired,

    /// A list index was out of `[0, len)`.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Index requested by the caller.
        index: i64,
        /// Current length of the list.
        len: usize,
    },

    /// `lrem` removed fewer elements than the non-zero count requested.
    #[error("removed fewer than the requested count")]
    RemoveCountInsufficient,

    /// `get_range`/similar received `start > end`.
    #[error("invalid range: start {start} > end {end}")]
    BadRange {
        /// Requested start bound.
        start: i64,
        /// Requested end bound.
        end: i64,
    },

    /// An `ex`/`px` modifier used a unit the command layer does not recognise.
    #[error("unsupported time unit: {0}")]
    UnsupportedTimeUnit(String),

    /// The string index's iterator observed a structural mutation mid-walk.
    #[error("tree was modified during iteration")]
    TreeModified,

    // -- ambient ---------------------------------------------------------
    /// Layered configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Underlying I/O failure not covered by a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
