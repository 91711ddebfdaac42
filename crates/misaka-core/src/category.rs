//! The five value categories and the on-disk segment filename convention.

use crate::error::{Error, Result};
use std::fmt;
use std::path::Path;

/// One of the value-category logs. Determines both the filename and which
/// index consumes the entries replayed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Plain string values (`misaka-core`'s string index).
    String,
    /// Hash values.
    Hash,
    /// List values.
    List,
    /// Reserved for a future set index; not implemented by this crate.
    Set,
    /// Sorted-set values.
    ZSet,
}

impl Category {
    /// All categories, in a stable order used for iterating segment sets.
    pub const ALL: [Category; 5] = [
        Category::String,
        Category::Hash,
        Category::List,
        Category::Set,
        Category::ZSet,
    ];

    /// The filename token for this category (`record.<token>.<id>.misaka`).
    pub fn as_str(self) -> &'static str {
        match self {
            Category::String => "string",
            Category::Hash => "hash",
            Category::List => "list",
            Category::Set => "set",
            Category::ZSet => "zset",
        }
    }

    /// Parses the filename token back into a [`Category`].
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "string" => Ok(Category::String),
            "hash" => Ok(Category::Hash),
            "list" => Ok(Category::List),
            "set" => Ok(Category::Set),
            "zset" => Ok(Category::ZSet),
            other => Err(Error::UnsupportedCategory(other.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the segment filename `record.<category>.<9-digit id>.misaka`.
pub fn segment_filename(category: Category, id: u32) -> String {
    format!("record.{}.{:09}.misaka", category.as_str(), id)
}

/// Parsed identity of a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentFileName {
    /// Category the file belongs to.
    pub category: Category,
    /// Segment ID encoded in the filename.
    pub id: u32,
}

/// Parses a segment filename of the form `record.<category>.<id>.misaka`.
///
/// Non-segment files (wrong prefix/suffix, non-numeric ID) are reported as
/// `None` rather than an error so bootstrap can skip stray files in the
/// data directory.
pub fn parse_segment_filename(path: &Path) -> Result<Option<SegmentFileName>> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 || parts[0] != "record" || parts[3] != "misaka" {
        return Ok(None);
    }
    let Ok(id) = parts[2].parse::<u32>() else {
        return Ok(None);
    };
    let category = Category::parse(parts[1])?;
    Ok(Some(SegmentFileName { category, id }))
}
