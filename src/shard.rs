// src/shard.rs

//! Shard file conventions and validation
//!
//! A shard is a pair of companion files sharing a numeric stem:
//!
//! - `<stem>.mm.time`: index file, fixed 8-byte records
//! - `<stem>.mm`: data file, float32 matrix whose variable dimension equals
//!   the index record count

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Suffix of index files
pub const INDEX_SUFFIX: &str = ".mm.time";

/// Suffix of data files
pub const DATA_SUFFIX: &str = ".mm";

/// Size of one index record in bytes
pub const INDEX_RECORD_SIZE: u64 = 8;

/// Size of one data element (float32) in bytes
pub const DATA_ELEMENT_SIZE: u64 = 4;

/// Stem of an index file name (`0001.mm.time` -> `0001`)
pub fn index_stem(index: &Path) -> Option<&str> {
    index.file_name()?.to_str()?.strip_suffix(INDEX_SUFFIX)
}

/// Whether a stem is a non-empty run of ASCII digits
pub fn is_numeric_stem(stem: &str) -> bool {
    !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit())
}

/// Companion data file of an index file
pub fn data_path(index: &Path) -> Option<PathBuf> {
    let stem = index_stem(index)?;
    Some(index.with_file_name(format!("{}{}", stem, DATA_SUFFIX)))
}

/// One index/data file pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Shard {
    index: PathBuf,
    data: PathBuf,
}

impl Shard {
    /// Shard for an index file, if its name follows the convention
    pub fn from_index(index: impl Into<PathBuf>) -> Option<Self> {
        let index = index.into();
        let stem = index_stem(&index)?;
        if !is_numeric_stem(stem) {
            return None;
        }
        let data = data_path(&index)?;
        Some(Self { index, data })
    }

    pub fn index(&self) -> &Path {
        &self.index
    }

    pub fn data(&self) -> &Path {
        &self.data
    }

    /// Numeric stem shared by both files
    pub fn id(&self) -> &str {
        index_stem(&self.index).unwrap_or_default()
    }

    /// Both files of the shard, index first
    pub fn files(&self) -> [&Path; 2] {
        [&self.index, &self.data]
    }

    /// Whether the shard is ready to be archived
    ///
    /// See [`validate`].
    pub fn is_valid(&self, cutoff: Option<SystemTime>) -> bool {
        validate(&self.index, cutoff)
    }
}

/// Check that an index file and its data file form an archivable shard
///
/// Never fails and never touches the files. Returns `false` when:
///
/// - the name is not `<digits>.mm.time`,
/// - the data file is missing or either file cannot be stat'ed,
/// - either file is empty, or the index holds no complete record,
/// - a `cutoff` is given and the index file was modified at or after it.
pub fn validate(index: &Path, cutoff: Option<SystemTime>) -> bool {
    let Some(shard) = Shard::from_index(index) else {
        return false;
    };

    let (Ok(index_meta), Ok(data_meta)) = (fs::metadata(shard.index()), fs::metadata(shard.data()))
    else {
        debug!("{}: missing or unreadable shard file", index.display());
        return false;
    };

    if index_meta.len() == 0 || data_meta.len() == 0 {
        return false;
    }

    if index_meta.len() / INDEX_RECORD_SIZE == 0 {
        return false;
    }

    if let Some(cutoff) = cutoff {
        let Ok(mtime) = index_meta.modified() else {
            return false;
        };
        if mtime >= cutoff {
            debug!("{}: modified too recently", index.display());
            return false;
        }
    }

    true
}
