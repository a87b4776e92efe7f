// src/repair.rs

//! Alignment repair for shards left inconsistent by a crashed writer
//!
//! The capture process appends to the index and data files independently,
//! so a crash can leave either with a trailing partial record. Repair
//! truncates trailing bytes until all of these hold:
//!
//! 1. the index size is a multiple of the 8-byte record size,
//! 2. the data size is a multiple of one row (all non-leading dimensions),
//! 3. the data size is a multiple of the full shape,
//! 4. the index holds no more records than the data file holds rows.
//!
//! Each truncation strictly shrinks one file, so the loop terminates; the
//! pass limit guards against files that keep growing under us.
//!
//! Repair is destructive: truncated bytes are gone.

use crate::descriptor::Descriptor;
use crate::error::{Error, IoResultExt, Result};
use crate::shard::{DATA_ELEMENT_SIZE, INDEX_RECORD_SIZE, Shard};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Maximum number of truncation passes before giving up
pub const MAX_REPAIR_PASSES: usize = 16;

/// Sizes of a shard's two files, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSizes {
    pub index: u64,
    pub data: u64,
}

impl ShardSizes {
    pub fn new(index: u64, data: u64) -> Self {
        Self { index, data }
    }

    pub fn records(&self) -> u64 {
        self.index / INDEX_RECORD_SIZE
    }
}

/// Which file to truncate, and to what length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    Index(u64),
    Data(u64),
}

/// Element counts derived from a shape resolved with the current record count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Elements in one row (product of all non-leading dimensions)
    pub row_elements: u64,
    /// Elements in the whole resolved shape
    pub total_elements: u64,
}

impl Layout {
    pub fn for_records(descriptor: &Descriptor, records: u64) -> Self {
        let shape = descriptor.compute_shape(records);
        let row_elements = shape.iter().skip(1).product();
        let total_elements = shape.iter().product();
        Self {
            row_elements,
            total_elements,
        }
    }

    pub fn row_bytes(&self) -> u64 {
        self.row_elements * DATA_ELEMENT_SIZE
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_elements * DATA_ELEMENT_SIZE
    }

    /// Complete rows available in a data file of `data` bytes
    pub fn available_rows(&self, data: u64) -> u64 {
        data.checked_div(self.row_bytes()).unwrap_or(0)
    }
}

fn round_down(value: u64, unit: u64) -> u64 {
    value / unit * unit
}

/// Next truncation needed to align `sizes`, or `None` once aligned
///
/// Rules are checked in order and only the first violated one fires.
pub fn plan_truncation(descriptor: &Descriptor, sizes: ShardSizes) -> Option<Truncation> {
    if sizes.index % INDEX_RECORD_SIZE != 0 {
        return Some(Truncation::Index(round_down(sizes.index, INDEX_RECORD_SIZE)));
    }

    let records = sizes.records();
    let layout = Layout::for_records(descriptor, records);

    let row_bytes = layout.row_bytes();
    if row_bytes > 0 && sizes.data % row_bytes != 0 {
        return Some(Truncation::Data(round_down(sizes.data, row_bytes)));
    }

    // Zero records means a zero-sized shape; nothing to align against
    let total_bytes = layout.total_bytes();
    if total_bytes > 0 && sizes.data % total_bytes != 0 {
        return Some(Truncation::Data(round_down(sizes.data, total_bytes)));
    }

    let rows = layout.available_rows(sizes.data);
    if records > rows {
        return Some(Truncation::Index(rows * INDEX_RECORD_SIZE));
    }

    None
}

/// Apply [`plan_truncation`] to sizes until aligned, without touching disk
///
/// Returns the aligned sizes and the number of truncations performed.
pub fn converge(descriptor: &Descriptor, mut sizes: ShardSizes) -> Option<(ShardSizes, usize)> {
    for pass in 0..=MAX_REPAIR_PASSES {
        match plan_truncation(descriptor, sizes) {
            None => return Some((sizes, pass)),
            Some(Truncation::Index(len)) => sizes.index = len,
            Some(Truncation::Data(len)) => sizes.data = len,
        }
    }
    None
}

/// One truncation applied to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedFile {
    pub path: PathBuf,
    pub old_len: u64,
    pub new_len: u64,
}

/// What a repair did to a shard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub truncations: Vec<TruncatedFile>,
    /// Index records left after repair
    pub records: u64,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.truncations.is_empty()
    }

    /// Whether repair left nothing worth archiving
    pub fn emptied(&self) -> bool {
        self.records == 0
    }
}

fn file_len(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path).with_path(path)?.len())
}

fn truncate(path: &Path, len: u64) -> Result<()> {
    let file = OpenOptions::new().write(true).open(path).with_path(path)?;
    file.set_len(len).with_path(path)?;
    file.sync_all().with_path(path)
}

/// Truncate a shard's files in place until they are aligned
///
/// Sizes are re-read from disk on every pass.
pub fn repair_shard(descriptor: &Descriptor, shard: &Shard) -> Result<RepairReport> {
    let mut report = RepairReport::default();

    for _ in 0..=MAX_REPAIR_PASSES {
        let sizes = ShardSizes::new(file_len(shard.index())?, file_len(shard.data())?);

        let (path, old_len, new_len) = match plan_truncation(descriptor, sizes) {
            None => {
                report.records = sizes.records();
                if !report.is_clean() {
                    debug!(
                        "{}: aligned after {} truncation(s)",
                        shard.index().display(),
                        report.truncations.len()
                    );
                }
                return Ok(report);
            }
            Some(Truncation::Index(len)) => (shard.index(), sizes.index, len),
            Some(Truncation::Data(len)) => (shard.data(), sizes.data, len),
        };

        warn!(
            "fixing {} alignment: {} -> {} bytes",
            path.display(),
            old_len,
            new_len
        );
        truncate(path, new_len)?;
        report.truncations.push(TruncatedFile {
            path: path.to_path_buf(),
            old_len,
            new_len,
        });
    }

    Err(Error::RepairDidNotConverge {
        path: shard.index().to_path_buf(),
        passes: MAX_REPAIR_PASSES,
    })
}
