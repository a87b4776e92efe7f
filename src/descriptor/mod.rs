// src/descriptor/mod.rs

//! Per-source shard descriptors
//!
//! A descriptor names one capture source (e.g. `Binance`) and knows:
//!
//! - which files under a root belong to it (path matching),
//! - the matrix shape of its data files (one variable dimension),
//! - how archives of its shards are named and where they are stored.
//!
//! Expected layout of a matched index file:
//!
//! ```text
//! <at least two levels>/<name>/ob/<...>/0NNNNNNN.mm.time
//! ```

mod registry;

pub use registry::DescriptorRegistry;

use crate::error::{Error, Result};
use crate::shard;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Glob applied to file names to pick index-file candidates
pub const INDEX_GLOB: &str = "0*.mm.time";

/// Name of the directory nested directly inside the descriptor directory
pub const ORDERBOOK_DIR: &str = "ob";

/// Default archive extension
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "tar.xz";

/// Number of ancestor levels (the filesystem or working-directory anchor
/// included) that must sit above the descriptor directory.
const MIN_LEVELS_ABOVE: usize = 3;

/// One dimension of a data-file shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Resolved from the index file's record count
    Variable,
    /// Fixed extent
    Fixed(u64),
}

/// Shape of a data-file matrix with exactly one variable dimension
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<Dim>,
}

impl Shape {
    /// Build a shape, checking there is exactly one variable dimension and
    /// that no fixed dimension is zero
    pub fn new(dims: Vec<Dim>) -> Result<Self> {
        let variable = dims.iter().filter(|d| matches!(d, Dim::Variable)).count();
        if variable != 1 {
            return Err(Error::InvalidDescriptor(format!(
                "shape must have exactly one variable dimension, found {}",
                variable
            )));
        }
        if dims.contains(&Dim::Fixed(0)) {
            return Err(Error::InvalidDescriptor(
                "shape has a zero-sized dimension".to_string(),
            ));
        }
        Ok(Self { dims })
    }

    /// Shape whose leading dimension is variable, e.g. `(-1, 256, 8)`
    pub fn leading_variable(fixed: &[u64]) -> Result<Self> {
        let mut dims = Vec::with_capacity(fixed.len() + 1);
        dims.push(Dim::Variable);
        dims.extend(fixed.iter().map(|&n| Dim::Fixed(n)));
        Self::new(dims)
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    /// Substitute the variable dimension with `elements`
    pub fn resolve(&self, elements: u64) -> Vec<u64> {
        self.dims
            .iter()
            .map(|d| match d {
                Dim::Variable => elements,
                Dim::Fixed(n) => *n,
            })
            .collect()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .dims
            .iter()
            .map(|d| match d {
                Dim::Variable => "-1".to_string(),
                Dim::Fixed(n) => n.to_string(),
            })
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// Schema and path-matching rules for one capture source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    name: String,
    shape: Shape,
    columns: Vec<String>,
}

impl Descriptor {
    pub fn new<I, S>(name: impl Into<String>, shape: Shape, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            shape,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Copy of this descriptor matching a different source directory
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Column names of the innermost dimension (informational only)
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn glob_pattern(&self) -> &'static str {
        INDEX_GLOB
    }

    /// Shape of a data file holding `elements` index records
    pub fn compute_shape(&self, elements: u64) -> Vec<u64> {
        self.shape.resolve(elements)
    }

    /// Position of this descriptor's directory among the file's ancestors,
    /// nearest first, if the path satisfies the layout rules
    fn anchor_index(&self, ancestors: &[&OsStr]) -> Option<usize> {
        let index = ancestors.iter().position(|n| *n == OsStr::new(&self.name))?;

        // Named directories above, plus the filesystem root or working directory
        let levels_above = ancestors.len() - index;
        if levels_above < MIN_LEVELS_ABOVE {
            return None;
        }

        if index == 0 || ancestors[index - 1] != OsStr::new(ORDERBOOK_DIR) {
            return None;
        }

        Some(index)
    }

    /// Whether `file` is an index file belonging to this source
    ///
    /// Checks the ancestor layout, the `0`-prefixed numeric stem and the
    /// presence of the companion data file.
    pub fn matches(&self, file: &Path) -> bool {
        let ancestors = ancestor_names(file);
        if self.anchor_index(&ancestors).is_none() {
            return false;
        }

        let Some(stem) = shard::index_stem(file) else {
            return false;
        };
        if !stem.starts_with('0') || !shard::is_numeric_stem(stem) {
            return false;
        }

        shard::data_path(file).is_some_and(|p| p.exists())
    }

    /// Filter `files` down to the ones matching this descriptor, keeping the
    /// caller's order
    pub fn list_files<'a, I>(&self, files: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        files
            .into_iter()
            .filter(|f| self.matches(f))
            .cloned()
            .collect()
    }

    /// Archive file name for the job triggered by `file`
    ///
    /// Joins the directory names from this descriptor's directory down to
    /// the file's parent, then the shard id, with `_`:
    /// `<name>/ob/m1/0000000001.mm.time` gives `<name>_ob_m1_0000000001.<ext>`.
    pub fn archive_name(&self, file: &Path, ext: &str) -> Option<String> {
        let ancestors = ancestor_names(file);
        let index = ancestors
            .iter()
            .position(|n| *n == OsStr::new(&self.name))?;
        let stem = shard::index_stem(file)?;

        let mut parts: Vec<String> = ancestors[..=index]
            .iter()
            .rev()
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        parts.push(stem.to_string());

        Some(format!("{}.{}", parts.join("_"), ext))
    }

    /// Directory the archive is stored in, relative to the output root
    pub fn archive_directory(&self, _file: &Path) -> &str {
        &self.name
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor({})", self.name)
    }
}

/// Names of the directories containing `path`, nearest first
///
/// `.` components are dropped and the root/prefix is not a name, so
/// `./a/b/f` and `a/b/f` both give `[b, a]`.
fn ancestor_names(path: &Path) -> Vec<&OsStr> {
    let Some(parent) = path.parent() else {
        return Vec::new();
    };
    let mut names: Vec<&OsStr> = parent
        .components()
        .filter_map(|c| match c {
            Component::Normal(n) => Some(n),
            Component::ParentDir => Some(c.as_os_str()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => None,
        })
        .collect();
    names.reverse();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn binance() -> Descriptor {
        Descriptor::new(
            "Binance",
            Shape::leading_variable(&[256, 8]).unwrap(),
            ["price", "size"],
        )
    }

    fn touch_shard(dir: &Path, stem: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let index = dir.join(format!("{}.mm.time", stem));
        fs::write(&index, [0u8; 8]).unwrap();
        fs::write(dir.join(format!("{}.mm", stem)), [0u8; 4]).unwrap();
        index
    }

    #[test]
    fn test_shape_validation() {
        assert!(Shape::new(vec![Dim::Fixed(2), Dim::Fixed(3)]).is_err());
        assert!(Shape::new(vec![Dim::Variable, Dim::Variable]).is_err());
        assert!(Shape::new(vec![Dim::Variable, Dim::Fixed(0)]).is_err());
        assert!(Shape::new(vec![Dim::Fixed(4), Dim::Variable]).is_ok());
    }

    #[test]
    fn test_compute_shape() {
        let d = binance();
        assert_eq!(d.compute_shape(12), vec![12, 256, 8]);

        let inner = Descriptor::new(
            "X",
            Shape::new(vec![Dim::Fixed(3), Dim::Variable, Dim::Fixed(2)]).unwrap(),
            Vec::<String>::new(),
        );
        assert_eq!(inner.compute_shape(5), vec![3, 5, 2]);
        assert_eq!(inner.shape().to_string(), "(3, -1, 2)");
    }

    #[test]
    fn test_with_name_only_changes_name() {
        let base = binance();
        let futures = base.with_name("BinanceFutures");
        assert_eq!(futures.name(), "BinanceFutures");
        assert_eq!(futures.shape(), base.shape());
        assert_eq!(futures.columns(), base.columns());
        assert_eq!(futures.to_string(), "Descriptor(BinanceFutures)");
    }

    #[test]
    fn test_matches_expected_layout() {
        let tmp = TempDir::new().unwrap();
        let index = touch_shard(&tmp.path().join("data/Binance/ob/m1"), "0000000001");
        assert!(binance().matches(&index));
    }

    #[test]
    fn test_rejects_shallow_paths() {
        // Relative path with the descriptor directory one level below the anchor
        let d = binance();
        assert!(d.anchor_index(&ancestor_names(Path::new("root/Binance/ob/m1/0001.mm.time"))).is_none());
        assert!(d.anchor_index(&ancestor_names(Path::new("x/root/Binance/ob/m1/0001.mm.time"))).is_some());
        assert!(d.anchor_index(&ancestor_names(Path::new("/root/Binance/ob/0001.mm.time"))).is_none());
        assert!(d.anchor_index(&ancestor_names(Path::new("/x/root/Binance/ob/0001.mm.time"))).is_some());
        // Leading `./` does not add a level
        assert!(d.anchor_index(&ancestor_names(Path::new("./root/Binance/ob/m1/0001.mm.time"))).is_none());
    }

    #[test]
    fn test_requires_ob_directory() {
        let tmp = TempDir::new().unwrap();
        let d = binance();

        let wrong = touch_shard(&tmp.path().join("data/Binance/trades/m1"), "0000000001");
        assert!(!d.matches(&wrong));

        // Directly inside the descriptor directory: nothing in between
        let direct = touch_shard(&tmp.path().join("data/Binance"), "0000000002");
        assert!(!d.matches(&direct));

        // `ob` must be the child of the descriptor directory, not deeper
        let deep = touch_shard(&tmp.path().join("data/Binance/x/ob"), "0000000003");
        assert!(!d.matches(&deep));
    }

    #[test]
    fn test_requires_numeric_zero_prefixed_stem() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("data/Binance/ob/m1");
        let d = binance();

        assert!(!d.matches(&touch_shard(&dir, "1000")));
        assert!(!d.matches(&touch_shard(&dir, "00a1")));
        assert!(d.matches(&touch_shard(&dir, "0042")));
    }

    #[test]
    fn test_requires_companion() {
        let tmp = TempDir::new().unwrap();
        let index = touch_shard(&tmp.path().join("data/Binance/ob/m1"), "0000000001");
        fs::remove_file(index.with_file_name("0000000001.mm")).unwrap();
        assert!(!binance().matches(&index));
    }

    #[test]
    fn test_other_descriptor_does_not_match() {
        let tmp = TempDir::new().unwrap();
        let index = touch_shard(&tmp.path().join("data/Binance/ob/m1"), "0000000001");
        assert!(!binance().with_name("Bitfinex").matches(&index));
    }

    #[test]
    fn test_list_files_keeps_order() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("data/Binance/ob/m1");
        let b = touch_shard(&dir, "0002");
        let a = touch_shard(&dir, "0001");
        let bad = touch_shard(&dir, "9999");

        let files = vec![b.clone(), bad, a.clone()];
        assert_eq!(binance().list_files(&files), vec![b, a]);
    }

    #[test]
    fn test_archive_name() {
        let d = binance();
        let file = Path::new("/srv/capture/Binance/ob/m1/0000000001.mm.time");
        assert_eq!(
            d.archive_name(file, DEFAULT_ARCHIVE_EXTENSION).unwrap(),
            "Binance_ob_m1_0000000001.tar.xz"
        );

        let nested = Path::new("/srv/capture/Binance/ob/btc/usdt/0000000007.mm.time");
        assert_eq!(
            d.archive_name(nested, "tar.zst").unwrap(),
            "Binance_ob_btc_usdt_0000000007.tar.zst"
        );

        assert!(d.archive_name(Path::new("/srv/other/ob/0001.mm.time"), "tar.xz").is_none());
    }

    #[test]
    fn test_archive_directory_is_flat() {
        let d = binance();
        let file = Path::new("/srv/capture/Binance/ob/m1/0000000001.mm.time");
        assert_eq!(d.archive_directory(file), "Binance");
    }
}
