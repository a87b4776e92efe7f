// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use filetime::FileTime;
use obarchive::{ArchiveOptions, Orchestrator, SilentReporter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Four days, safely past the default three-day cutoff
pub const STALE_AGE: Duration = Duration::from_secs(4 * 24 * 60 * 60);

/// Create `<tmp>/capture/<source>/ob/<market>`, deep enough for every
/// builtin layout rule.
pub fn market_dir(tmp: &TempDir, source: &str, market: &str) -> PathBuf {
    let dir = tmp.path().join("capture").join(source).join("ob").join(market);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write a shard pair and return the index path
pub fn write_shard(dir: &Path, stem: &str, index_len: usize, data_len: usize) -> PathBuf {
    let index = dir.join(format!("{}.mm.time", stem));
    fs::write(&index, vec![0xAB; index_len]).unwrap();
    fs::write(dir.join(format!("{}.mm", stem)), vec![0xCD; data_len]).unwrap();
    index
}

/// Companion data path of an index file
pub fn data_of(index: &Path) -> PathBuf {
    let name = index.file_name().unwrap().to_str().unwrap();
    index.with_file_name(name.trim_end_matches(".time"))
}

/// Backdate both files of a shard by `STALE_AGE`
pub fn make_stale(index: &Path) {
    let when = FileTime::from_system_time(SystemTime::now() - STALE_AGE);
    filetime::set_file_mtime(index, when).unwrap();
    filetime::set_file_mtime(data_of(index), when).unwrap();
}

/// Default options writing archives under `<tmp>/archives`
pub fn options(tmp: &TempDir) -> ArchiveOptions {
    ArchiveOptions::default().output_dir(tmp.path().join("archives"))
}

/// Orchestrator with a counting reporter
pub fn orchestrator(options: ArchiveOptions) -> (Orchestrator, Arc<SilentReporter>) {
    let reporter = Arc::new(SilentReporter::new());
    (Orchestrator::new(options).with_reporter(reporter.clone()), reporter)
}

/// Every file below `dir`, sorted
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
