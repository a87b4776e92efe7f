// src/options.rs
//! Options controlling an archiving run

use crate::compression::CompressionFormat;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

/// Default minimum shard age before it is archived (3 days)
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Options for an archiving run
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Shards modified less than this long ago are left alone (None = no age check)
    pub max_age: Option<Duration>,
    /// Keep source shards after they are archived
    pub keep_sources: bool,
    /// Truncate misaligned shards before archiving them
    pub fix_alignment: bool,
    /// Re-read each sealed archive before reporting it complete
    pub verify: bool,
    /// Directory under which per-descriptor archive directories are created
    pub output_dir: PathBuf,
    /// Archive compression
    pub format: CompressionFormat,
    /// Compression level (None = format default)
    pub level: Option<u32>,
    /// Number of worker threads (0 = available parallelism)
    pub workers: usize,
    /// Cancellation token shared with the interrupt handler
    pub cancel_token: Option<Arc<AtomicBool>>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            max_age: Some(DEFAULT_MAX_AGE),
            keep_sources: false,
            fix_alignment: false,
            verify: false,
            output_dir: PathBuf::from("."),
            format: CompressionFormat::Xz,
            level: None,
            workers: 0,
            cancel_token: None,
        }
    }
}

impl ArchiveOptions {
    /// Set the minimum shard age
    pub fn max_age(mut self, age: Option<Duration>) -> Self {
        self.max_age = age;
        self
    }

    /// Keep source shards after archiving
    pub fn keep_sources(mut self, keep: bool) -> Self {
        self.keep_sources = keep;
        self
    }

    /// Enable alignment repair
    pub fn fix_alignment(mut self, fix: bool) -> Self {
        self.fix_alignment = fix;
        self
    }

    /// Enable read-back verification
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Set the archive output root
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set archive compression and level
    pub fn compression(mut self, format: CompressionFormat, level: Option<u32>) -> Self {
        self.format = format;
        self.level = level;
        self
    }

    /// Set number of worker threads
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count;
        self
    }

    /// Set cancellation token
    pub fn with_cancel_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .map(|t| t.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Modification-time cutoff for a run started at `now`
    ///
    /// Shards must have been modified strictly before it.
    pub fn cutoff(&self, now: SystemTime) -> Option<SystemTime> {
        self.max_age
            .map(|age| now.checked_sub(age).unwrap_or(SystemTime::UNIX_EPOCH))
    }
}
