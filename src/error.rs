// src/error.rs

//! Error types for the shard archiver

use std::path::PathBuf;
use thiserror::Error;

/// Result type for archiver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a job or a run
///
/// Shard validation failures are not represented here: a shard that does
/// not validate is skipped, never reported.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O failure on a specific path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Another archive with the same name already exists
    #[error("archive already exists: {}", .0.display())]
    ArchiveExists(PathBuf),

    /// Alignment repair kept truncating past the pass limit
    #[error("repair of {} did not converge after {passes} passes", path.display())]
    RepairDidNotConverge { path: PathBuf, passes: usize },

    /// Index file does not sit under the descriptor's directory
    #[error("{} is not under a {descriptor} source directory", path.display())]
    NotInSourceTree { path: PathBuf, descriptor: String },

    /// Descriptor definition is unusable
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Discovery glob pattern failed to compile
    #[error("invalid glob pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    /// Sealed archive does not contain what was written into it
    #[error("verification of {} failed: {reason}", path.display())]
    Verification { path: PathBuf, reason: String },

    /// Archive compression setup failed
    #[error(transparent)]
    Compression(#[from] crate::compression::CompressionError),

    /// Worker pool could not be built
    #[error("worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attach a path to `std::io::Result` values
pub(crate) trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
