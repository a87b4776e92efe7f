// src/job.rs

//! Archiving jobs
//!
//! A job covers every shard of one descriptor in one directory and produces
//! at most one archive. Its visible effect is all-or-nothing: either a sealed
//! archive holding every shard it processed, or no archive at all.
//!
//! # Job Lifecycle
//!
//! ```text
//! PENDING -> RUNNING -> COMPLETED   archive kept, sources handed back
//!                    -> EMPTY       no shard archived, archive removed
//!                    -> CANCELLED   cancellation observed, archive removed
//!                    -> FAILED      error, archive removed, error returned
//! ```

use crate::archive::{self, ArchiveWriter, SealedArchive};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::options::ArchiveOptions;
use crate::repair;
use crate::shard::Shard;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Job state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Queued, not started
    Pending,
    /// Processing shards
    Running,
    /// At least one shard archived, archive kept
    Completed,
    /// No valid shard found
    Empty,
    /// Stopped by cancellation
    Cancelled,
    /// Stopped by an error
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Only completed jobs leave an archive behind
    pub fn keeps_archive(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Empty => "empty",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a job that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Terminal state: `Completed`, `Empty` or `Cancelled`
    pub state: JobState,
    /// Sealed archive, present only when `Completed`
    pub archive: Option<PathBuf>,
    /// Source files stored in the archive; empty unless `Completed`
    pub consumed: BTreeSet<PathBuf>,
    /// Number of shards archived
    pub shards: usize,
    /// Number of truncations made by alignment repair
    pub truncations: usize,
}

impl JobOutcome {
    fn discarded(state: JobState, truncations: usize) -> Self {
        Self {
            state,
            archive: None,
            consumed: BTreeSet::new(),
            shards: 0,
            truncations,
        }
    }

    /// Outcome of a job that was cancelled before it started
    pub fn not_started() -> Self {
        Self::discarded(JobState::Cancelled, 0)
    }
}

/// All shards of one descriptor under one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    descriptor: Descriptor,
    directory: PathBuf,
    shards: Vec<PathBuf>,
}

impl Job {
    /// Create a job; index files are ordered by file name
    pub fn new(descriptor: Descriptor, directory: impl Into<PathBuf>, mut shards: Vec<PathBuf>) -> Self {
        shards.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
        Self {
            descriptor,
            directory: directory.into(),
            shards,
        }
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Index files, in processing order
    pub fn shards(&self) -> &[PathBuf] {
        &self.shards
    }

    /// Archive path for the job when `trigger` is its first valid shard
    pub fn archive_path(&self, options: &ArchiveOptions, trigger: &Path) -> Result<PathBuf> {
        let name = self
            .descriptor
            .archive_name(trigger, options.format.archive_extension())
            .ok_or_else(|| Error::NotInSourceTree {
                path: trigger.to_path_buf(),
                descriptor: self.descriptor.name().to_string(),
            })?;
        Ok(options
            .output_dir
            .join(self.descriptor.archive_directory(trigger))
            .join(name))
    }

    /// Archive every valid shard of the job
    ///
    /// Returns `Err` when the job fails; any archive it opened is gone by
    /// then. Sources are never deleted here.
    pub fn process(&self, options: &ArchiveOptions, cutoff: Option<SystemTime>) -> Result<JobOutcome> {
        self.process_with(options, cutoff, |_| {})
    }

    /// Like [`Job::process`], calling `on_shard` after each shard is
    /// appended to the archive
    pub fn process_with<F>(
        &self,
        options: &ArchiveOptions,
        cutoff: Option<SystemTime>,
        mut on_shard: F,
    ) -> Result<JobOutcome>
    where
        F: FnMut(&Shard),
    {
        debug!("{}: {} candidate shard(s)", self, self.shards.len());
        let mut run = JobRun::default();
        let result = run.archive_shards(self, options, cutoff, &mut on_shard);

        // Release the archive handle on every path before deciding its fate
        let sealed = run.writer.take().map(ArchiveWriter::finish);

        let sealed = match (result, sealed) {
            (Err(e), _) | (Ok(()), Some(Err(e))) => {
                run.discard_archive();
                return Err(e);
            }
            (Ok(()), sealed) => sealed.and_then(Result::ok),
        };

        if run.cancelled {
            run.discard_archive();
            info!("{}: cancelled", self);
            return Ok(JobOutcome::discarded(JobState::Cancelled, run.truncations));
        }

        let Some(sealed) = sealed.filter(|_| !run.archived.is_empty()) else {
            run.discard_archive();
            debug!("{}: nothing to archive", self);
            return Ok(JobOutcome::discarded(JobState::Empty, run.truncations));
        };

        if options.verify
            && let Err(e) = archive::verify(&sealed)
        {
            run.discard_archive();
            return Err(e);
        }

        Ok(run.completed(sealed))
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.descriptor.name(), self.directory.display())
    }
}

/// Mutable state of one `Job::process` call
#[derive(Default)]
struct JobRun {
    writer: Option<ArchiveWriter>,
    /// Set once this run created the archive file
    archive_path: Option<PathBuf>,
    archived: Vec<Shard>,
    cancelled: bool,
    truncations: usize,
}

impl JobRun {
    fn archive_shards<F>(
        &mut self,
        job: &Job,
        options: &ArchiveOptions,
        cutoff: Option<SystemTime>,
        on_shard: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&Shard),
    {
        for index in &job.shards {
            if options.is_cancelled() {
                self.cancelled = true;
                break;
            }

            let Some(shard) = Shard::from_index(index) else {
                continue;
            };
            if !shard.is_valid(cutoff) {
                continue;
            }

            if self.writer.is_none() {
                let path = job.archive_path(options, index)?;
                let writer = ArchiveWriter::create(&path, options.format, options.level)?;
                // Only an archive this run created may be discarded by it
                self.archive_path = Some(writer.path().to_path_buf());
                self.writer = Some(writer);
            }

            if options.fix_alignment {
                let report = repair::repair_shard(job.descriptor(), &shard)?;
                self.truncations += report.truncations.len();
                if report.emptied() {
                    warn!("{}: emptied by repair, skipping", index.display());
                    continue;
                }
            }

            if let Some(writer) = self.writer.as_mut() {
                writer.append_shard(&shard)?;
                on_shard(&shard);
                self.archived.push(shard);
            }
        }
        Ok(())
    }

    /// Remove the archive this run created, if any
    fn discard_archive(&mut self) {
        let Some(path) = self.archive_path.take() else {
            return;
        };
        match fs::remove_file(&path) {
            Ok(()) => debug!("removed archive {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove archive {}: {}", path.display(), e),
        }
    }

    fn completed(self, sealed: SealedArchive) -> JobOutcome {
        let consumed = self
            .archived
            .iter()
            .flat_map(|s| s.files())
            .map(Path::to_path_buf)
            .collect();
        JobOutcome {
            state: JobState::Completed,
            archive: Some(sealed.path),
            consumed,
            shards: self.archived.len(),
            truncations: self.truncations,
        }
    }
}
