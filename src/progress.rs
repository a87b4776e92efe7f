// src/progress.rs

//! Run progress reporting
//!
//! The orchestrator reports through the `RunReporter` trait so that the same
//! run can print to a terminal, log through tracing, or stay silent in tests.
//! Implementations include:
//! - `ConsoleReporter`: progress on stdout, failures on stderr
//! - `LogReporter`: everything through tracing
//! - `SilentReporter`: counts events only

use crate::error::Error;
use crate::job::{Job, JobState};
use crate::orchestrator::RunSummary;
use crate::shard::Shard;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info};

/// Receiver of run events
///
/// Implementations must be thread-safe: job events arrive from worker
/// threads concurrently.
pub trait RunReporter: Send + Sync {
    /// Discovery finished with `count` jobs
    fn jobs_discovered(&self, count: usize);

    /// A shard was appended to its job's archive
    fn shard_archived(&self, job: &Job, shard: &Shard);

    /// A job sealed its archive
    fn archive_created(&self, job: &Job, archive: &Path);

    /// A job ended without an archive and without an error
    fn job_discarded(&self, job: &Job, state: JobState);

    /// A job failed; its archive (if any) is already gone
    fn job_failed(&self, job: &Job, error: &Error);

    /// The pool drained
    fn run_finished(&self, summary: &RunSummary);
}

/// Human-readable terminal output
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl RunReporter for ConsoleReporter {
    fn jobs_discovered(&self, count: usize) {
        println!("there's {} jobs", count);
    }

    fn shard_archived(&self, _job: &Job, _shard: &Shard) {}

    fn archive_created(&self, _job: &Job, archive: &Path) {
        println!("created {}", archive.display());
    }

    fn job_discarded(&self, _job: &Job, _state: JobState) {}

    fn job_failed(&self, job: &Job, error: &Error) {
        eprintln!("{} ({})", error, job);
    }

    fn run_finished(&self, summary: &RunSummary) {
        println!(
            "{} completed, {} empty, {} cancelled, {} failed; {} source file(s) removed",
            summary.count(JobState::Completed),
            summary.count(JobState::Empty),
            summary.count(JobState::Cancelled),
            summary.count(JobState::Failed),
            summary.removed_sources()
        );
    }
}

/// Reports through tracing at info/error level
#[derive(Debug, Default)]
pub struct LogReporter;

impl RunReporter for LogReporter {
    fn jobs_discovered(&self, count: usize) {
        info!("{} job(s) to run", count);
    }

    fn shard_archived(&self, job: &Job, shard: &Shard) {
        debug!("{}: archived shard {}", job, shard.id());
    }

    fn archive_created(&self, job: &Job, archive: &Path) {
        info!("{}: created {}", job, archive.display());
    }

    fn job_discarded(&self, job: &Job, state: JobState) {
        info!("{}: {}", job, state);
    }

    fn job_failed(&self, job: &Job, error: &Error) {
        error!("{}: {}", job, error);
    }

    fn run_finished(&self, summary: &RunSummary) {
        info!(
            "run finished: {} completed, {} failed",
            summary.count(JobState::Completed),
            summary.count(JobState::Failed)
        );
    }
}

/// Counts events without printing anything
#[derive(Debug, Default)]
pub struct SilentReporter {
    discovered: AtomicUsize,
    shards: AtomicUsize,
    created: AtomicUsize,
    discarded: AtomicUsize,
    failed: AtomicUsize,
}

impl SilentReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn discovered(&self) -> usize {
        self.discovered.load(Ordering::Relaxed)
    }

    /// Shards appended across all jobs
    pub fn shards(&self) -> usize {
        self.shards.load(Ordering::Relaxed)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

impl RunReporter for SilentReporter {
    fn jobs_discovered(&self, count: usize) {
        self.discovered.store(count, Ordering::Relaxed);
    }

    fn shard_archived(&self, _job: &Job, _shard: &Shard) {
        self.shards.fetch_add(1, Ordering::Relaxed);
    }

    fn archive_created(&self, _job: &Job, _archive: &Path) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    fn job_discarded(&self, _job: &Job, _state: JobState) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    fn job_failed(&self, _job: &Job, _error: &Error) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn run_finished(&self, _summary: &RunSummary) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Descriptor, Shape};

    fn job() -> Job {
        Job::new(
            Descriptor::new("Binance", Shape::leading_variable(&[1]).unwrap(), ["p"]),
            "/d",
            Vec::new(),
        )
    }

    #[test]
    fn test_silent_reporter_counts() {
        let job = job();
        let shard = Shard::from_index("/d/0001.mm.time").unwrap();
        let reporter = SilentReporter::new();
        reporter.jobs_discovered(3);
        reporter.shard_archived(&job, &shard);
        reporter.shard_archived(&job, &shard);
        reporter.archive_created(&job, Path::new("/a.tar.xz"));
        reporter.job_discarded(&job, JobState::Empty);
        let exists = Error::ArchiveExists("/a.tar.xz".into());
        reporter.job_failed(&job, &exists);
        reporter.job_failed(&job, &exists);

        assert_eq!(reporter.discovered(), 3);
        assert_eq!(reporter.shards(), 2);
        assert_eq!(reporter.created(), 1);
        assert_eq!(reporter.discarded(), 1);
        assert_eq!(reporter.failed(), 2);
    }

    #[test]
    fn test_log_reporter_accepts_every_event() {
        let reporter: Box<dyn RunReporter> = Box::new(LogReporter);
        let job = job();
        reporter.jobs_discovered(1);
        reporter.shard_archived(&job, &Shard::from_index("/d/0001.mm.time").unwrap());
        reporter.archive_created(&job, Path::new("/a.tar.xz"));
        reporter.job_discarded(&job, JobState::Cancelled);
        reporter.job_failed(&job, &Error::ArchiveExists("/a.tar.xz".into()));
        reporter.run_finished(&RunSummary::default());
    }
}
