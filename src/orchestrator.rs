// src/orchestrator.rs

//! Parallel job execution
//!
//! Jobs run on a fixed-size rayon pool and share nothing but the
//! cancellation token in [`ArchiveOptions`]. Once cancellation is requested,
//! jobs that have not started report `Cancelled` without touching the disk
//! and running jobs stop before their next shard. Sources of a job are
//! removed only after it reached `Completed`, and only when they are not
//! kept.

use crate::error::{Error, Result};
use crate::job::{Job, JobOutcome, JobState};
use crate::options::ArchiveOptions;
use crate::progress::{ConsoleReporter, RunReporter};
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Final report for one job
#[derive(Debug)]
pub struct JobReport {
    /// Descriptor name
    pub descriptor: String,
    /// Directory the job covered
    pub directory: PathBuf,
    pub state: JobState,
    /// Sealed archive, only for completed jobs
    pub archive: Option<PathBuf>,
    /// Shards stored in the archive
    pub shards: usize,
    /// Source files deleted after archiving
    pub removed: usize,
    /// Error of a failed job
    pub error: Option<Error>,
}

impl JobReport {
    fn new(job: &Job, state: JobState) -> Self {
        Self {
            descriptor: job.descriptor().name().to_string(),
            directory: job.directory().to_path_buf(),
            state,
            archive: None,
            shards: 0,
            removed: 0,
            error: None,
        }
    }
}

/// Reports of all jobs of a run, in job order
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<JobReport>,
    /// Cancellation was requested at some point during the run
    pub cancelled: bool,
}

impl RunSummary {
    /// Number of jobs that ended in `state`
    pub fn count(&self, state: JobState) -> usize {
        self.reports.iter().filter(|r| r.state == state).count()
    }

    /// Archives left on disk by the run
    pub fn archives(&self) -> impl Iterator<Item = &Path> {
        self.reports.iter().filter_map(|r| r.archive.as_deref())
    }

    pub fn removed_sources(&self) -> usize {
        self.reports.iter().map(|r| r.removed).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.reports.iter().filter(|r| r.state == JobState::Failed)
    }
}

/// Runs jobs concurrently and cleans up after completed ones
pub struct Orchestrator {
    options: ArchiveOptions,
    reporter: Arc<dyn RunReporter>,
}

impl Orchestrator {
    /// Create an orchestrator reporting to the terminal
    pub fn new(options: ArchiveOptions) -> Self {
        Self {
            options,
            reporter: Arc::new(ConsoleReporter),
        }
    }

    /// Use a different reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run every job and collect their reports
    ///
    /// Individual job failures are reported, not returned; `Err` means the
    /// pool itself could not be set up.
    pub fn run(&self, jobs: &[Job]) -> Result<RunSummary> {
        self.reporter.jobs_discovered(jobs.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .thread_name(|i| format!("obarchive-{}", i))
            .build()?;

        let cutoff = self.options.cutoff(SystemTime::now());
        debug!(
            "running {} job(s) on {} worker(s)",
            jobs.len(),
            pool.current_num_threads()
        );

        let reports = pool.install(|| {
            jobs.par_iter()
                .map(|job| self.run_job(job, cutoff))
                .collect::<Vec<_>>()
        });

        let summary = RunSummary {
            reports,
            cancelled: self.options.is_cancelled(),
        };
        self.reporter.run_finished(&summary);
        Ok(summary)
    }

    fn run_job(&self, job: &Job, cutoff: Option<SystemTime>) -> JobReport {
        // Never start a job once cancellation is requested
        let result = if self.options.is_cancelled() {
            Ok(JobOutcome::not_started())
        } else {
            job.process_with(&self.options, cutoff, |shard| {
                self.reporter.shard_archived(job, shard)
            })
        };

        match result {
            Ok(outcome) => self.finish_job(job, outcome),
            Err(error) => {
                self.reporter.job_failed(job, &error);
                let mut report = JobReport::new(job, JobState::Failed);
                report.error = Some(error);
                report
            }
        }
    }

    fn finish_job(&self, job: &Job, outcome: JobOutcome) -> JobReport {
        let mut report = JobReport::new(job, outcome.state);
        report.shards = outcome.shards;

        let Some(archive) = outcome.archive.filter(|_| outcome.state.keeps_archive()) else {
            self.reporter.job_discarded(job, outcome.state);
            return report;
        };

        if !self.options.keep_sources {
            report.removed = remove_sources(outcome.consumed.iter().map(PathBuf::as_path));
        }
        self.reporter.archive_created(job, &archive);
        report.archive = Some(archive);
        report
    }
}

/// Delete archived source files, returning how many were removed
///
/// Files already gone are not an error; other failures are logged and
/// leave the file in place.
pub fn remove_sources<'a>(files: impl IntoIterator<Item = &'a Path>) -> usize {
    let mut removed = 0;
    for file in files {
        debug!("unlinking {}", file.display());
        match fs::remove_file(file) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {}", file.display(), e),
        }
    }
    removed
}
