// src/cli.rs
//! CLI definitions for the shard archiver
//!
//! The command implementation lives in the `commands` module.

use clap::Parser;
use obarchive::{
    ArchiveOptions, CompressionError, CompressionFormat, ConsoleReporter, DEFAULT_MAX_AGE,
    LogReporter, RunReporter,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "obarchive")]
#[command(version)]
#[command(about = "Archive finished order-book shards into compressed tarballs", long_about = None)]
pub struct Cli {
    /// Minimum age in seconds of a shard's last modification before it is archived
    #[arg(long = "time", value_name = "SECONDS", default_value_t = DEFAULT_MAX_AGE.as_secs_f64(), value_parser = parse_age)]
    pub time: f64,

    /// Keep source shards after archiving them
    #[arg(short, long)]
    pub keep: bool,

    /// Truncate misaligned shards before archiving them
    #[arg(long)]
    pub fix: bool,

    /// Number of worker threads (0 = one per CPU)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Directory under which per-source archive directories are created
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Archive compression: xz, gzip, zstd or none
    #[arg(long, default_value = "xz")]
    pub compression: CompressionFormat,

    /// Compression level (default depends on the format)
    #[arg(long)]
    pub level: Option<u32>,

    /// Re-read each archive and check its members before deleting sources
    #[arg(long)]
    pub verify: bool,

    /// Log debug output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Report progress through the log instead of stdout
    #[arg(long)]
    pub log_progress: bool,

    /// Directories (or index files) to scan
    #[arg(default_value = ".")]
    pub roots: Vec<PathBuf>,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Progress reporter selected by `--log-progress`
    pub fn reporter(&self) -> Arc<dyn RunReporter> {
        if self.log_progress {
            Arc::new(LogReporter)
        } else {
            Arc::new(ConsoleReporter)
        }
    }

    /// Build run options from the parsed flags
    pub fn to_options(&self) -> Result<ArchiveOptions, CompressionError> {
        if let Some(level) = self.level {
            self.compression.check_level(level)?;
        }
        Ok(ArchiveOptions::default()
            .max_age(Some(Duration::from_secs_f64(self.time)))
            .keep_sources(self.keep)
            .fix_alignment(self.fix)
            .verify(self.verify)
            .output_dir(&self.output_dir)
            .compression(self.compression, self.level)
            .workers(self.jobs))
    }
}

/// Parse `--time`, rejecting values a `Duration` cannot hold
fn parse_age(s: &str) -> Result<f64, String> {
    let secs: f64 = s.parse().map_err(|e| format!("invalid number '{}': {}", s, e))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("age must be a non-negative number of seconds, got {}", s));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("age out of range: {}", e))?;
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["obarchive"]).unwrap();
        assert_eq!(cli.time, 259_200.0);
        assert!(!cli.keep && !cli.fix && !cli.verify && !cli.log_progress);
        assert_eq!(cli.compression, CompressionFormat::Xz);
        assert_eq!(cli.roots, vec![PathBuf::from(".")]);
        assert_eq!(cli.log_level(), "info");

        let opts = cli.to_options().unwrap();
        assert_eq!(opts.max_age, Some(DEFAULT_MAX_AGE));
        assert!(!opts.keep_sources);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "obarchive", "--time", "0.5", "-k", "--fix", "-j", "4", "-o", "/out",
            "--compression", "zstd", "--level", "19", "--verify", "-v", "/a", "/b",
        ])
        .unwrap();
        assert_eq!(cli.roots, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(cli.log_level(), "debug");

        let opts = cli.to_options().unwrap();
        assert_eq!(opts.max_age, Some(Duration::from_millis(500)));
        assert!(opts.keep_sources && opts.fix_alignment && opts.verify);
        assert_eq!(opts.workers, 4);
        assert_eq!(opts.output_dir, PathBuf::from("/out"));
        assert_eq!(opts.format, CompressionFormat::Zstd);
        assert_eq!(opts.level, Some(19));
    }

    #[test]
    fn test_log_progress_flag() {
        let cli = Cli::try_parse_from(["obarchive", "--log-progress", "-q"]).unwrap();
        assert!(cli.log_progress);
        assert_eq!(cli.log_level(), "warn");
    }

    #[test]
    fn test_rejects_bad_age() {
        assert!(Cli::try_parse_from(["obarchive", "--time", "-1"]).is_err());
        assert!(Cli::try_parse_from(["obarchive", "--time", "inf"]).is_err());
        assert!(Cli::try_parse_from(["obarchive", "--time", "soon"]).is_err());
        assert!(Cli::try_parse_from(["obarchive", "--time", "0"]).is_ok());
    }

    #[test]
    fn test_rejects_bad_level() {
        let cli = Cli::try_parse_from(["obarchive", "--level", "42"]).unwrap();
        assert!(cli.to_options().is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["obarchive", "-v", "-q"]).is_err());
    }
}
