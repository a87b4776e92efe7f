// src/lib.rs

//! Order-book shard archiver
//!
//! Capture processes write order-book snapshots as shard pairs: an index
//! file of 8-byte timestamps (`<id>.mm.time`) and a data file of packed
//! 4-byte elements (`<id>.mm`). This crate finds finished shards, optionally
//! repairs their alignment, bundles them into one compressed tar archive per
//! source directory, and removes the originals once the archive is sealed.
//!
//! # Architecture
//!
//! - Descriptors: one per exchange source, owning the layout rules and the
//!   data shape (`descriptor`)
//! - Jobs: all shards of one descriptor in one directory, all-or-nothing
//!   archive output (`job`)
//! - Orchestrator: bounded worker pool with cooperative cancellation
//!   (`orchestrator`)

pub mod archive;
pub mod compression;
pub mod descriptor;
pub mod discovery;
mod error;
pub mod job;
pub mod options;
pub mod orchestrator;
pub mod progress;
pub mod repair;
pub mod shard;

pub use compression::{CompressionError, CompressionFormat};
pub use descriptor::{Descriptor, DescriptorRegistry, Dim, Shape};
pub use discovery::discover;
pub use error::{Error, Result};
pub use job::{Job, JobOutcome, JobState};
pub use options::{ArchiveOptions, DEFAULT_MAX_AGE};
pub use orchestrator::{JobReport, Orchestrator, RunSummary};
pub use progress::{ConsoleReporter, LogReporter, RunReporter, SilentReporter};
pub use repair::{RepairReport, repair_shard};
pub use shard::{Shard, validate};
