// src/discovery.rs

//! Shard discovery and job grouping
//!
//! Roots are walked for index-file candidates, each registered descriptor
//! claims the candidates that match its layout, and claimed files are
//! grouped into one [`Job`] per (descriptor, directory).

use crate::descriptor::{Descriptor, DescriptorRegistry};
use crate::error::Result;
use crate::job::Job;
use glob::Pattern;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Compile the distinct index-file patterns of every registered descriptor
pub fn index_patterns(registry: &DescriptorRegistry) -> Result<Vec<Pattern>> {
    let mut patterns: Vec<Pattern> = Vec::new();
    for descriptor in registry.iter() {
        let pattern = Pattern::new(descriptor.glob_pattern())?;
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }
    Ok(patterns)
}

/// Collect files under `roots` whose name matches any of `patterns`,
/// sorted by file name
///
/// A root may also be a single file. Unreadable entries are skipped with a
/// warning.
pub fn collect_candidates(roots: &[PathBuf], patterns: &[Pattern]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for root in roots {
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let matched = entry
                .file_name()
                .to_str()
                .is_some_and(|name| patterns.iter().any(|p| p.matches(name)));
            if matched {
                files.push(entry.into_path());
            }
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
    files.dedup();
    debug!("found {} candidate index file(s)", files.len());
    Ok(files)
}

/// Group candidates into jobs
///
/// Descriptors claim files in registration order and a file belongs to at
/// most one job. Jobs come out ordered by descriptor, then directory.
pub fn group_jobs(registry: &DescriptorRegistry, candidates: &[PathBuf]) -> Vec<Job> {
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut groups: BTreeMap<(usize, PathBuf), Vec<PathBuf>> = BTreeMap::new();

    for (position, descriptor) in registry.iter().enumerate() {
        for file in descriptor.list_files(candidates) {
            let Some(directory) = file.parent().map(Path::to_path_buf) else {
                continue;
            };
            if !claimed.insert(file.clone()) {
                warn!("{} already claimed by another source", file.display());
                continue;
            }
            groups.entry((position, directory)).or_default().push(file);
        }
    }

    let descriptors: Vec<&Descriptor> = registry.iter().collect();
    groups
        .into_iter()
        .map(|((position, directory), files)| {
            Job::new(descriptors[position].clone(), directory, files)
        })
        .collect()
}

/// Walk `roots` and build the jobs for every registered descriptor
pub fn discover(registry: &DescriptorRegistry, roots: &[PathBuf]) -> Result<Vec<Job>> {
    let patterns = index_patterns(registry)?;
    let candidates = collect_candidates(roots, &patterns)?;
    Ok(group_jobs(registry, &candidates))
}
