// src/archive.rs

//! Exclusive, per-job archive files
//!
//! An [`ArchiveWriter`] owns one archive file from exclusive creation to
//! sealing. Members are added under their base name only. A writer that is
//! dropped without being finished removes its partial file.

use crate::compression::{self, CompressionFormat, Encoder};
use crate::error::{Error, IoResultExt, Result};
use crate::shard::Shard;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An archive that was closed successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedArchive {
    pub path: PathBuf,
    pub format: CompressionFormat,
    /// Member names in the order they were appended
    pub members: Vec<String>,
}

/// Writer for a single compressed tar archive
pub struct ArchiveWriter {
    path: PathBuf,
    format: CompressionFormat,
    builder: Option<tar::Builder<Encoder<File>>>,
    members: Vec<String>,
}

impl ArchiveWriter {
    /// Create the archive file, failing if it already exists
    ///
    /// Missing parent directories are created.
    pub fn create(path: &Path, format: CompressionFormat, level: Option<u32>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_path(parent)?;
        }

        let file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(Error::ArchiveExists(path.to_path_buf()));
            }
            Err(e) => return Err(Error::io(path, e)),
        };

        let encoder = match compression::create_encoder(file, format, level) {
            Ok(encoder) => encoder,
            Err(e) => {
                // The file is ours, nothing has been written to it yet
                let _ = fs::remove_file(path);
                return Err(e.into());
            }
        };

        let mut builder = tar::Builder::new(encoder);
        builder.mode(tar::HeaderMode::Complete);
        debug!("opened archive {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            format,
            builder: Some(builder),
            members: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Append a file as a top-level member named after its base name
    pub fn append_file(&mut self, source: &Path) -> Result<()> {
        let name = source
            .file_name()
            .ok_or_else(|| Error::io(source, io::Error::other("path has no file name")))?;
        let builder = self
            .builder
            .as_mut()
            .ok_or_else(|| Error::io(&self.path, io::Error::other("archive already closed")))?;

        builder.append_path_with_name(source, name).with_path(source)?;
        self.members.push(name.to_string_lossy().into_owned());
        Ok(())
    }

    /// Append both files of a shard, index first
    pub fn append_shard(&mut self, shard: &Shard) -> Result<()> {
        for file in shard.files() {
            self.append_file(file)?;
        }
        Ok(())
    }

    /// Write the tar trailer, flush the compressed stream and sync the file
    pub fn finish(mut self) -> Result<SealedArchive> {
        let builder = self
            .builder
            .take()
            .ok_or_else(|| Error::io(&self.path, io::Error::other("archive already closed")))?;

        let encoder = builder.into_inner().with_path(&self.path)?;
        let file = encoder.finish().with_path(&self.path)?;
        file.sync_all().with_path(&self.path)?;

        Ok(SealedArchive {
            path: std::mem::take(&mut self.path),
            format: self.format,
            members: std::mem::take(&mut self.members),
        })
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        // Only an unfinished writer still holds its builder
        if let Some(builder) = self.builder.take() {
            drop(builder);
            if let Err(e) = fs::remove_file(&self.path)
                && e.kind() != io::ErrorKind::NotFound
            {
                warn!("failed to remove partial archive {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Read the member names of an archive, detecting its compression
pub fn list_members(path: &Path) -> Result<Vec<String>> {
    let mut file = File::open(path).with_path(path)?;

    let mut magic = Vec::with_capacity(6);
    (&mut file).take(6).read_to_end(&mut magic).with_path(path)?;
    file.seek(SeekFrom::Start(0)).with_path(path)?;

    let format = CompressionFormat::from_magic_bytes(&magic);
    let decoder = compression::create_decoder(BufReader::new(file), format)?;
    let mut archive = tar::Archive::new(decoder);

    let mut names = Vec::new();
    for entry in archive.entries().with_path(path)? {
        let entry = entry.with_path(path)?;
        let name = entry.path().with_path(path)?;
        names.push(name.to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Check that a sealed archive reads back with exactly the appended members
pub fn verify(sealed: &SealedArchive) -> Result<()> {
    let found = list_members(&sealed.path)?;
    if found != sealed.members {
        return Err(Error::Verification {
            path: sealed.path.clone(),
            reason: format!(
                "expected {} member(s) {:?}, found {:?}",
                sealed.members.len(),
                sealed.members,
                found
            ),
        });
    }
    debug!(
        "verified {} ({} members, {})",
        sealed.path.display(),
        found.len(),
        sealed.format
    );
    Ok(())
}
