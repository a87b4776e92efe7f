// src/compression/mod.rs
//! Compression formats for shard archives
//!
//! Archives are tar streams wrapped in one of the formats below; xz is the
//! default. Encoders seal new archives, decoders read them back for
//! verification.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use thiserror::Error;

/// Compression-related errors
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Failed to create {format} encoder: {source}")]
    EncoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to create {format} decoder: {source}")]
    DecoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("Invalid {format} compression level {level} (expected {min}..={max})")]
    InvalidLevel {
        format: &'static str,
        level: u32,
        min: u32,
        max: u32,
    },

    #[error("Unsupported compression format: {0}")]
    UnsupportedFormat(String),
}

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionFormat {
    /// No compression (plain tar)
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// XZ/LZMA compression (.xz)
    #[default]
    Xz,
    /// Zstandard compression (.zst)
    Zstd,
}

impl CompressionFormat {
    /// Detect compression format from magic bytes
    ///
    /// Magic bytes:
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00` (FD + "7zXZ" + NUL)
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Self::Xz
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Extension of a tar archive in this format, without the leading dot
    pub fn archive_extension(&self) -> &'static str {
        match self {
            Self::None => "tar",
            Self::Gzip => "tar.gz",
            Self::Xz => "tar.xz",
            Self::Zstd => "tar.zst",
        }
    }

    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }

    /// Level used when none is requested
    pub fn default_level(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Gzip | Self::Xz => 6,
            Self::Zstd => 3,
        }
    }

    fn level_range(&self) -> (u32, u32) {
        match self {
            Self::None => (0, 0),
            Self::Gzip | Self::Xz => (0, 9),
            Self::Zstd => (1, 22),
        }
    }

    /// Check a requested level against what the format accepts
    pub fn check_level(&self, level: u32) -> Result<u32, CompressionError> {
        let (min, max) = self.level_range();
        if (min..=max).contains(&level) {
            Ok(level)
        } else {
            Err(CompressionError::InvalidLevel {
                format: self.name(),
                level,
                min,
                max,
            })
        }
    }
}

impl fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CompressionFormat {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "tar" => Ok(Self::None),
            "gzip" | "gz" => Ok(Self::Gzip),
            "xz" | "lzma" => Ok(Self::Xz),
            "zstd" | "zst" => Ok(Self::Zstd),
            other => Err(CompressionError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Compressing writer for one of the supported formats
pub enum Encoder<W: Write> {
    None(W),
    Gzip(flate2::write::GzEncoder<W>),
    Xz(xz2::write::XzEncoder<W>),
    Zstd(zstd::Encoder<'static, W>),
}

impl<W: Write> Encoder<W> {
    /// Flush the compressed stream trailer and hand back the inner writer
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::None(mut w) => {
                w.flush()?;
                Ok(w)
            }
            Self::Gzip(e) => e.finish(),
            Self::Xz(e) => e.finish(),
            Self::Zstd(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::None(w) => w.write(buf),
            Self::Gzip(e) => e.write(buf),
            Self::Xz(e) => e.write(buf),
            Self::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::None(w) => w.flush(),
            Self::Gzip(e) => e.flush(),
            Self::Xz(e) => e.flush(),
            Self::Zstd(e) => e.flush(),
        }
    }
}

/// Create a compressing writer for the given format
///
/// `level` defaults to [`CompressionFormat::default_level`].
pub fn create_encoder<W: Write>(
    writer: W,
    format: CompressionFormat,
    level: Option<u32>,
) -> Result<Encoder<W>, CompressionError> {
    let level = format.check_level(level.unwrap_or_else(|| format.default_level()))?;
    match format {
        CompressionFormat::None => Ok(Encoder::None(writer)),
        CompressionFormat::Gzip => Ok(Encoder::Gzip(flate2::write::GzEncoder::new(
            writer,
            flate2::Compression::new(level),
        ))),
        CompressionFormat::Xz => Ok(Encoder::Xz(xz2::write::XzEncoder::new(writer, level))),
        CompressionFormat::Zstd => {
            // Level range is checked above, so the cast cannot wrap
            let encoder = zstd::Encoder::new(writer, level as i32).map_err(|e| {
                CompressionError::EncoderCreation {
                    format: "zstd",
                    source: e,
                }
            })?;
            Ok(Encoder::Zstd(encoder))
        }
    }
}

/// Create a decompressing reader for the given format
///
/// Returns a boxed `Read` implementation that decompresses data on the fly.
/// For `CompressionFormat::None`, returns the reader unchanged.
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder = zstd::Decoder::new(reader).map_err(|e| CompressionError::DecoderCreation {
                format: "zstd",
                source: e,
            })?;
            Ok(Box::new(decoder))
        }
    }
}
