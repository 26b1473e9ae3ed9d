//! Type definitions for archive packaging and unpacking.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lazily opened byte source of a file item.
///
/// Nothing is opened until the codec asks for the item's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSource {
    path: PathBuf,
}

impl ContentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Filesystem path the bytes are read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a read handle positioned at the start of the file.
    pub fn open(&self) -> io::Result<File> {
        File::open(&self.path)
    }
}

/// One logical entry handed to the codec when creating an archive.
///
/// Either a directory, or a file with a size and a content source; never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveItem {
    relative_path: String,
    is_directory: bool,
    size: Option<u64>,
    source: Option<ContentSource>,
}

impl ArchiveItem {
    pub fn directory(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            is_directory: true,
            size: None,
            source: None,
        }
    }

    pub fn file(relative_path: impl Into<String>, size: u64, source: ContentSource) -> Self {
        Self {
            relative_path: relative_path.into(),
            is_directory: false,
            size: Some(size),
            source: Some(source),
        }
    }

    /// Archive-internal path, forward-slash separated.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Declared size in bytes; `None` for directories.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn source(&self) -> Option<&ContentSource> {
        self.source.as_ref()
    }
}

/// Individual entry within an existing archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Path of the entry within the archive, as reported by the codec
    pub path: String,

    /// Whether this entry is a directory
    pub is_directory: bool,

    /// Uncompressed size in bytes
    pub size: u64,

    /// Compressed size in bytes (if available)
    pub compressed_size: Option<u64>,
}

/// Metadata information about an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Archive format (e.g., "7Z")
    pub format: String,

    /// Number of entries in the archive
    pub entries: u64,

    /// Number of volume files the archive spans
    pub volumes: u32,

    /// Compressed size in bytes, summed across volumes
    pub compressed_bytes: Option<u64>,

    /// Estimated uncompressed size in bytes (if available)
    pub uncompressed_estimate: Option<u64>,

    /// Whether a password was needed to read the archive headers
    pub encrypted: bool,

    /// List of all entries in the archive, with recovered paths
    pub entry_list: Vec<ArchiveEntry>,
}

/// Outcome the codec reports for one extracted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    Ok,
    /// The codec failed to decode the item's data.
    DataError,
    /// The decoded data did not match the stored checksum.
    CrcError,
    /// The sink failed to store the bytes it was handed.
    WriteError,
    /// The item could not be placed (e.g. an unsafe path).
    Rejected,
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::DataError => "DATAERROR",
            Self::CrcError => "CRCERROR",
            Self::WriteError => "WRITEERROR",
            Self::Rejected => "REJECTED",
        };
        f.write_str(name)
    }
}

/// Final status of an item in an extraction session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Ok,
    Error,
}

/// Per-item report produced by the extraction sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Ordinal of the item within the archive
    pub index: usize,

    /// Recovered archive path
    pub path: String,

    /// XOR-folded hash over the received chunks
    pub checksum: u32,

    /// Number of bytes received for the item
    pub bytes_written: u64,

    pub status: ItemStatus,

    /// Codec result when the item did not complete cleanly
    pub result: OperationResult,
}

impl fmt::Display for ExtractionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            ItemStatus::Ok => write!(
                f,
                "{:9X} | {:10} | {}",
                self.checksum, self.bytes_written, self.path
            ),
            ItemStatus::Error => write!(f, "Extraction error ({}) | {}", self.result, self.path),
        }
    }
}

/// 7z compression level in the range `0..=9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub const MAX: u8 = 9;

    /// Build a level from a number, clamping anything outside `0..=9` to `0`.
    pub fn from_value(value: i64) -> Self {
        match u8::try_from(value) {
            Ok(level) if level <= Self::MAX => Self(level),
            _ => {
                tracing::warn!(
                    requested = value,
                    "compression level must be within 0-9, falling back to 0"
                );
                Self(0)
            }
        }
    }

    /// Parse user input; unparsable input falls back to `0`.
    pub fn from_input(input: &str) -> Self {
        match input.trim().parse::<i64>() {
            Ok(value) => Self::from_value(value),
            Err(_) => {
                tracing::warn!(input, "invalid compression level, falling back to 0");
                Self(0)
            }
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// Options for creating an archive.
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Compression level passed to the codec
    pub level: CompressionLevel,

    /// Password for content encryption; must not be blank when set
    pub password: Option<String>,

    /// Whether to also encrypt the archive header (only applies with a password)
    pub encrypt_header: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            level: CompressionLevel::default(),
            password: None,
            encrypt_header: true,
        }
    }
}

/// How extracted bytes are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    /// Stream every file through the hash accumulator without writing to disk
    Simple,

    /// Write the archive tree to the output directory
    Standard,
}

/// Options for extracting an archive.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub mode: ExtractMode,

    /// Password for encrypted archives
    pub password: Option<String>,

    /// Candidate encodings for filename recovery, tried in order.
    /// Empty means auto-detect followed by the built-in fallbacks.
    pub encodings: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            mode: ExtractMode::Standard,
            password: None,
            encodings: Vec::new(),
        }
    }
}

/// Statistics about a completed archive creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompressStats {
    /// Number of file items written
    pub files: u64,

    /// Number of directory items written
    pub directories: u64,

    /// Total uncompressed bytes handed to the codec
    pub bytes_read: u64,

    /// Size of the produced archive in bytes
    pub archive_bytes: u64,

    /// Duration of the operation (in seconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Statistics about a completed extraction operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Number of files successfully extracted
    pub files_extracted: u64,

    /// Number of directory entries materialized
    pub directories_created: u64,

    /// Number of items that completed with an error
    pub items_failed: u64,

    /// Total bytes received from the codec
    pub bytes_written: u64,

    /// Duration of the extraction operation (in seconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Result of an extraction session: aggregate stats plus one record per item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractReport {
    pub stats: ExtractStats,
    pub records: Vec<ExtractionRecord>,
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
