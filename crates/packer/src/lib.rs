//! # Packer
//!
//! Packaging and unpacking of 7-Zip archives with obfuscated passwords.
//!
//! Packaging walks a source directory (skipping OS metadata such as
//! `.DS_Store` or `Thumbs.db`), maps every file and directory to an archive
//! item, and streams the items into the codec. Unpacking resolves the volumes
//! of an archive, recovers entry names that were stored in a legacy charset,
//! and streams each entry into its own sink while hashing it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use packer::{ArchivePlan, CompressOptions, ExtractMode, ExtractOptions, NamingOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Name the archive after a random token and derive its password
//! let plan = ArchivePlan::new(Path::new("out"), &NamingOptions::default());
//! let options = plan.options(&CompressOptions::default());
//! let stats = packer::compress(Path::new("photos"), &plan.output, &options)?;
//! println!("Stored {} files in {} bytes", stats.files, stats.archive_bytes);
//!
//! // Verify the archive without writing anything
//! let check = ExtractOptions {
//!     mode: ExtractMode::Simple,
//!     password: options.password.clone(),
//!     ..ExtractOptions::default()
//! };
//! for record in packer::extract(&plan.output, None, &check)?.records {
//!     println!("{record}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod compress;
pub mod enumerate;
pub mod error;
pub mod extract;
pub mod mapper;
pub mod password;
pub mod probe;
pub mod recovery;
pub mod safety;
pub mod sink;
pub mod types;
pub mod volume;

// Re-export main types
pub use codec::{ArchiveCodec, SevenZipCodec};
pub use compress::{ArchivePlan, NamingOptions};
pub use error::{ArchiveError, SecurityError};
pub use password::ObfuscatedPassword;
pub use recovery::PathRecovery;
pub use types::{
    ArchiveEntry, ArchiveInfo, ArchiveItem, CompressOptions, CompressStats, CompressionLevel,
    ExtractMode, ExtractOptions, ExtractReport, ExtractStats, ExtractionRecord, ItemStatus,
    OperationResult,
};

use std::path::Path;

/// Probe an archive to retrieve metadata without extracting.
///
/// # Arguments
///
/// * `path` - Path to the archive file (or its first `.NNN` volume)
/// * `password` - Password for archives with encrypted headers
/// * `encodings` - Candidate encodings for filename recovery; empty means
///   auto-detect
///
/// # Errors
///
/// Returns an error if the archive is missing, unreadable, or needs a
/// password that was not given.
pub fn probe(
    path: &Path,
    password: Option<&str>,
    encodings: &[String],
) -> Result<ArchiveInfo, ArchiveError> {
    probe::probe_archive(path, password, encodings)
}

/// Package the contents of `source_dir` into the archive `output`.
///
/// # Errors
///
/// Returns [`ArchiveError::Config`] before touching the codec if the input
/// is missing, the output directory is not writable, or the password is
/// blank. Codec failures are passed through.
pub fn compress(
    source_dir: &Path,
    output: &Path,
    options: &CompressOptions,
) -> Result<CompressStats, ArchiveError> {
    compress::compress_dir(source_dir, output, options)
}

/// Extract an archive, or only verify it in [`ExtractMode::Simple`].
///
/// # Returns
///
/// Returns an [`ExtractReport`] with aggregate statistics and one
/// [`ExtractionRecord`] per entry.
///
/// # Errors
///
/// Returns an error if the archive is missing or corrupted, or the password
/// is missing or incorrect. Failures of single entries are reported in the
/// records instead.
pub fn extract(
    archive: &Path,
    output_dir: Option<&Path>,
    options: &ExtractOptions,
) -> Result<ExtractReport, ArchiveError> {
    extract::extract_archive(archive, output_dir, options)
}
