//! Archive creation: configuration checks, output naming, and the packaging
//! session that drives the codec.

use crate::codec::{ArchiveCodec, SevenZipCodec};
use crate::enumerate::enumerate;
use crate::error::ArchiveError;
use crate::mapper::{map_entries, ItemMapper};
use crate::password::{self, ObfuscatedPassword, UnwrapOptions};
use crate::types::{CompressOptions, CompressStats};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Extension of produced archives.
pub const ARCHIVE_EXTENSION: &str = "7z";

/// How the output archive is named and protected.
#[derive(Debug, Clone, Default)]
pub struct NamingOptions {
    /// Base password; the random token is used when absent
    pub password: Option<String>,

    pub password_prefix: String,

    pub password_suffix: String,

    /// Number of random letters to insert into the archive name
    pub extra_count: Option<usize>,
}

/// Name and password chosen for a new archive.
#[derive(Debug, Clone)]
pub struct ArchivePlan {
    /// Random content-addressed token (32 hex digits)
    pub token: String,

    /// Archive file name without extension; the token, possibly decorated
    pub name: String,

    /// Full path of the archive to write
    pub output: PathBuf,

    pub password: ObfuscatedPassword,
}

impl ArchivePlan {
    /// Pick a random name inside `output_dir` and derive the password from it.
    ///
    /// With `extra_count`, random non-hex letters are inserted into the token.
    /// The decorated name is only used if the token can be recovered from it.
    pub fn new(output_dir: &Path, naming: &NamingOptions) -> Self {
        let token = password::random_token();

        let name = match naming.extra_count {
            Some(count) if count > 0 => {
                let decorated = password::insert_random_chars(&token, count);
                if password::extract_token(&decorated).as_deref() == Some(token.as_str()) {
                    decorated
                } else {
                    tracing::warn!("decorated archive name failed verification, using plain token");
                    token.clone()
                }
            }
            _ => token.clone(),
        };

        let base = naming.password.clone().unwrap_or_else(|| token.clone());
        let password = ObfuscatedPassword::generate(
            &base,
            &name,
            &naming.password_prefix,
            &naming.password_suffix,
        );

        let composed = password.compose();
        if password::extract(&composed, &UnwrapOptions::verified(password.checksum())).is_none() {
            tracing::warn!("composed password does not round-trip through extraction");
        }

        let output = output_dir.join(format!("{name}.{ARCHIVE_EXTENSION}"));
        Self {
            token,
            name,
            output,
            password,
        }
    }

    /// Compression options carrying this plan's composed password.
    pub fn options(&self, base: &CompressOptions) -> CompressOptions {
        CompressOptions {
            password: Some(self.password.compose()),
            ..base.clone()
        }
    }
}

/// Check everything that can be checked before the codec is involved.
///
/// # Errors
///
/// Returns [`ArchiveError::Config`] for a missing source directory, a missing
/// or read-only output directory, or a blank password.
pub fn validate(source_dir: &Path, output: &Path, options: &CompressOptions) -> Result<(), ArchiveError> {
    if !source_dir.is_dir() {
        return Err(ArchiveError::Config(format!(
            "input directory does not exist or is not a directory: {}",
            source_dir.display()
        )));
    }

    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let metadata = fs::metadata(parent).map_err(|_| {
        ArchiveError::Config(format!("output directory does not exist: {}", parent.display()))
    })?;
    if !metadata.is_dir() || metadata.permissions().readonly() {
        return Err(ArchiveError::Config(format!(
            "output directory is not writable: {}",
            parent.display()
        )));
    }

    if let Some(password) = &options.password {
        if password.trim().is_empty() {
            return Err(ArchiveError::Config("password must not be blank".to_string()));
        }
    }

    Ok(())
}

/// Package every file and directory under `source_dir` into `output`.
///
/// # Arguments
///
/// * `source_dir` - Directory whose contents become the archive root
/// * `output` - Archive file to create; excluded if it lies inside `source_dir`
/// * `options` - Compression level, password and header encryption
///
/// # Errors
///
/// Configuration problems are reported before anything is written. A codec
/// failure removes the partial archive and is returned as-is.
pub fn compress_dir(
    source_dir: &Path,
    output: &Path,
    options: &CompressOptions,
) -> Result<CompressStats, ArchiveError> {
    compress_with(&SevenZipCodec::new(), source_dir, output, options)
}

/// [`compress_dir`] with an explicit codec.
pub fn compress_with(
    codec: &dyn ArchiveCodec,
    source_dir: &Path,
    output: &Path,
    options: &CompressOptions,
) -> Result<CompressStats, ArchiveError> {
    let start_time = Instant::now();
    validate(source_dir, output, options)?;

    let entries = enumerate(source_dir, &[output])?;
    let items = map_entries(&entries, source_dir)?;
    tracing::info!(
        source = %source_dir.display(),
        output = %output.display(),
        items = items.len(),
        level = options.level.get(),
        encrypted = options.password.is_some(),
        "creating archive"
    );

    let mut mapper = ItemMapper::new(items, options.password.clone());
    let file = File::create(output)?;
    let archive_bytes = match codec.create(file, options.level, options.encrypt_header, &mut mapper)
    {
        Ok(bytes) => bytes,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(output) {
                tracing::debug!(error = %cleanup, "failed to remove partial archive");
            }
            return Err(e);
        }
    };

    let stats = CompressStats {
        files: mapper.files_stored(),
        directories: mapper.directories_stored(),
        bytes_read: mapper.bytes_read(),
        archive_bytes,
        duration: start_time.elapsed(),
    };
    tracing::info!(
        files = stats.files,
        directories = stats.directories,
        archive_bytes = stats.archive_bytes,
        "archive created"
    );
    Ok(stats)
}
