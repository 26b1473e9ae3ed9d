//! Archive probing: list entries and metadata without extracting.

use crate::codec::{ArchiveCodec, SevenZipCodec};
use crate::error::ArchiveError;
use crate::recovery::PathRecovery;
use crate::types::{ArchiveEntry, ArchiveInfo};
use crate::volume::VolumeSet;
use std::fmt::Write as _;
use std::path::Path;

/// Probe an archive to retrieve metadata without extracting.
///
/// This function reads the archive headers to determine:
/// - Number of entries and their recovered paths
/// - Compressed size (summed over all volumes) and uncompressed estimate
/// - Whether the headers are encrypted
///
/// # Arguments
///
/// * `path` - Path to the archive file, or to the first `.NNN` volume
/// * `password` - Password to try if the headers turn out to be encrypted
/// * `encodings` - Candidate encodings for filename recovery
///
/// # Errors
///
/// Returns an error if:
/// - The archive file doesn't exist
/// - The headers are encrypted and no (or a wrong) password is given
/// - The archive is corrupted or cannot be read
pub fn probe_archive(
    path: &Path,
    password: Option<&str>,
    encodings: &[String],
) -> Result<ArchiveInfo, ArchiveError> {
    probe_with(&SevenZipCodec::new(), path, password, encodings)
}

/// [`probe_archive`] with an explicit codec.
pub fn probe_with(
    codec: &dyn ArchiveCodec,
    path: &Path,
    password: Option<&str>,
    encodings: &[String],
) -> Result<ArchiveInfo, ArchiveError> {
    let mut volumes = VolumeSet::open(path)?;
    let volume_count = volumes.volume_count();
    let compressed_bytes = Some(volumes.total_size());

    let listing = codec.list(&mut volumes, password.filter(|p| !p.is_empty()));
    volumes.close();
    let listing = listing?;

    let recovery = PathRecovery::new(encodings);
    let entry_list: Vec<ArchiveEntry> = listing
        .entries
        .into_iter()
        .map(|entry| ArchiveEntry {
            path: recovery.recover(&entry.path),
            ..entry
        })
        .collect();

    let uncompressed_estimate = if entry_list.is_empty() {
        None
    } else {
        Some(entry_list.iter().map(|e| e.size).sum())
    };

    tracing::debug!(
        archive = %path.display(),
        entries = entry_list.len(),
        encrypted = listing.encrypted,
        "probed archive"
    );

    Ok(ArchiveInfo {
        format: codec.format().to_string(),
        entries: entry_list.len() as u64,
        volumes: volume_count,
        compressed_bytes,
        uncompressed_estimate,
        encrypted: listing.encrypted,
        entry_list,
    })
}

/// Render the entry list as a `Size | Compr.Sz. | Filename` table.
pub fn format_listing(info: &ArchiveInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "   Size   | Compr.Sz. | Filename");
    let _ = writeln!(out, "----------+-----------+---------");
    for entry in &info.entry_list {
        let compressed = entry
            .compressed_size
            .map(|size| size.to_string())
            .unwrap_or_default();
        let _ = writeln!(out, "{:>9} | {:>9} | {}", entry.size, compressed, entry.path);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_listing() {
        let info = ArchiveInfo {
            format: "7Z".to_string(),
            entries: 2,
            volumes: 1,
            compressed_bytes: Some(200),
            uncompressed_estimate: Some(16),
            encrypted: false,
            entry_list: vec![
                ArchiveEntry {
                    path: "dir2".to_string(),
                    is_directory: true,
                    size: 0,
                    compressed_size: None,
                },
                ArchiveEntry {
                    path: "info.txt".to_string(),
                    is_directory: false,
                    size: 16,
                    compressed_size: None,
                },
            ],
        };

        let table = format_listing(&info);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "   Size   | Compr.Sz. | Filename");
        assert_eq!(lines[2], "        0 |           | dir2");
        assert_eq!(lines[3], "       16 |           | info.txt");
    }

    #[test]
    fn test_probe_missing_archive() {
        let result = probe_archive(Path::new("/no/such/archive.7z"), None, &[]);
        assert!(matches!(result, Err(ArchiveError::NotFound(_))));
    }
}
