//! Path safety checks for extracted entries.
//!
//! Recovered archive paths are untrusted input. Before a path is joined to the
//! output directory it must be relative and free of parent components, or the
//! item is rejected (zip-slip protection).

use crate::error::SecurityError;
use std::path::{Component, Path, PathBuf};

/// Validates and normalizes an archive entry path.
///
/// This function performs the following checks:
/// - Rejects absolute paths and Windows prefixes
/// - Rejects paths containing ".." components (path traversal)
/// - Drops redundant separators and "." components
///
/// Backslashes are treated as separators, since archives written on Windows
/// may carry them.
///
/// # Arguments
///
/// * `path` - The recovered entry path from the archive
///
/// # Returns
///
/// Returns a normalized relative `PathBuf`, or a `SecurityError` if the path
/// could escape the output directory.
///
/// # Examples
///
/// ```
/// use packer::safety::validate_entry_path;
/// use std::path::Path;
///
/// let safe = validate_entry_path("dir/file.txt").unwrap();
/// assert_eq!(safe, Path::new("dir/file.txt"));
///
/// assert!(validate_entry_path("../../etc/passwd").is_err());
/// assert!(validate_entry_path("/etc/passwd").is_err());
/// ```
pub fn validate_entry_path(path: &str) -> Result<PathBuf, SecurityError> {
    let unified = path.replace('\\', "/");
    let candidate = Path::new(&unified);

    if candidate.is_absolute() || unified.starts_with('/') {
        return Err(SecurityError::AbsolutePath(path.to_string()));
    }

    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => {
                if part == ".." {
                    return Err(SecurityError::PathTraversal(path.to_string()));
                }
                normalized.push(part);
            }
            Component::CurDir => continue,
            Component::ParentDir => {
                return Err(SecurityError::PathTraversal(path.to_string()));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SecurityError::AbsolutePath(path.to_string()));
            }
        }
    }

    // A drive letter is only parsed as a prefix on Windows.
    if let Some(first) = unified.split('/').next() {
        let bytes = first.as_bytes();
        if bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            return Err(SecurityError::AbsolutePath(path.to_string()));
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(SecurityError::PathTraversal(format!(
            "path normalizes to empty: {path:?}"
        )));
    }

    Ok(normalized)
}

/// Join a validated entry path onto `output_dir`.
pub fn resolve_within(output_dir: &Path, path: &str) -> Result<PathBuf, SecurityError> {
    validate_entry_path(path).map(|relative| output_dir.join(relative))
}
