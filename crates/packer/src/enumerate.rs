//! Source tree enumeration with platform-noise filtering.
//!
//! Walks the directory being packaged and yields every file and directory
//! beneath it, skipping OS-generated metadata and the archive being written.

use crate::error::ArchiveError;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Names that are always skipped, wherever they appear in the tree.
const NOISE_NAMES: &[&str] = &[
    ".DS_Store",
    ".localized",
    ".VolumeIcon.icns",
    ".Spotlight-V100",
    ".Trashes",
    ".fseventsd",
    ".TemporaryItems",
    ".DocumentRevisions-V100",
    "Thumbs.db",
    "desktop.ini",
    "$RECYCLE.BIN",
    "System Volume Information",
];

/// Name prefixes that mark metadata files (AppleDouble forks, per-user trash).
const NOISE_PREFIXES: &[&str] = &["._", ".Trash-"];

/// Name fragments that mark metadata files (custom folder icons).
const NOISE_SUBSTRINGS: &[&str] = &["Icon\r"];

/// A file or directory found under the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    /// Absolute path of the entry
    pub path: PathBuf,

    pub is_dir: bool,

    /// Length in bytes at enumeration time (0 for directories)
    pub len: u64,
}

/// Whether a file name belongs to the platform-noise set.
pub fn is_platform_noise(name: &str) -> bool {
    NOISE_NAMES.contains(&name)
        || NOISE_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
        || NOISE_SUBSTRINGS.iter().any(|fragment| name.contains(fragment))
}

/// Enumerate every file and directory under `base_dir`.
///
/// `base_dir` itself is not part of the result, nor is any path listed in
/// `exclude` (typically the output archive). Directories are included so that
/// empty ones survive a round trip. Entries are sorted by name within each
/// directory, so the sequence is stable for an unchanged tree.
///
/// # Errors
///
/// Returns [`ArchiveError::Config`] if `base_dir` is missing or is not a
/// directory or cannot be read, and [`ArchiveError::Io`] if the walk hits an
/// unreadable entry below it.
pub fn enumerate(base_dir: &Path, exclude: &[&Path]) -> Result<Vec<FsEntry>, ArchiveError> {
    if !base_dir.is_dir() {
        return Err(ArchiveError::Config(format!(
            "input directory does not exist or is not a directory: {}",
            base_dir.display()
        )));
    }

    let root = base_dir.canonicalize()?;
    let excluded: Vec<PathBuf> = exclude.iter().map(|p| absolutize(p)).collect();

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| keep_entry(entry, &root, &excluded));

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(e, &root))?;
        let metadata = entry.metadata().map_err(io::Error::from)?;
        let is_dir = metadata.is_dir();

        entries.push(FsEntry {
            path: entry.into_path(),
            is_dir,
            len: if is_dir { 0 } else { metadata.len() },
        });
    }

    tracing::debug!(root = %root.display(), count = entries.len(), "enumerated source tree");
    Ok(entries)
}

/// An unreadable base directory is a configuration problem; anything deeper
/// is plain I/O.
fn walk_error(err: walkdir::Error, root: &Path) -> ArchiveError {
    if err.depth() == 0 {
        return ArchiveError::Config(format!(
            "input directory is not readable: {} ({err})",
            root.display()
        ));
    }
    ArchiveError::Io(io::Error::from(err))
}

fn keep_entry(entry: &DirEntry, root: &Path, excluded: &[PathBuf]) -> bool {
    let path = entry.path();
    if path == root || excluded.iter().any(|e| e == path) {
        return false;
    }

    match entry.file_name().to_str() {
        Some(name) if is_platform_noise(name) => {
            tracing::trace!(path = %path.display(), "skipping platform noise");
            false
        }
        _ => true,
    }
}

/// Resolve a path that may not exist yet (such as the output archive).
fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(entries: &[FsEntry], root: &Path) -> Vec<String> {
        let root = root.canonicalize().unwrap();
        entries
            .iter()
            .map(|e| {
                e.path
                    .strip_prefix(&root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_is_platform_noise() {
        assert!(is_platform_noise(".DS_Store"));
        assert!(is_platform_noise("._photo.jpg"));
        assert!(is_platform_noise(".Trash-1000"));
        assert!(is_platform_noise("Icon\r"));
        assert!(is_platform_noise(".fseventsd"));

        assert!(!is_platform_noise("info.txt"));
        assert!(!is_platform_noise(".gitignore"));
        assert!(!is_platform_noise("DS_Store"));
    }

    #[test]
    fn test_enumerate_includes_dirs_and_skips_noise() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("info.txt"), "This is the info").unwrap();
        fs::create_dir(root.join("dir1")).unwrap();
        fs::write(root.join("dir1/file1.txt"), "one").unwrap();
        fs::write(root.join("dir1/.DS_Store"), "noise").unwrap();
        fs::create_dir(root.join("dir2")).unwrap();
        fs::write(root.join("._info.txt"), "fork").unwrap();
        fs::create_dir(root.join(".fseventsd")).unwrap();
        fs::write(root.join(".fseventsd/0000"), "events").unwrap();

        let entries = enumerate(root, &[]).unwrap();

        assert_eq!(
            names(&entries, root),
            vec!["dir1", "dir1/file1.txt", "dir2", "info.txt"]
        );
        let info = entries.iter().find(|e| e.path.ends_with("info.txt")).unwrap();
        assert_eq!(info.len, 16);
        assert!(entries.iter().find(|e| e.path.ends_with("dir2")).unwrap().is_dir);
    }

    #[test]
    fn test_enumerate_excludes_output_archive() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("out.7z"), "partial").unwrap();

        let output = root.join("out.7z");
        let entries = enumerate(root, &[output.as_path()]).unwrap();

        assert_eq!(names(&entries, root), vec!["a.txt"]);
    }

    #[test]
    fn test_enumerate_excludes_output_not_yet_created() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();

        let output = root.join("later.7z");
        let entries = enumerate(root, &[output.as_path()]).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_enumerate_missing_dir_is_config_error() {
        let result = enumerate(Path::new("/definitely/not/here"), &[]);
        assert!(matches!(result, Err(ArchiveError::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_enumerate_unreadable_dir_is_config_error() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("locked");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can read it anyway
        let readable = fs::read_dir(&root).is_ok();
        let result = enumerate(&root, &[]);
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();

        if !readable {
            assert!(matches!(result, Err(ArchiveError::Config(_))));
        }
    }

    #[test]
    fn test_enumerate_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["b.txt", "a.txt", "c.txt", ".DS_Store"] {
            fs::write(root.join(name), name).unwrap();
        }

        let first = enumerate(root, &[]).unwrap();
        let second = enumerate(root, &[]).unwrap();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_noise_never_enumerated(
            files in proptest::collection::btree_set("(\\._|\\.Trash-)?[a-z]{1,8}", 1..8)
        ) {
            let temp_dir = TempDir::new().unwrap();
            let root = temp_dir.path();
            for name in &files {
                fs::write(root.join(name), name).unwrap();
            }
            fs::write(root.join(".DS_Store"), "noise").unwrap();

            let first = enumerate(root, &[]).unwrap();
            let second = enumerate(root, &[]).unwrap();
            prop_assert_eq!(&first, &second);

            let listed = names(&first, root);
            prop_assert!(listed.iter().all(|name| !is_platform_noise(name)));
            let expected = files.iter().filter(|n| !is_platform_noise(n)).count();
            prop_assert_eq!(listed.len(), expected);
        }
    }
}
