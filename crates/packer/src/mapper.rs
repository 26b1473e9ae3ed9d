//! Mapping of enumerated filesystem entries to archive items.

use crate::codec::CreateCallback;
use crate::enumerate::FsEntry;
use crate::error::ArchiveError;
use crate::types::{ArchiveItem, ContentSource};
use std::io::Read;
use std::path::{Component, Path};

/// Archive-internal path of `path` relative to `base_dir`, `/`-separated.
///
/// Returns `None` when `path` is not strictly below `base_dir`.
pub fn relative_path(path: &Path, base_dir: &Path) -> Option<String> {
    let relative = path.strip_prefix(base_dir).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Convert enumerated entries into archive items, keeping their order.
///
/// # Errors
///
/// Returns [`ArchiveError::Config`] if an entry lies outside `base_dir`.
pub fn map_entries(entries: &[FsEntry], base_dir: &Path) -> Result<Vec<ArchiveItem>, ArchiveError> {
    let root = base_dir.canonicalize()?;

    entries
        .iter()
        .map(|entry| {
            let name = relative_path(&entry.path, &root).ok_or_else(|| {
                ArchiveError::Config(format!(
                    "{} is not inside {}",
                    entry.path.display(),
                    root.display()
                ))
            })?;

            Ok(if entry.is_dir {
                ArchiveItem::directory(name)
            } else {
                ArchiveItem::file(name, entry.len, ContentSource::new(&entry.path))
            })
        })
        .collect()
}

/// Feeds mapped items to the codec during archive creation.
///
/// Content streams are opened lazily, one at a time, and each item can be
/// opened only once.
#[derive(Debug)]
pub struct ItemMapper {
    items: Vec<ArchiveItem>,
    opened: Vec<bool>,
    password: Option<String>,
    files_stored: u64,
    directories_stored: u64,
    bytes_read: u64,
}

impl ItemMapper {
    pub fn new(items: Vec<ArchiveItem>, password: Option<String>) -> Self {
        let opened = vec![false; items.len()];
        Self {
            items,
            opened,
            password,
            files_stored: 0,
            directories_stored: 0,
            bytes_read: 0,
        }
    }

    pub fn items(&self) -> &[ArchiveItem] {
        &self.items
    }

    pub fn files_stored(&self) -> u64 {
        self.files_stored
    }

    pub fn directories_stored(&self) -> u64 {
        self.directories_stored
    }

    /// Total bytes the codec read from file items.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl CreateCallback for ItemMapper {
    fn item_count(&self) -> usize {
        self.items.len()
    }

    fn item_info(&self, index: usize) -> Option<&ArchiveItem> {
        self.items.get(index)
    }

    fn open_stream(&mut self, index: usize) -> Result<Option<Box<dyn Read>>, ArchiveError> {
        let item = self
            .items
            .get(index)
            .ok_or_else(|| ArchiveError::Codec(format!("item index out of range: {index}")))?;

        let Some(source) = item.source() else {
            return Ok(None);
        };

        if std::mem::replace(&mut self.opened[index], true) {
            return Err(ArchiveError::Codec(format!(
                "content of {} requested twice",
                item.relative_path()
            )));
        }

        tracing::trace!(index, path = %source.path().display(), "opening item content");
        let file = source.open()?;
        Ok(Some(Box::new(file)))
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    fn on_item_stored(&mut self, index: usize, bytes: u64) {
        match self.items.get(index) {
            Some(item) if item.is_directory() => self.directories_stored += 1,
            Some(_) => {
                self.files_stored += 1;
                self.bytes_read += bytes;
            }
            None => {}
        }
    }
}
