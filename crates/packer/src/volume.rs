//! Volume stream management for single- and multi-volume archives.
//!
//! [`VolumeStreamProvider`] owns every file handle opened for an archive
//! session, keyed by volume name. [`VolumeSet`] sits on top of it and presents
//! the volumes as one seekable byte stream for the codec.

use crate::error::ArchiveError;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Name-keyed cache of opened volume files.
///
/// A cache hit rewinds the handle to offset zero, so every caller sees a
/// fresh stream. A missing volume is reported as `None`, which is how
/// multi-volume probing discovers the last volume.
#[derive(Debug, Default)]
pub struct VolumeStreamProvider {
    cache: HashMap<String, File>,
}

impl VolumeStreamProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a volume by name.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when no file with that name exists, otherwise the cached
    /// handle positioned at offset zero.
    ///
    /// # Errors
    ///
    /// Any I/O failure other than "not found" while opening or rewinding.
    pub fn get_stream(&mut self, name: &str) -> io::Result<Option<&mut File>> {
        match self.cache.entry(name.to_string()) {
            Entry::Occupied(slot) => {
                let file = slot.into_mut();
                file.seek(SeekFrom::Start(0))?;
                Ok(Some(file))
            }
            Entry::Vacant(slot) => match File::open(name) {
                Ok(file) => {
                    tracing::debug!(volume = name, "opened volume");
                    Ok(Some(slot.insert(file)))
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(volume = name, "volume does not exist");
                    Ok(None)
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Number of volumes currently held open.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Release every cached handle.
    pub fn close(mut self) {
        for (name, file) in self.cache.drain() {
            tracing::trace!(volume = %name, "closing volume");
            drop(file);
        }
    }
}

/// Split `archive.7z.001` into (`archive.7z`, 1).
///
/// Only a purely numeric suffix of at least three digits counts as a volume
/// number.
pub fn split_volume_name(name: &str) -> Option<(&str, u32)> {
    let (base, suffix) = name.rsplit_once('.')?;
    if base.is_empty() || suffix.len() < 3 || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok().map(|number| (base, number))
}

/// Name of volume `number` for a base name, e.g. `archive.7z.002`.
pub fn volume_name(base: &str, number: u32) -> String {
    format!("{base}.{number:03}")
}

/// The volumes of one archive read as a single contiguous stream.
#[derive(Debug)]
pub struct VolumeSet {
    provider: VolumeStreamProvider,
    names: Vec<String>,
    sizes: Vec<u64>,
    total_size: u64,
    position: u64,
    current_volume: usize,
    volume_position: u64,
}

impl VolumeSet {
    /// Open the archive at `path`.
    ///
    /// A path ending in a numeric `.NNN` suffix is the first of a run of
    /// consecutively numbered volumes; following volumes are probed until the
    /// provider reports one missing. Any other path is a single volume.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotFound`] if the first volume does not exist.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let mut provider = VolumeStreamProvider::new();
        let first = path.to_string_lossy().into_owned();

        let mut names = Vec::new();
        let mut sizes = Vec::new();

        match split_volume_name(&first) {
            Some((base, start)) => {
                let mut number = start;
                loop {
                    let name = volume_name(base, number);
                    match provider.get_stream(&name)? {
                        Some(file) => {
                            sizes.push(file.metadata()?.len());
                            names.push(name);
                        }
                        None => break,
                    }
                    number += 1;
                }
            }
            None => {
                if let Some(file) = provider.get_stream(&first)? {
                    sizes.push(file.metadata()?.len());
                    names.push(first.clone());
                }
            }
        }

        if names.is_empty() {
            return Err(ArchiveError::NotFound(PathBuf::from(path)));
        }

        let total_size = sizes.iter().sum();
        tracing::debug!(volumes = names.len(), total_size, "resolved archive volumes");

        Ok(Self {
            provider,
            names,
            sizes,
            total_size,
            position: 0,
            current_volume: 0,
            volume_position: 0,
        })
    }

    pub fn volume_count(&self) -> u32 {
        self.names.len() as u32
    }

    pub fn volume_names(&self) -> &[String] {
        &self.names
    }

    pub fn volume_sizes(&self) -> &[u64] {
        &self.sizes
    }

    /// Logical length of the archive across all volumes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Release the volume handles.
    pub fn close(self) {
        self.provider.close();
    }

    fn position_to_volume(&self, pos: u64) -> (usize, u64) {
        let mut remaining = pos;
        for (i, &size) in self.sizes.iter().enumerate() {
            if remaining < size {
                return (i, remaining);
            }
            remaining -= size;
        }
        let last = self.sizes.len().saturating_sub(1);
        (last, self.sizes.get(last).copied().unwrap_or(0))
    }
}

impl Read for VolumeSet {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;

        while filled < buf.len() && self.position < self.total_size {
            let remaining_in_volume = self.sizes[self.current_volume] - self.volume_position;
            if remaining_in_volume == 0 {
                if self.current_volume + 1 >= self.names.len() {
                    break;
                }
                self.current_volume += 1;
                self.volume_position = 0;
                continue;
            }

            let to_read = (buf.len() - filled).min(remaining_in_volume as usize);
            let offset = self.volume_position;
            let name = &self.names[self.current_volume];
            let file = self.provider.get_stream(name)?.ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("volume disappeared: {name}"),
                )
            })?;
            file.seek(SeekFrom::Start(offset))?;

            let n = file.read(&mut buf[filled..filled + to_read])?;
            if n == 0 {
                break;
            }

            filled += n;
            self.position += n as u64;
            self.volume_position += n as u64;
        }

        Ok(filled)
    }
}

impl Seek for VolumeSet {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => i128::from(p),
            SeekFrom::End(p) => i128::from(self.total_size) + i128::from(p),
            SeekFrom::Current(p) => i128::from(self.position) + i128::from(p),
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot seek before start of stream",
            ));
        }

        self.position = u64::try_from(target)
            .unwrap_or(u64::MAX)
            .min(self.total_size);
        let (volume, offset) = self.position_to_volume(self.position);
        self.current_volume = volume;
        self.volume_position = offset;

        Ok(self.position)
    }
}
