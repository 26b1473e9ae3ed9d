//! Per-entry extraction sink.
//!
//! Each extracted entry gets its own [`ExtractionSink`]. The sink moves
//! through `Pending -> Receiving -> Completed`: the target file is opened on
//! the first chunk and held until the codec reports the entry's result. Every
//! chunk is folded into a 32-bit hash and a byte count that belong to this
//! entry only.

use crate::types::{ExtractionRecord, ItemStatus, OperationResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

/// Where an entry's bytes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// Write to this file, created (or truncated) on the first chunk.
    File(PathBuf),
    /// Hash and count only.
    Verify,
    /// A directory entry; receives no bytes. The directory is created when a
    /// path is given.
    Directory(Option<PathBuf>),
}

/// Running hash and size of one entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accumulator {
    pub hash: u32,
    pub size: u64,
}

impl Accumulator {
    /// Fold one chunk in: the chunk hash is XOR-ed into the running hash.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hash ^= chunk_hash(chunk);
        self.size += chunk.len() as u64;
    }
}

/// Polynomial hash of a chunk (`h = 31 * h + b`, signed bytes, seed 1).
pub fn chunk_hash(chunk: &[u8]) -> u32 {
    chunk.iter().fold(1i32, |h, &b| {
        h.wrapping_mul(31).wrapping_add(i32::from(b as i8))
    }) as u32
}

#[derive(Debug)]
enum SinkState {
    Pending,
    Receiving {
        file: Option<File>,
        acc: Accumulator,
    },
    Completed {
        status: ItemStatus,
        acc: Accumulator,
    },
}

/// Streaming destination of a single archive entry.
#[derive(Debug)]
pub struct ExtractionSink {
    index: usize,
    path: String,
    target: SinkTarget,
    state: SinkState,
}

impl ExtractionSink {
    /// Create a sink, creating any missing parent directories of a file
    /// target (or the directory itself for a directory target).
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a directory cannot be created.
    pub fn open(index: usize, path: impl Into<String>, target: SinkTarget) -> io::Result<Self> {
        match &target {
            SinkTarget::File(dest) => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
            }
            SinkTarget::Directory(Some(dir)) => fs::create_dir_all(dir)?,
            SinkTarget::Directory(None) | SinkTarget::Verify => {}
        }

        Ok(Self {
            index,
            path: path.into(),
            target,
            state: SinkState::Pending,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Recovered archive path of the entry.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn target(&self) -> &SinkTarget {
        &self.target
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, SinkState::Completed { .. })
    }

    /// Bytes received so far.
    pub fn bytes_received(&self) -> u64 {
        match &self.state {
            SinkState::Pending => 0,
            SinkState::Receiving { acc, .. } | SinkState::Completed { acc, .. } => acc.size,
        }
    }

    /// Close the entry with the codec's result and produce its record.
    ///
    /// A file entry that completes `Ok` without receiving a byte still
    /// materializes as an empty file.
    pub fn finish(&mut self, result: OperationResult) -> ExtractionRecord {
        let previous = std::mem::replace(&mut self.state, SinkState::Pending);
        let (acc, status) = match previous {
            SinkState::Pending if result == OperationResult::Ok => match self.materialize_empty() {
                Ok(()) => (Accumulator::default(), ItemStatus::Ok),
                Err(e) => {
                    tracing::error!(path = %self.path, error = %e, "failed to create entry");
                    (Accumulator::default(), ItemStatus::Error)
                }
            },
            SinkState::Pending => (Accumulator::default(), ItemStatus::Error),
            SinkState::Receiving { file, acc } => {
                drop(file);
                let status = if result == OperationResult::Ok {
                    ItemStatus::Ok
                } else {
                    ItemStatus::Error
                };
                (acc, status)
            }
            SinkState::Completed { status, acc } => (acc, status),
        };

        let result = if status == ItemStatus::Error && result == OperationResult::Ok {
            OperationResult::WriteError
        } else {
            result
        };

        self.state = SinkState::Completed { status, acc };
        ExtractionRecord {
            index: self.index,
            path: self.path.clone(),
            checksum: acc.hash,
            bytes_written: acc.size,
            status,
            result,
        }
    }

    fn materialize_empty(&self) -> io::Result<()> {
        match &self.target {
            SinkTarget::File(dest) => File::create(dest).map(drop),
            SinkTarget::Verify | SinkTarget::Directory(_) => Ok(()),
        }
    }

    fn open_target(&self) -> io::Result<Option<File>> {
        match &self.target {
            SinkTarget::File(dest) => OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(dest)
                .map(Some),
            SinkTarget::Verify => Ok(None),
            SinkTarget::Directory(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "directory entries do not receive data",
            )),
        }
    }
}

impl Write for ExtractionSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if matches!(self.state, SinkState::Pending) {
            let file = self.open_target()?;
            self.state = SinkState::Receiving {
                file,
                acc: Accumulator::default(),
            };
        }

        match &mut self.state {
            SinkState::Receiving { file, acc } => {
                if let Some(file) = file {
                    file.write_all(buf)?;
                }
                acc.update(buf);
                Ok(buf.len())
            }
            _ => Err(io::Error::other(format!(
                "entry already completed: {}",
                self.path
            ))),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            SinkState::Receiving {
                file: Some(file), ..
            } => file.flush(),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_chunk_hash_matches_reference_values() {
        assert_eq!(chunk_hash(&[]), 1);
        // 31 * 1 + 'a'
        assert_eq!(chunk_hash(b"a"), 128);
        // (31 + 'a') * 31 + 'b'
        assert_eq!(chunk_hash(b"ab"), 4066);
        // signed bytes: 31 + (-1)
        assert_eq!(chunk_hash(&[0xFF]), 30);
    }

    #[test]
    fn test_accumulator_xor_folds_chunks() {
        let mut acc = Accumulator::default();
        acc.update(b"a");
        acc.update(b"ab");
        assert_eq!(acc.hash, 128 ^ 4066);
        assert_eq!(acc.size, 3);
    }

    #[test]
    fn test_file_sink_writes_and_reports() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("dir1/file1.txt");

        let mut sink = ExtractionSink::open(0, "dir1/file1.txt", SinkTarget::File(dest.clone()))
            .unwrap();
        assert!(dest.parent().unwrap().is_dir());
        assert!(!dest.exists());

        assert_eq!(sink.write(b"This is ").unwrap(), 8);
        assert_eq!(sink.write(b"the info").unwrap(), 8);
        let record = sink.finish(OperationResult::Ok);

        assert_eq!(fs::read_to_string(&dest).unwrap(), "This is the info");
        assert_eq!(record.status, ItemStatus::Ok);
        assert_eq!(record.bytes_written, 16);
        assert_eq!(
            record.checksum,
            chunk_hash(b"This is ") ^ chunk_hash(b"the info")
        );
        assert!(sink.is_completed());
    }

    #[test]
    fn test_empty_file_is_created_on_ok() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("empty.txt");

        let mut sink = ExtractionSink::open(3, "empty.txt", SinkTarget::File(dest.clone())).unwrap();
        let record = sink.finish(OperationResult::Ok);

        assert_eq!(record.status, ItemStatus::Ok);
        assert_eq!(record.checksum, 0);
        assert_eq!(fs::metadata(&dest).unwrap().len(), 0);
    }

    #[test]
    fn test_failed_result_marks_error() {
        let mut sink = ExtractionSink::open(1, "broken.bin", SinkTarget::Verify).unwrap();
        sink.write_all(b"partial").unwrap();

        let record = sink.finish(OperationResult::CrcError);
        assert_eq!(record.status, ItemStatus::Error);
        assert_eq!(record.result, OperationResult::CrcError);
        assert_eq!(record.bytes_written, 7);
    }

    #[test]
    fn test_verify_sink_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = ExtractionSink::open(0, "info.txt", SinkTarget::Verify).unwrap();
        sink.write_all(b"This is the info").unwrap();
        let record = sink.finish(OperationResult::Ok);

        assert_eq!(record.bytes_written, 16);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_after_completion_fails() {
        let mut sink = ExtractionSink::open(0, "x", SinkTarget::Verify).unwrap();
        sink.finish(OperationResult::Ok);
        assert!(sink.write(b"late").is_err());
    }

    #[test]
    fn test_directory_sink_creates_dir_and_refuses_data() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("dir2");

        let mut sink =
            ExtractionSink::open(0, "dir2", SinkTarget::Directory(Some(dir.clone()))).unwrap();
        assert!(dir.is_dir());
        assert!(sink.write(b"x").is_err());
        assert_eq!(sink.finish(OperationResult::Ok).status, ItemStatus::Ok);
    }

    #[test]
    fn test_write_failure_surfaces_as_error() {
        let temp_dir = TempDir::new().unwrap();
        // The destination is an existing directory, so opening it as a file fails.
        let dest = temp_dir.path().join("taken");
        fs::create_dir(&dest).unwrap();

        let mut sink = ExtractionSink::open(0, "taken", SinkTarget::File(dest)).unwrap();
        assert!(sink.write(b"data").is_err());

        let record = sink.finish(OperationResult::WriteError);
        assert_eq!(record.status, ItemStatus::Error);
    }

    #[test]
    fn test_accumulators_are_per_entry() {
        let mut first = ExtractionSink::open(0, "a", SinkTarget::Verify).unwrap();
        first.write_all(b"aaaa").unwrap();
        let a = first.finish(OperationResult::Ok);

        let mut second = ExtractionSink::open(1, "b", SinkTarget::Verify).unwrap();
        second.write_all(b"b").unwrap();
        let b = second.finish(OperationResult::Ok);

        assert_eq!(a.bytes_written, 4);
        assert_eq!(b.bytes_written, 1);
        assert_eq!(b.checksum, chunk_hash(b"b"));
    }
}
