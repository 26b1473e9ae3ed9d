//! Archive extraction: the session that routes codec output into per-entry
//! sinks.

use crate::codec::{ArchiveCodec, ExtractCallback, SevenZipCodec};
use crate::error::ArchiveError;
use crate::recovery::PathRecovery;
use crate::safety::resolve_within;
use crate::sink::{ExtractionSink, SinkTarget};
use crate::types::{
    ArchiveEntry, ExtractMode, ExtractOptions, ExtractReport, ExtractionRecord, ItemStatus,
    OperationResult,
};
use crate::volume::VolumeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Observer notified as each entry completes.
pub type RecordCallback<'a> = dyn FnMut(&ExtractionRecord) + 'a;

/// State of one extraction run.
///
/// Owns the recovery strategy and the sink of the entry currently being
/// received. Nothing here is shared with other sessions.
pub struct ExtractionSession<'a> {
    output_dir: Option<PathBuf>,
    recovery: PathRecovery,
    current: Option<ExtractionSink>,
    report: ExtractReport,
    observer: Option<&'a mut RecordCallback<'a>>,
}

impl<'a> ExtractionSession<'a> {
    /// Create a session writing below `output_dir`, or verifying only when
    /// `output_dir` is `None`.
    pub fn new(output_dir: Option<PathBuf>, recovery: PathRecovery) -> Self {
        Self {
            output_dir,
            recovery,
            current: None,
            report: ExtractReport::default(),
            observer: None,
        }
    }

    /// Call `observer` with every finished record.
    pub fn with_observer(mut self, observer: &'a mut RecordCallback<'a>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Records collected so far.
    pub fn records(&self) -> &[ExtractionRecord] {
        &self.report.records
    }

    /// Close any entry the codec never reported and return the report.
    pub fn finish(mut self) -> ExtractReport {
        if let Some(mut sink) = self.current.take() {
            tracing::warn!(index = sink.index(), path = sink.path(), "entry left unfinished");
            let record = sink.finish(OperationResult::DataError);
            self.complete(&sink, record);
        }
        self.report
    }

    fn target_for(&self, path: &str, is_directory: bool) -> Result<SinkTarget, ArchiveError> {
        let Some(dir) = &self.output_dir else {
            return Ok(if is_directory {
                SinkTarget::Directory(None)
            } else {
                SinkTarget::Verify
            });
        };

        let dest = resolve_within(dir, path)?;
        Ok(if is_directory {
            SinkTarget::Directory(Some(dest))
        } else {
            SinkTarget::File(dest)
        })
    }

    /// Park a placeholder sink so the coming result is still recorded.
    fn refuse(
        &mut self,
        index: usize,
        path: String,
        error: ArchiveError,
    ) -> Result<Option<&mut dyn Write>, ArchiveError> {
        self.current = Some(ExtractionSink::open(index, path, SinkTarget::Verify)?);
        Err(error)
    }

    fn complete(&mut self, sink: &ExtractionSink, record: ExtractionRecord) {
        let stats = &mut self.report.stats;
        stats.bytes_written += record.bytes_written;

        match record.status {
            ItemStatus::Ok => {
                if matches!(sink.target(), SinkTarget::Directory(_)) {
                    stats.directories_created += 1;
                } else {
                    stats.files_extracted += 1;
                }
                tracing::debug!(
                    index = record.index,
                    path = %record.path,
                    bytes = record.bytes_written,
                    "entry extracted"
                );
            }
            ItemStatus::Error => {
                stats.items_failed += 1;
                tracing::error!(
                    index = record.index,
                    path = %record.path,
                    result = %record.result,
                    "extraction error"
                );
            }
        }

        if let Some(observer) = self.observer.as_mut() {
            observer(&record);
        }
        self.report.records.push(record);
    }
}

impl ExtractCallback for ExtractionSession<'_> {
    fn open_sink(
        &mut self,
        index: usize,
        entry: &ArchiveEntry,
    ) -> Result<Option<&mut dyn Write>, ArchiveError> {
        if let Some(mut stale) = self.current.take() {
            tracing::warn!(index = stale.index(), "entry opened again before its result");
            let record = stale.finish(OperationResult::DataError);
            self.complete(&stale, record);
        }

        let path = self.recovery.recover(&entry.path);
        let target = match self.target_for(&path, entry.is_directory) {
            Ok(target) => target,
            Err(e) => return self.refuse(index, path, e),
        };

        let sink = match ExtractionSink::open(index, path.clone(), target) {
            Ok(sink) => sink,
            Err(e) => return self.refuse(index, path, e.into()),
        };

        let sink = self.current.insert(sink);
        if entry.is_directory {
            Ok(None)
        } else {
            Ok(Some(sink as &mut dyn Write))
        }
    }

    fn on_result(&mut self, index: usize, result: OperationResult) {
        let Some(mut sink) = self.current.take() else {
            tracing::warn!(index, %result, "result for an entry that was never opened");
            return;
        };
        if sink.index() != index {
            tracing::warn!(expected = sink.index(), index, "result for a different entry");
        }

        let record = sink.finish(result);
        self.complete(&sink, record);
    }
}

/// Extract `archive` according to `options`.
///
/// In [`ExtractMode::Standard`] the tree is written below `output_dir`, which
/// is created if needed. In [`ExtractMode::Simple`] every entry is only
/// hashed and counted, and `output_dir` is ignored.
///
/// # Returns
///
/// An [`ExtractReport`] with one record per entry. Entries that fail are
/// recorded with [`ItemStatus::Error`]; they do not fail the whole call.
///
/// # Errors
///
/// Returns an error if the archive is missing or unreadable, the password is
/// missing or wrong, or standard mode has no output directory.
pub fn extract_archive(
    archive: &Path,
    output_dir: Option<&Path>,
    options: &ExtractOptions,
) -> Result<ExtractReport, ArchiveError> {
    extract_with(
        &SevenZipCodec::new(),
        archive,
        output_dir,
        options,
        &mut |_: &ExtractionRecord| {},
    )
}

/// [`extract_archive`] with an explicit codec and a per-record observer.
pub fn extract_with(
    codec: &dyn ArchiveCodec,
    archive: &Path,
    output_dir: Option<&Path>,
    options: &ExtractOptions,
    observer: &mut RecordCallback<'_>,
) -> Result<ExtractReport, ArchiveError> {
    let start_time = Instant::now();

    let output_dir = match options.mode {
        ExtractMode::Simple => None,
        ExtractMode::Standard => {
            let dir = output_dir.ok_or_else(|| {
                ArchiveError::Config("an output directory is required for extraction".to_string())
            })?;
            fs::create_dir_all(dir)?;
            Some(dir.to_path_buf())
        }
    };

    let password = options.password.as_deref().filter(|p| !p.is_empty());
    let recovery = PathRecovery::new(&options.encodings);

    let mut volumes = VolumeSet::open(archive)?;
    tracing::info!(
        archive = %archive.display(),
        volumes = volumes.volume_count(),
        mode = ?options.mode,
        "extracting archive"
    );

    let mut session = ExtractionSession::new(output_dir, recovery).with_observer(observer);
    let outcome = codec.extract(&mut volumes, password, &mut session);
    volumes.close();
    outcome?;

    let mut report = session.finish();
    report.stats.duration = start_time.elapsed();
    tracing::info!(
        files = report.stats.files_extracted,
        directories = report.stats.directories_created,
        failed = report.stats.items_failed,
        bytes = report.stats.bytes_written,
        "extraction finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(path: &str, is_directory: bool) -> ArchiveEntry {
        ArchiveEntry {
            path: path.to_string(),
            is_directory,
            size: 0,
            compressed_size: None,
        }
    }

    #[test]
    fn test_session_writes_files_and_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let mut session =
            ExtractionSession::new(Some(temp_dir.path().to_path_buf()), PathRecovery::default());

        assert!(session.open_sink(0, &entry("dir2", true)).unwrap().is_none());
        session.on_result(0, OperationResult::Ok);

        let sink = session.open_sink(1, &entry("dir1/file1.txt", false)).unwrap().unwrap();
        sink.write_all(b"file one").unwrap();
        session.on_result(1, OperationResult::Ok);

        let report = session.finish();
        assert!(temp_dir.path().join("dir2").is_dir());
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("dir1/file1.txt")).unwrap(),
            "file one"
        );
        assert_eq!(report.stats.files_extracted, 1);
        assert_eq!(report.stats.directories_created, 1);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[1].bytes_written, 8);
    }

    #[test]
    fn test_write_failure_only_fails_that_entry() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("blocked")).unwrap();
        let mut session =
            ExtractionSession::new(Some(temp_dir.path().to_path_buf()), PathRecovery::default());

        // A directory already sits where the file should go
        let sink = session.open_sink(0, &entry("blocked", false)).unwrap().unwrap();
        assert!(sink.write_all(b"lost").is_err());
        session.on_result(0, OperationResult::WriteError);

        let sink = session.open_sink(1, &entry("info.txt", false)).unwrap().unwrap();
        sink.write_all(b"This is the info").unwrap();
        session.on_result(1, OperationResult::Ok);

        let report = session.finish();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].status, ItemStatus::Error);
        assert_eq!(report.records[0].result, OperationResult::WriteError);
        assert_eq!(report.records[1].status, ItemStatus::Ok);
        assert_eq!(report.stats.items_failed, 1);
        assert_eq!(report.stats.files_extracted, 1);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("info.txt")).unwrap(),
            "This is the info"
        );
    }

    #[test]
    fn test_session_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out");
        let mut session = ExtractionSession::new(Some(out.clone()), PathRecovery::default());

        let refused = session.open_sink(0, &entry("../evil.txt", false));
        assert!(matches!(refused, Err(ArchiveError::Security(_))));
        session.on_result(0, OperationResult::Rejected);

        let report = session.finish();
        assert_eq!(report.records[0].status, ItemStatus::Error);
        assert_eq!(report.records[0].result, OperationResult::Rejected);
        assert_eq!(report.stats.items_failed, 1);
        assert!(!temp_dir.path().join("evil.txt").exists());
    }

    #[test]
    fn test_session_verify_only_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = ExtractionSession::new(None, PathRecovery::default());

        let sink = session.open_sink(0, &entry("info.txt", false)).unwrap().unwrap();
        sink.write_all(b"This is the info").unwrap();
        session.on_result(0, OperationResult::Ok);

        let report = session.finish();
        assert_eq!(report.records[0].bytes_written, 16);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_session_recovers_names() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = ExtractionSession::new(
            Some(temp_dir.path().to_path_buf()),
            PathRecovery::new(&["GBK"]),
        );

        let sink = session.open_sink(0, &entry("ÖÐÎÄ.txt", false)).unwrap().unwrap();
        sink.write_all(b"x").unwrap();
        session.on_result(0, OperationResult::Ok);

        let report = session.finish();
        assert_eq!(report.records[0].path, "中文.txt");
        assert!(temp_dir.path().join("中文.txt").is_file());
    }

    #[test]
    fn test_session_observer_sees_each_record() {
        let mut seen = Vec::new();
        let mut observer = |record: &ExtractionRecord| seen.push(record.path.clone());
        let mut session =
            ExtractionSession::new(None, PathRecovery::default()).with_observer(&mut observer);

        for (index, name) in ["a", "b"].iter().enumerate() {
            session.open_sink(index, &entry(name, false)).unwrap();
            session.on_result(index, OperationResult::Ok);
        }
        drop(session.finish());

        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_unfinished_entry_is_recorded_as_error() {
        let mut session = ExtractionSession::new(None, PathRecovery::default());
        session.open_sink(0, &entry("cut.bin", false)).unwrap();

        let report = session.finish();
        assert_eq!(report.records[0].status, ItemStatus::Error);
        assert_eq!(report.records[0].result, OperationResult::DataError);
    }

    #[test]
    fn test_standard_mode_requires_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("a.7z");
        fs::write(&archive, b"not an archive").unwrap();

        let result = extract_archive(&archive, None, &ExtractOptions::default());
        assert!(matches!(result, Err(ArchiveError::Config(_))));
    }

    #[test]
    fn test_missing_archive_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = extract_archive(
            &temp_dir.path().join("missing.7z"),
            Some(&temp_dir.path().join("out")),
            &ExtractOptions::default(),
        );
        assert!(matches!(result, Err(ArchiveError::NotFound(_))));
    }
}
