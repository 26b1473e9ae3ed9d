//! The archive codec boundary.
//!
//! The codec owns the archive format and the compression algorithms. The rest
//! of the crate talks to it through the [`ArchiveCodec`] trait and two narrow
//! callback traits: [`CreateCallback`] feeds items in while an archive is
//! written, [`ExtractCallback`] receives bytes while one is read. Both are
//! driven strictly in item-index order on the calling thread.
//!
//! [`SevenZipCodec`] binds the trait to `sevenz-rust2`.

use crate::error::ArchiveError;
use crate::types::{ArchiveEntry, ArchiveItem, CompressionLevel, OperationResult};
use crate::volume::VolumeSet;
use sevenz_rust2::lzma::LZMA2Options;
use sevenz_rust2::{AesEncoderOptions, Password, SevenZArchiveEntry, SevenZReader, SevenZWriter};
use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Chunk size used when moving bytes between the codec and a sink.
const BUFFER_SIZE: usize = 64 * 1024;

/// Supplies items to the codec while an archive is being created.
pub trait CreateCallback {
    /// Number of items in the archive.
    fn item_count(&self) -> usize;

    /// Metadata of the item at `index`.
    fn item_info(&self, index: usize) -> Option<&ArchiveItem>;

    /// Open the byte stream of the item at `index`.
    ///
    /// Returns `Ok(None)` for directories. Each index is opened at most once.
    fn open_stream(&mut self, index: usize) -> Result<Option<Box<dyn Read>>, ArchiveError>;

    /// Password for the whole archive, if it is to be encrypted.
    fn password(&self) -> Option<&str>;

    /// Called once an item has been stored, with the bytes read for it.
    fn on_item_stored(&mut self, _index: usize, _bytes: u64) {}
}

/// Receives decompressed bytes while an archive is being read.
pub trait ExtractCallback {
    /// Destination for the bytes of the entry at `index`.
    ///
    /// `Ok(None)` means the entry has no bytes to receive (directories) or is
    /// skipped. An error marks the entry as failed; the codec discards its
    /// bytes and reports a non-Ok result for it.
    fn open_sink(
        &mut self,
        index: usize,
        entry: &ArchiveEntry,
    ) -> Result<Option<&mut dyn Write>, ArchiveError>;

    /// Final result for the entry at `index`.
    fn on_result(&mut self, index: usize, result: OperationResult);
}

/// Entries of an archive as reported by the codec.
#[derive(Debug, Clone, Default)]
pub struct ArchiveListing {
    pub entries: Vec<ArchiveEntry>,

    /// Whether the headers could only be read with a password
    pub encrypted: bool,
}

/// A compression engine bound to one archive format.
pub trait ArchiveCodec {
    /// Short format name, e.g. `"7Z"`.
    fn format(&self) -> &'static str;

    /// Write a new archive to `output` from the items `callback` supplies.
    ///
    /// Returns the size of the finished archive in bytes.
    fn create(
        &self,
        output: File,
        level: CompressionLevel,
        encrypt_header: bool,
        callback: &mut dyn CreateCallback,
    ) -> Result<u64, ArchiveError>;

    /// Enumerate the entries of the archive in `source`.
    fn list(
        &self,
        source: &mut VolumeSet,
        password: Option<&str>,
    ) -> Result<ArchiveListing, ArchiveError>;

    /// Stream every entry of the archive in `source` into `callback`.
    ///
    /// Per-entry failures are reported through [`ExtractCallback::on_result`].
    /// Only failures that make the rest of the archive unreadable (such as a
    /// wrong password) are returned as errors.
    fn extract(
        &self,
        source: &mut VolumeSet,
        password: Option<&str>,
        callback: &mut dyn ExtractCallback,
    ) -> Result<(), ArchiveError>;
}

/// 7-Zip codec backed by `sevenz-rust2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SevenZipCodec;

impl SevenZipCodec {
    pub fn new() -> Self {
        Self
    }

    fn open_reader<'a>(
        source: &'a mut VolumeSet,
        password: Option<&str>,
    ) -> Result<SevenZReader<&'a mut VolumeSet>, ArchiveError> {
        let len = source.total_size();
        let secret = password.map(Password::from).unwrap_or_else(Password::empty);
        SevenZReader::new(source, len, secret)
            .map_err(|e| map_codec_error(e, password.is_some()))
    }
}

impl ArchiveCodec for SevenZipCodec {
    fn format(&self) -> &'static str {
        "7Z"
    }

    fn create(
        &self,
        output: File,
        level: CompressionLevel,
        encrypt_header: bool,
        callback: &mut dyn CreateCallback,
    ) -> Result<u64, ArchiveError> {
        let mut writer = SevenZWriter::new(output).map_err(|e| map_codec_error(e, false))?;

        let mut methods = Vec::new();
        if let Some(password) = callback.password() {
            methods.push(AesEncoderOptions::new(Password::from(password)).into());
            writer.set_encrypt_header(encrypt_header);
        }
        methods.push(LZMA2Options::with_preset(u32::from(level.get())).into());
        writer.set_content_methods(methods);

        for index in 0..callback.item_count() {
            let item = callback.item_info(index).cloned().ok_or_else(|| {
                ArchiveError::Codec(format!("no item information for index {index}"))
            })?;
            let name = item.relative_path().to_string();

            if item.is_directory() {
                let mut entry = SevenZArchiveEntry::new();
                entry.name = name;
                entry.is_directory = true;
                entry.has_stream = false;
                writer
                    .push_archive_entry::<&[u8]>(entry, None)
                    .map_err(|e| map_codec_error(e, false))?;
                callback.on_item_stored(index, 0);
                continue;
            }

            let stream = callback.open_stream(index)?.ok_or_else(|| {
                ArchiveError::Codec(format!("no content stream for file item {name}"))
            })?;
            let entry = match item.source() {
                Some(source) => SevenZArchiveEntry::from_path(source.path(), name.clone()),
                None => {
                    let mut entry = SevenZArchiveEntry::new();
                    entry.name = name.clone();
                    entry
                }
            };

            let mut counting = CountingReader::new(stream);
            writer
                .push_archive_entry(entry, Some(&mut counting))
                .map_err(|e| map_codec_error(e, false))?;

            let declared = item.size().unwrap_or(0);
            if counting.count != declared {
                return Err(ArchiveError::SizeMismatch {
                    path: name,
                    declared,
                    actual: counting.count,
                });
            }

            tracing::trace!(index, path = %name, bytes = counting.count, "stored item");
            callback.on_item_stored(index, counting.count);
        }

        let file = writer.finish().map_err(|e| map_codec_error(e, false))?;
        Ok(file.metadata()?.len())
    }

    fn list(
        &self,
        source: &mut VolumeSet,
        password: Option<&str>,
    ) -> Result<ArchiveListing, ArchiveError> {
        // Try without a password first: only an encrypted header needs one.
        let plain = Self::open_reader(source, None).map(|reader| entries_of(&reader));
        let (entries, encrypted) = match plain {
            Ok(entries) => (entries, false),
            Err(e) if e.is_password_related() && password.is_some() => {
                source.seek(SeekFrom::Start(0))?;
                (entries_of(&Self::open_reader(source, password)?), true)
            }
            Err(e) => return Err(e),
        };

        Ok(ArchiveListing { entries, encrypted })
    }

    fn extract(
        &self,
        source: &mut VolumeSet,
        password: Option<&str>,
        callback: &mut dyn ExtractCallback,
    ) -> Result<(), ArchiveError> {
        let mut reader = Self::open_reader(source, password)?;
        let entries = entries_of(&reader);

        // Entries arrive grouped by compressed block, so resolve each back to
        // its archive index by name.
        let mut by_name: HashMap<String, VecDeque<usize>> = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            by_name.entry(entry.path.clone()).or_default().push_back(index);
        }

        let mut visited = vec![false; entries.len()];
        let mut fatal: Option<ArchiveError> = None;
        let mut buf = vec![0u8; BUFFER_SIZE];

        let walk = reader.for_each_entries(|raw, data| {
            let Some(index) = by_name.get_mut(raw.name()).and_then(VecDeque::pop_front) else {
                tracing::warn!(path = raw.name(), "codec produced an unknown entry");
                drain(data);
                return Ok(true);
            };
            visited[index] = true;

            match deliver(index, &entries[index], data, callback, &mut buf, password) {
                Ok(result) => {
                    callback.on_result(index, result);
                    Ok(true)
                }
                Err(e) => {
                    callback.on_result(index, OperationResult::DataError);
                    fatal = Some(e);
                    Ok(false)
                }
            }
        });

        if let Some(e) = fatal {
            return Err(e);
        }
        walk.map_err(|e| map_codec_error(e, password.is_some()))?;

        for (index, entry) in entries.iter().enumerate() {
            if visited[index] {
                continue;
            }
            let mut result = deliver(index, entry, &mut io::empty(), callback, &mut buf, password)?;
            // Directories and empty files carry no stream and may be skipped
            if !entry.is_directory && entry.size > 0 {
                tracing::warn!(index, path = %entry.path, "entry was not produced by the codec");
                result = OperationResult::DataError;
            }
            callback.on_result(index, result);
        }

        Ok(())
    }
}

/// Move one entry's bytes from the codec into its sink.
///
/// Only a password failure is returned as `Err`; everything else becomes the
/// entry's [`OperationResult`].
fn deliver(
    index: usize,
    entry: &ArchiveEntry,
    data: &mut dyn Read,
    callback: &mut dyn ExtractCallback,
    buf: &mut [u8],
    password: Option<&str>,
) -> Result<OperationResult, ArchiveError> {
    let sink = match callback.open_sink(index, entry) {
        Ok(Some(sink)) => sink,
        Ok(None) => {
            drain(data);
            return Ok(OperationResult::Ok);
        }
        Err(e) => {
            tracing::warn!(index, path = %entry.path, error = %e, "entry refused by sink");
            drain(data);
            return Ok(match e {
                ArchiveError::Security(_) => OperationResult::Rejected,
                _ => OperationResult::WriteError,
            });
        }
    };

    loop {
        let n = match data.read(buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let message = e.to_string().to_lowercase();
                if is_password_message(&message) {
                    return Err(password_error(password.is_some()));
                }
                tracing::error!(index, path = %entry.path, error = %e, "failed to decode entry");
                return Ok(if message.contains("crc") || message.contains("checksum") {
                    OperationResult::CrcError
                } else {
                    OperationResult::DataError
                });
            }
        };

        if let Err(e) = sink.write_all(&buf[..n]) {
            tracing::error!(index, path = %entry.path, error = %e, "failed to write entry");
            drain(data);
            return Ok(OperationResult::WriteError);
        }
    }

    if let Err(e) = sink.flush() {
        tracing::error!(index, path = %entry.path, error = %e, "failed to flush entry");
        return Ok(OperationResult::WriteError);
    }

    Ok(OperationResult::Ok)
}

fn drain(data: &mut dyn Read) {
    if let Err(e) = io::copy(data, &mut io::sink()) {
        tracing::debug!(error = %e, "failed to drain entry data");
    }
}

fn entries_of<R: Read + Seek>(reader: &SevenZReader<R>) -> Vec<ArchiveEntry> {
    reader.archive().files.iter().map(to_entry).collect()
}

fn to_entry(raw: &SevenZArchiveEntry) -> ArchiveEntry {
    ArchiveEntry {
        path: raw.name().to_string(),
        is_directory: raw.is_directory(),
        size: raw.size(),
        // 7z stores packed sizes per block, not per file
        compressed_size: None,
    }
}

fn is_password_message(message: &str) -> bool {
    message.contains("password")
        || message.contains("encrypted")
        || message.contains("passphrase")
        || message.contains("decrypt")
}

fn password_error(password_given: bool) -> ArchiveError {
    if password_given {
        ArchiveError::InvalidPassword
    } else {
        ArchiveError::PasswordRequired
    }
}

/// Map a codec failure onto [`ArchiveError`] by inspecting its message.
pub(crate) fn map_codec_error(e: impl Display, password_given: bool) -> ArchiveError {
    let message = e.to_string();
    let lower = message.to_lowercase();

    if is_password_message(&lower) {
        return password_error(password_given);
    }

    if lower.contains("corrupt")
        || lower.contains("malformed")
        || lower.contains("damaged")
        || lower.contains("bad signature")
        || lower.contains("badsignature")
        || lower.contains("badterminated")
        || lower.contains("crc")
        || lower.contains("checksum")
    {
        return ArchiveError::Corrupted(message);
    }

    // sevenz-rust2 renders its errors through Debug, e.g. `UnsupportedVersion`
    if lower.contains("unsupported") || lower.contains("not recognized") {
        return ArchiveError::UnsupportedFormat(message);
    }

    ArchiveError::Codec(message)
}

/// Counts the bytes the codec pulls from an item stream.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_codec_error_password() {
        assert!(matches!(
            map_codec_error("PasswordRequired", false),
            ArchiveError::PasswordRequired
        ));
        assert!(matches!(
            map_codec_error("MaybeBadPassword", true),
            ArchiveError::InvalidPassword
        ));
    }

    #[test]
    fn test_map_codec_error_other_kinds() {
        assert!(matches!(
            map_codec_error("BadSignature([0, 1])", false),
            ArchiveError::Corrupted(_)
        ));
        assert!(matches!(
            map_codec_error("UnsupportedCompressionMethod", false),
            ArchiveError::UnsupportedFormat(_)
        ));
        assert!(matches!(
            map_codec_error("BadTerminatedStreamsInfo(9)", false),
            ArchiveError::Corrupted(_)
        ));
        assert!(matches!(
            map_codec_error("ChecksumVerificationFailed", false),
            ArchiveError::Corrupted(_)
        ));
        assert!(matches!(
            map_codec_error("UnsupportedVersion { major: 9, minor: 0 }", false),
            ArchiveError::UnsupportedFormat(_)
        ));
        assert!(matches!(
            map_codec_error("something else", false),
            ArchiveError::Codec(_)
        ));
    }

    #[test]
    fn test_counting_reader() {
        let mut reader = CountingReader::new(&b"This is the info"[..]);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(reader.count, 16);
    }

    struct RecordingSink {
        bytes: Vec<u8>,
        results: Vec<(usize, OperationResult)>,
        refuse: bool,
    }

    impl ExtractCallback for RecordingSink {
        fn open_sink(
            &mut self,
            index: usize,
            entry: &ArchiveEntry,
        ) -> Result<Option<&mut dyn Write>, ArchiveError> {
            if self.refuse {
                return Err(ArchiveError::Security(
                    crate::error::SecurityError::PathTraversal(format!("{index}:{}", entry.path)),
                ));
            }
            if entry.is_directory {
                return Ok(None);
            }
            Ok(Some(&mut self.bytes))
        }

        fn on_result(&mut self, index: usize, result: OperationResult) {
            self.results.push((index, result));
        }
    }

    fn entry(path: &str, is_directory: bool) -> ArchiveEntry {
        ArchiveEntry {
            path: path.to_string(),
            is_directory,
            size: 0,
            compressed_size: None,
        }
    }

    #[test]
    fn test_deliver_copies_bytes() {
        let mut sink = RecordingSink {
            bytes: Vec::new(),
            results: Vec::new(),
            refuse: false,
        };
        let mut buf = vec![0u8; 4];
        let mut data = &b"This is the info"[..];

        let result = deliver(0, &entry("info.txt", false), &mut data, &mut sink, &mut buf, None);
        assert_eq!(result.unwrap(), OperationResult::Ok);
        assert_eq!(sink.bytes, b"This is the info");
    }

    #[test]
    fn test_deliver_rejected_entry() {
        let mut sink = RecordingSink {
            bytes: Vec::new(),
            results: Vec::new(),
            refuse: true,
        };
        let mut buf = vec![0u8; 4];
        let mut data = &b"evil"[..];

        let result = deliver(0, &entry("../evil", false), &mut data, &mut sink, &mut buf, None);
        assert_eq!(result.unwrap(), OperationResult::Rejected);
        assert!(sink.bytes.is_empty());
    }
}
