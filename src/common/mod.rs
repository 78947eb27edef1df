//! Common utilities and types module.
//!
//! Holds the entry model shared by the writer and the reader, the entry path
//! validation both sides apply, and the stage tagging used to attribute I/O
//! errors after they have travelled through the zstd and tar layers.

use std::error::Error as StdError;
use std::fmt;
use std::fs::Metadata;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::{ArchiverError, PipelineResult};

/// Kind of filesystem object captured in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink { target: PathBuf },
    /// Only produced by other tar writers; `zstar` never emits hard links.
    HardLink { target: PathBuf },
}

/// Metadata for a single entry of the frame stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Relative path, rooted at the archive's top-level directory name.
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Content length in bytes. Always zero for anything but regular files.
    pub size: u64,
    /// Permission bits (`0o7777` mask).
    pub mode: u32,
    /// Modification time as a Unix timestamp.
    pub mtime: u64,
    pub uid: u64,
    pub gid: u64,
}

impl ArchiveEntry {
    /// Builds an entry from `symlink_metadata` of the object at `path`.
    ///
    /// Returns `None` for object types that have no tar representation here
    /// (sockets, FIFOs, device nodes).
    pub fn from_metadata(path: PathBuf, meta: &Metadata, link_target: Option<PathBuf>) -> Option<Self> {
        let file_type = meta.file_type();
        let (kind, size) = if file_type.is_symlink() {
            (EntryKind::Symlink { target: link_target? }, 0)
        } else if file_type.is_dir() {
            (EntryKind::Directory, 0)
        } else if file_type.is_file() {
            (EntryKind::File, meta.len())
        } else {
            return None;
        };

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let (mode, uid, gid) = owner_and_mode(meta, &kind);

        Some(Self { path, kind, size, mode, mtime, uid, gid })
    }

    /// Renders the tar header for this entry. Paths and link names are attached
    /// by the builder so that long names get GNU extension records.
    pub fn header(&self) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(match self.kind {
            EntryKind::File => tar::EntryType::Regular,
            EntryKind::Directory => tar::EntryType::Directory,
            EntryKind::Symlink { .. } => tar::EntryType::Symlink,
            EntryKind::HardLink { .. } => tar::EntryType::Link,
        });
        header.set_size(self.size);
        header.set_mode(self.mode);
        header.set_mtime(self.mtime);
        header.set_uid(self.uid);
        header.set_gid(self.gid);
        header
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }
}

#[cfg(unix)]
fn owner_and_mode(meta: &Metadata, _kind: &EntryKind) -> (u32, u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.mode() & 0o7777, meta.uid() as u64, meta.gid() as u64)
}

#[cfg(not(unix))]
fn owner_and_mode(meta: &Metadata, kind: &EntryKind) -> (u32, u64, u64) {
    let base = match kind {
        EntryKind::Directory => 0o755,
        EntryKind::Symlink { .. } => 0o777,
        _ => 0o644,
    };
    let mode = if meta.permissions().readonly() { base & !0o222 } else { base };
    (mode, 0, 0)
}

/// Totals reported by a successful operation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub hard_links: u64,
    /// Entries left out because their type is not supported.
    pub skipped: u64,
    /// Sum of regular file content lengths.
    pub content_bytes: u64,
    /// Size of the compressed archive; zero when unknown.
    pub compressed_bytes: u64,
}

impl ArchiveSummary {
    pub fn record(&mut self, entry: &ArchiveEntry) {
        match entry.kind {
            EntryKind::File => {
                self.files += 1;
                self.content_bytes += entry.size;
            }
            EntryKind::Directory => self.directories += 1,
            EntryKind::Symlink { .. } => self.symlinks += 1,
            EntryKind::HardLink { .. } => self.hard_links += 1,
        }
    }

    pub fn entries(&self) -> u64 {
        self.files + self.directories + self.symlinks + self.hard_links
    }
}

/// Checks that an entry path stays inside the archive root and returns it
/// with `.` components dropped.
///
/// Absolute paths, drive prefixes and any `..` component are rejected; the
/// check does not try to normalize `a/../b` into something acceptable.
pub fn validate_entry_path(path: &Path) -> PipelineResult<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiverError::UnsafePath { entry: path.to_path_buf() });
            }
        }
    }
    Ok(clean)
}

// --- stage attribution ------------------------------------------------------

/// Pipeline stage that raised an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    /// A file being archived, or the archive file being extracted.
    Source,
    /// The zstd decoder.
    Codec,
}

/// Payload marking an `io::Error` with the stage that raised it, so the tag
/// survives being wrapped by the zstd and tar layers.
#[derive(Debug)]
pub(crate) struct StageFault {
    pub(crate) stage: Stage,
    inner: io::Error,
}

impl fmt::Display for StageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl StdError for StageFault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.inner)
    }
}

impl StageFault {
    /// Rebuilds an owned error equivalent to the one that was tagged.
    pub(crate) fn to_io_error(&self) -> io::Error {
        io::Error::new(self.inner.kind(), self.inner.to_string())
    }
}

pub(crate) fn tag(stage: Stage, err: io::Error) -> io::Error {
    io::Error::new(err.kind(), StageFault { stage, inner: err })
}

/// Finds the outermost stage tag in the cause chain of `err`.
///
/// `io::Error::source` skips over custom payloads, so payloads are entered
/// through `get_ref` instead.
pub(crate) fn find_stage(err: &io::Error) -> Option<&StageFault> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(fault) = e.downcast_ref::<StageFault>() {
            return Some(fault);
        }
        current = match e.downcast_ref::<io::Error>().and_then(|io| io.get_ref()) {
            Some(payload) => Some(payload as &(dyn StdError + 'static)),
            None => e.source(),
        };
    }
    None
}

/// Reader that tags every error it returns as a source fault.
pub(crate) struct SourceReader<R> {
    inner: R,
}

impl<R: Read> SourceReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for SourceReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).map_err(|e| tag(Stage::Source, e))
    }
}
