//! # Archive Writer
//!
//! Walks a directory tree and frames every object it finds as a tar entry on a
//! byte sink. The walk is depth-first, directories come before their contents,
//! siblings are visited in lexicographic file-name order and symlinks are
//! recorded, never followed. The root directory's own name becomes the single
//! top-level directory of the archive.
//!
//! Framing follows the GNU tar layout produced by the `tar` crate: a 512-byte
//! header per entry (plus long-name extension records when needed), content
//! padded to 512 bytes, and two zero blocks at the end.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::common::{find_stage, tag, ArchiveEntry, ArchiveSummary, EntryKind, Stage};
use crate::error::{ArchiverError, PipelineResult};
use crate::fsx::{self as fs, File};

/// Checks that `root` is an existing directory and returns the name its
/// contents are archived under.
pub fn archive_root_name(root: &Path) -> PipelineResult<OsString> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(ArchiverError::InputNotFound { path: root.to_path_buf() }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ArchiverError::InputNotFound { path: root.to_path_buf() })
        }
        Err(e) => return Err(ArchiverError::source_read(root, e)),
    }

    if let Some(name) = root.file_name() {
        return Ok(name.to_os_string());
    }
    // `.`, `..` or `dir/..` name nothing by themselves.
    let canonical = fs::canonicalize(root).map_err(|e| ArchiverError::source_read(root, e))?;
    canonical
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| ArchiverError::UnnamedRoot { path: root.to_path_buf() })
}

/// Serializes the tree under `root_path` into `sink`.
///
/// The sink is not finished beyond the tar trailer; a compressor handed in by
/// reference must still be finished by the caller.
pub fn write_tree<W: Write>(root_path: &Path, sink: W) -> PipelineResult<ArchiveSummary> {
    let mut writer = ArchiveWriter::new(sink);
    writer.append_tree(root_path)?;
    let (_, summary) = writer.finish()?;
    Ok(summary)
}

/// Tar framing over a byte sink.
pub struct ArchiveWriter<W: Write> {
    builder: tar::Builder<FrameSink<W>>,
    summary: ArchiveSummary,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            builder: tar::Builder::new(FrameSink { inner: sink, aborted: false }),
            summary: ArchiveSummary::default(),
        }
    }

    /// Appends `root` and everything below it.
    pub fn append_tree(&mut self, root: &Path) -> PipelineResult<()> {
        let name = archive_root_name(root).map_err(|e| self.abort(e))?;
        let top = PathBuf::from(&name);
        info!(root = %root.display(), top = %top.display(), "archiving tree");

        let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
        for item in walker {
            let item = item.map_err(|e| self.abort(walk_error(e, root)))?;
            let relative = item.path().strip_prefix(root).map_err(|e| {
                let source = io::Error::new(io::ErrorKind::Other, e);
                self.abort(ArchiverError::source_read(item.path(), source))
            })?;
            let archive_path = top.join(relative);

            let meta = item
                .metadata()
                .map_err(|e| self.abort(walk_error(e, root)))?;
            let link_target = if item.file_type().is_symlink() {
                let target = fs::read_link(item.path())
                    .map_err(|e| self.abort(ArchiverError::source_read(item.path(), e)))?;
                Some(target)
            } else {
                None
            };

            match ArchiveEntry::from_metadata(archive_path, &meta, link_target) {
                Some(entry) => self.append_entry(&entry, item.path())?,
                None => {
                    warn!(path = %item.path().display(), "skipping unsupported file type");
                    self.summary.skipped += 1;
                }
            }
        }
        Ok(())
    }

    /// Frames one entry. For regular files the content is read from `source`.
    pub fn append_entry(&mut self, entry: &ArchiveEntry, source: &Path) -> PipelineResult<()> {
        let mut header = entry.header();
        let result = match &entry.kind {
            EntryKind::File => {
                let file = File::open(source).map_err(|e| self.abort(ArchiverError::source_read(source, e)))?;
                let content = SourceFile { inner: file, remaining: entry.size };
                self.builder.append_data(&mut header, &entry.path, content)
            }
            EntryKind::Directory => self.builder.append_data(&mut header, &entry.path, io::empty()),
            EntryKind::Symlink { target } | EntryKind::HardLink { target } => {
                self.builder.append_link(&mut header, &entry.path, target)
            }
        };

        if let Err(e) = result {
            let err = match find_stage(&e) {
                Some(fault) if fault.stage == Stage::Source => ArchiverError::source_read(source, fault.to_io_error()),
                _ => ArchiverError::Codec { source: e },
            };
            return Err(self.abort(err));
        }

        debug!(path = %entry.path.display(), size = entry.size, "framed entry");
        self.summary.record(entry);
        Ok(())
    }

    pub fn summary(&self) -> &ArchiveSummary {
        &self.summary
    }

    /// Writes the end-of-archive marker and returns the sink.
    pub fn finish(self) -> PipelineResult<(W, ArchiveSummary)> {
        let summary = self.summary;
        let frame_sink = self
            .builder
            .into_inner()
            .map_err(|source| ArchiverError::Codec { source })?;
        Ok((frame_sink.inner, summary))
    }

    /// Stops the sink from accepting further bytes so that an abandoned archive
    /// never gets an end-of-archive marker.
    fn abort(&mut self, err: ArchiverError) -> ArchiverError {
        self.builder.get_mut().aborted = true;
        err
    }
}

fn walk_error(err: walkdir::Error, root: &Path) -> ArchiverError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = match err.into_io_error() {
        Some(io) => io,
        None => io::Error::new(io::ErrorKind::Other, "filesystem loop while walking tree"),
    };
    ArchiverError::source_read(path, source)
}

/// The builder's sink; refuses writes once the archive was abandoned.
struct FrameSink<W> {
    inner: W,
    aborted: bool,
}

impl<W: Write> Write for FrameSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.aborted {
            return Err(io::Error::new(io::ErrorKind::Other, "archive aborted"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// File content capped at the size recorded in the header.
///
/// A file that grows is cut at the recorded size; one that shrinks fails,
/// since the header already promised more bytes than exist.
struct SourceFile {
    inner: File,
    remaining: u64,
}

impl Read for SourceFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        match self.inner.read(&mut buf[..max]) {
            Ok(0) => Err(tag(
                Stage::Source,
                io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank while being archived"),
            )),
            Ok(n) => {
                self.remaining -= n as u64;
                Ok(n)
            }
            Err(e) => Err(tag(Stage::Source, e)),
        }
    }
}
