//! # Extraction Module
//!
//! Parses a tar frame stream sequentially and materializes each entry under a
//! destination root. Nothing is buffered beyond one copy chunk: entry content
//! is streamed straight from the decoder into the target file.
//!
//! Every entry path is validated before anything touches the disk. Relative
//! paths with `..` components, absolute paths, and paths whose parent inside
//! the destination is a symlink are refused with [`ArchiverError::UnsafePath`].
//! An existing file or symlink at a target path is unlinked and replaced, so
//! extraction never writes through a pre-existing link.
//!
//! Directory permissions and timestamps are applied after the last entry,
//! deepest first, the same way `tar -x` does it.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::common::{find_stage, validate_entry_path, ArchiveEntry, ArchiveSummary, EntryKind, Stage};
use crate::error::{ArchiverError, PipelineResult};
use crate::fsx::{self as fs, File};

const COPY_BUFFER: usize = 256 * 1024;

/// Extracts every entry of the frame stream `source` under `dest_root`,
/// creating it if needed.
pub fn read_tree<R: Read>(source: R, dest_root: &Path) -> PipelineResult<ArchiveSummary> {
    ArchiveReader::new(source).unpack(dest_root)
}

/// Reads the frame stream `source` and returns its entries without writing
/// anything. `origin` names the stream in read errors.
pub fn list_entries<R: Read>(source: R, origin: &Path) -> PipelineResult<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    ArchiveReader::new(source)
        .with_origin(origin)
        .list(|entry| entries.push(entry.clone()))?;
    Ok(entries)
}

/// A reader for tar frame streams.
///
/// The reader is single-use: [`unpack`](Self::unpack) and [`list`](Self::list)
/// consume it.
pub struct ArchiveReader<R: Read> {
    archive: tar::Archive<EofWatch<R>>,
    eof: Rc<Cell<bool>>,
    origin: PathBuf,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(source: R) -> Self {
        let eof = Rc::new(Cell::new(false));
        let watched = EofWatch { inner: source, eof: Rc::clone(&eof) };
        Self {
            archive: tar::Archive::new(watched),
            eof,
            origin: PathBuf::from("-"),
        }
    }

    /// Names the file the stream comes from, for read errors raised by it.
    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Materializes every entry under `dest_root`.
    pub fn unpack(self, dest_root: &Path) -> PipelineResult<ArchiveSummary> {
        let Self { mut archive, eof, origin } = self;
        let faults = FaultContext { eof: &eof, origin: &origin };

        fs::create_dir_all(dest_root).map_err(|e| ArchiverError::destination(dest_root, e))?;
        info!(dest = %dest_root.display(), "extracting archive");

        let mut summary = ArchiveSummary::default();
        let mut deferred: Vec<DeferredDir> = Vec::new();
        let mut last: Option<PathBuf> = None;

        let entries = archive.entries().map_err(|e| faults.classify(e, last.as_deref()))?;
        for raw in entries {
            let mut raw = raw.map_err(|e| faults.classify(e, last.as_deref()))?;
            let Some(entry) = parse_entry(&raw, &faults, last.as_deref())? else {
                summary.skipped += 1;
                continue;
            };
            materialize(&entry, &mut raw, dest_root, &faults, &mut deferred)?;
            debug!(path = %entry.path.display(), size = entry.size, "extracted entry");
            summary.record(&entry);
            last = Some(entry.path);
        }

        faults.require_trailer(last.as_deref())?;
        drain_trailer(archive, &faults)?;
        apply_directory_metadata(deferred);
        info!(entries = summary.entries(), bytes = summary.content_bytes, "extraction finished");
        Ok(summary)
    }

    /// Walks the stream, handing each entry to `visit`. Content is skipped.
    pub fn list<F: FnMut(&ArchiveEntry)>(self, mut visit: F) -> PipelineResult<ArchiveSummary> {
        let Self { mut archive, eof, origin } = self;
        let faults = FaultContext { eof: &eof, origin: &origin };

        let mut summary = ArchiveSummary::default();
        let mut last: Option<PathBuf> = None;

        let entries = archive.entries().map_err(|e| faults.classify(e, last.as_deref()))?;
        for raw in entries {
            let raw = raw.map_err(|e| faults.classify(e, last.as_deref()))?;
            let Some(entry) = parse_entry(&raw, &faults, last.as_deref())? else {
                summary.skipped += 1;
                continue;
            };
            visit(&entry);
            summary.record(&entry);
            last = Some(entry.path);
        }
        faults.require_trailer(last.as_deref())?;
        drain_trailer(archive, &faults)?;
        Ok(summary)
    }
}

/// Records whether the decompressed stream has reached its end, so a framing
/// error can be told apart from a stream that simply stopped.
struct EofWatch<R> {
    inner: R,
    eof: Rc<Cell<bool>>,
}

impl<R: Read> Read for EofWatch<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.eof.set(true);
        }
        Ok(n)
    }
}

/// Reads whatever follows the end-of-archive marker, so the codec gets to
/// reach and verify the end of its frame.
fn drain_trailer<R: Read>(archive: tar::Archive<EofWatch<R>>, faults: &FaultContext<'_>) -> PipelineResult<()> {
    let mut rest = archive.into_inner();
    io::copy(&mut rest, &mut io::sink()).map_err(|e| faults.classify(e, None))?;
    Ok(())
}

struct FaultContext<'a> {
    eof: &'a Cell<bool>,
    origin: &'a Path,
}

impl FaultContext<'_> {
    /// Attributes an error raised while pulling bytes through the stream.
    fn classify(&self, err: io::Error, last: Option<&Path>) -> ArchiverError {
        if let Some(fault) = find_stage(&err) {
            return match fault.stage {
                Stage::Source => ArchiverError::source_read(self.origin, fault.to_io_error()),
                Stage::Codec => ArchiverError::Codec { source: fault.to_io_error() },
            };
        }
        if self.eof.get() {
            let detail = match last {
                Some(path) => format!("stream ended after entry '{}' ({err})", path.display()),
                None => format!("stream ended inside the first entry header ({err})"),
            };
            return ArchiverError::TruncatedArchive { entry: None, detail };
        }
        ArchiverError::MalformedArchive { source: err }
    }

    /// The entry iterator stops at the first zero block without reading past
    /// it, so an exhausted stream at that point means the marker never came.
    /// This is what an interrupted write leaves behind, and also an empty stream.
    fn require_trailer(&self, last: Option<&Path>) -> PipelineResult<()> {
        if !self.eof.get() {
            return Ok(());
        }
        let detail = match last {
            Some(path) => format!("stream ended without end-of-archive marker after '{}'", path.display()),
            None => "stream ended without any entry or end-of-archive marker".to_string(),
        };
        Err(ArchiverError::TruncatedArchive { entry: None, detail })
    }
}

fn parse_entry<R: Read>(
    raw: &tar::Entry<'_, R>,
    faults: &FaultContext<'_>,
    last: Option<&Path>,
) -> PipelineResult<Option<ArchiveEntry>> {
    let header = raw.header();
    let entry_type = header.entry_type();
    let raw_path = raw.path().map_err(|e| faults.classify(e, last))?.into_owned();

    let kind = match entry_type {
        tar::EntryType::Directory => EntryKind::Directory,
        tar::EntryType::Regular | tar::EntryType::Continuous => EntryKind::File,
        tar::EntryType::Symlink | tar::EntryType::Link => {
            let target = raw
                .link_name()
                .map_err(|e| faults.classify(e, last))?
                .ok_or_else(|| ArchiverError::MalformedArchive {
                    source: io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("link entry '{}' has no target", raw_path.display()),
                    ),
                })?
                .into_owned();
            if entry_type == tar::EntryType::Link {
                EntryKind::HardLink { target: validate_entry_path(&target)? }
            } else {
                EntryKind::Symlink { target }
            }
        }
        other => {
            warn!(path = %raw_path.display(), kind = ?other, "skipping unsupported tar entry type");
            return Ok(None);
        }
    };

    let path = validate_entry_path(&raw_path)?;
    let malformed = |source: io::Error| ArchiverError::MalformedArchive { source };
    let size = if matches!(kind, EntryKind::File) { raw.size() } else { 0 };

    Ok(Some(ArchiveEntry {
        path,
        kind,
        size,
        mode: header.mode().map_err(malformed)? & 0o7777,
        // Writers commonly leave these blank; they are informational here.
        mtime: header.mtime().unwrap_or(0),
        uid: header.uid().unwrap_or(0),
        gid: header.gid().unwrap_or(0),
    }))
}

struct DeferredDir {
    path: PathBuf,
    mode: u32,
    mtime: u64,
}

fn materialize<R: Read>(
    entry: &ArchiveEntry,
    content: &mut R,
    dest_root: &Path,
    faults: &FaultContext<'_>,
    deferred: &mut Vec<DeferredDir>,
) -> PipelineResult<()> {
    if entry.path.as_os_str().is_empty() {
        // `./` style entries name the destination root itself.
        return match entry.kind {
            EntryKind::Directory => Ok(()),
            _ => Err(ArchiverError::UnsafePath { entry: entry.path.clone() }),
        };
    }

    reject_symlinked_parents(dest_root, &entry.path)?;
    let target = dest_root.join(&entry.path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| ArchiverError::destination(parent, e))?;
    }

    match &entry.kind {
        EntryKind::Directory => {
            fs::prepare_dir(&target).map_err(|e| ArchiverError::destination(&target, e))?;
            deferred.push(DeferredDir { path: target, mode: permitted_mode(entry.mode), mtime: entry.mtime });
        }
        EntryKind::File => {
            fs::clear_for_replace(&target).map_err(|e| ArchiverError::destination(&target, e))?;
            let mut file = File::create(&target).map_err(|e| ArchiverError::destination(&target, e))?;
            let copied = copy_content(content, &mut file, &target, faults, &entry.path)?;
            if copied < entry.size {
                return Err(ArchiverError::TruncatedArchive {
                    entry: Some(entry.path.clone()),
                    detail: format!(
                        "'{}' announced {} content bytes, stream ended after {}",
                        entry.path.display(),
                        entry.size,
                        copied
                    ),
                });
            }
            drop(file);
            restore_metadata(&target, permitted_mode(entry.mode), entry.mtime);
        }
        EntryKind::Symlink { target: link } => {
            fs::clear_for_replace(&target).map_err(|e| ArchiverError::destination(&target, e))?;
            fs::symlink(link, &target).map_err(|e| ArchiverError::destination(&target, e))?;
            if let Err(e) = fs::set_symlink_mtime(&target, entry.mtime) {
                debug!(path = %target.display(), "symlink mtime not restored: {e}");
            }
        }
        EntryKind::HardLink { target: link } => {
            reject_symlinked_parents(dest_root, link)?;
            let original = dest_root.join(link);
            fs::clear_for_replace(&target).map_err(|e| ArchiverError::destination(&target, e))?;
            fs::hard_link(&original, &target).map_err(|e| ArchiverError::destination(&target, e))?;
        }
    }
    Ok(())
}

/// Refuses `relative` if any existing ancestor of it below `dest_root` is a symlink.
fn reject_symlinked_parents(dest_root: &Path, relative: &Path) -> PipelineResult<()> {
    let mut current = dest_root.to_path_buf();
    let parents = relative.parent().map(|p| p.components().count()).unwrap_or(0);
    for component in relative.components().take(parents) {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ArchiverError::UnsafePath { entry: relative.to_path_buf() });
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ArchiverError::destination(&current, e)),
        }
    }
    Ok(())
}

fn copy_content<R: Read, W: Write>(
    content: &mut R,
    file: &mut W,
    target: &Path,
    faults: &FaultContext<'_>,
    entry: &Path,
) -> PipelineResult<u64> {
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut copied = 0u64;
    loop {
        let n = match content.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(faults.classify(e, Some(entry))),
        };
        file.write_all(&buf[..n]).map_err(|e| ArchiverError::destination(target, e))?;
        copied += n as u64;
    }
    file.flush().map_err(|e| ArchiverError::destination(target, e))?;
    Ok(copied)
}

/// Setuid, setgid and sticky bits are only restored for a privileged user.
fn permitted_mode(mode: u32) -> u32 {
    if fs::is_privileged() {
        mode & 0o7777
    } else {
        mode & 0o777
    }
}

/// Best-effort: permission bits and mtime are restored where the platform allows.
fn restore_metadata(path: &Path, mode: u32, mtime: u64) {
    if let Err(e) = fs::set_unix_permissions(path, mode) {
        warn!(path = %path.display(), "permissions not restored: {e}");
    }
    if let Err(e) = fs::set_mtime(path, mtime) {
        warn!(path = %path.display(), "mtime not restored: {e}");
    }
}

fn apply_directory_metadata(mut deferred: Vec<DeferredDir>) {
    deferred.sort_by(|a, b| b.path.cmp(&a.path));
    for dir in deferred {
        restore_metadata(&dir.path, dir.mode, dir.mtime);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn tar_with(build: impl FnOnce(&mut tar::Builder<&mut Vec<u8>>)) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut out);
            build(&mut builder);
            builder.finish().unwrap();
        }
        out
    }

    fn file_header(size: u64) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(size);
        header.set_mode(0o644);
        header
    }

    /// Writes a header with an arbitrary name, bypassing the builder's own path checks.
    fn raw_file_entry(name: &str, body: &[u8]) -> Vec<u8> {
        let mut header = file_header(body.len() as u64);
        let gnu = header.as_gnu_mut().unwrap();
        gnu.name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_cksum();
        let mut out = header.as_bytes().to_vec();
        out.extend_from_slice(body);
        out.resize(out.len() + (512 - body.len() % 512) % 512, 0);
        out.extend_from_slice(&[0u8; 1024]);
        out
    }

    #[test]
    fn extracts_files_and_dirs() {
        let stream = tar_with(|b| {
            let mut dir = tar::Header::new_gnu();
            dir.set_entry_type(tar::EntryType::Directory);
            dir.set_mode(0o755);
            dir.set_size(0);
            b.append_data(&mut dir, "top", io::empty()).unwrap();
            b.append_data(&mut file_header(5), "top/a.txt", &b"hello"[..]).unwrap();
            b.append_data(&mut file_header(0), "top/sub/empty", io::empty()).unwrap();
        });
        let out = tempdir().unwrap();
        let summary = read_tree(Cursor::new(stream), out.path()).unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.directories, 1);
        assert_eq!(fs::read(out.path().join("top/a.txt")).unwrap(), b"hello");
        assert_eq!(fs::metadata(out.path().join("top/sub/empty")).unwrap().len(), 0);
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let stream = raw_file_entry("../evil", b"pwned");
        let outer = tempdir().unwrap();
        let dest = outer.path().join("dest");
        let err = read_tree(Cursor::new(stream), &dest).unwrap_err();
        assert!(matches!(err, ArchiverError::UnsafePath { .. }), "{err}");
        assert!(!outer.path().join("evil").exists());
    }

    #[test]
    fn absolute_path_is_rejected() {
        let stream = raw_file_entry("/tmp/zstar-absolute-evil", b"pwned");
        let out = tempdir().unwrap();
        let err = read_tree(Cursor::new(stream), out.path()).unwrap_err();
        assert!(matches!(err, ArchiverError::UnsafePath { .. }), "{err}");
    }

    #[test]
    fn short_content_is_truncation() {
        let mut stream = raw_file_entry("top/big.bin", &[9u8; 2048]);
        stream.truncate(512 + 1000);
        let out = tempdir().unwrap();
        let err = read_tree(Cursor::new(stream), out.path()).unwrap_err();
        match err {
            ArchiverError::TruncatedArchive { entry, .. } => {
                assert_eq!(entry.as_deref(), Some(Path::new("top/big.bin")))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn partial_header_is_truncation() {
        let mut stream = raw_file_entry("top/a.txt", b"abc");
        // keep the first entry, then half of a second header
        stream.truncate(1024);
        stream.extend_from_slice(&[b'x'; 200]);
        let out = tempdir().unwrap();
        let err = read_tree(Cursor::new(stream), out.path()).unwrap_err();
        assert!(matches!(err, ArchiverError::TruncatedArchive { entry: None, .. }), "{err}");
    }

    #[test]
    fn corrupt_header_is_malformed() {
        let mut stream = raw_file_entry("top/a.txt", b"abc");
        stream[148] ^= 0x01; // checksum field
        stream.extend_from_slice(&[0u8; 4096]);
        let out = tempdir().unwrap();
        let err = read_tree(Cursor::new(stream), out.path()).unwrap_err();
        assert!(matches!(err, ArchiverError::MalformedArchive { .. }), "{err}");
    }

    #[test]
    fn existing_file_is_overwritten() {
        let out = tempdir().unwrap();
        fs::create_dir_all(out.path().join("top")).unwrap();
        fs::write(out.path().join("top/a.txt"), b"old contents that are longer").unwrap();
        let stream = tar_with(|b| {
            b.append_data(&mut file_header(3), "top/a.txt", &b"new"[..]).unwrap();
        });
        read_tree(Cursor::new(stream), out.path()).unwrap();
        assert_eq!(fs::read(out.path().join("top/a.txt")).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn writes_through_extracted_symlinks_are_rejected() {
        let outer = tempdir().unwrap();
        let dest = outer.path().join("dest");
        let escape = outer.path().join("escape");
        fs::create_dir_all(&escape).unwrap();

        let stream = tar_with(|b| {
            let mut link = tar::Header::new_gnu();
            link.set_entry_type(tar::EntryType::Symlink);
            link.set_size(0);
            link.set_mode(0o777);
            b.append_link(&mut link, "top/out", &escape).unwrap();
            b.append_data(&mut file_header(5), "top/out/planted", &b"pwned"[..]).unwrap();
        });
        let err = read_tree(Cursor::new(stream), &dest).unwrap_err();
        assert!(matches!(err, ArchiverError::UnsafePath { .. }), "{err}");
        assert!(!escape.join("planted").exists());
    }

    #[cfg(unix)]
    #[test]
    fn existing_symlink_target_is_replaced_not_followed() {
        let outer = tempdir().unwrap();
        let dest = outer.path().join("dest");
        let victim = outer.path().join("victim.txt");
        fs::write(&victim, b"keep me").unwrap();
        fs::create_dir_all(dest.join("top")).unwrap();
        std::os::unix::fs::symlink(&victim, dest.join("top/a.txt")).unwrap();

        let stream = tar_with(|b| {
            b.append_data(&mut file_header(3), "top/a.txt", &b"new"[..]).unwrap();
        });
        read_tree(Cursor::new(stream), &dest).unwrap();
        assert_eq!(fs::read(&victim).unwrap(), b"keep me");
        assert_eq!(fs::read(dest.join("top/a.txt")).unwrap(), b"new");
        assert!(!fs::symlink_metadata(dest.join("top/a.txt")).unwrap().file_type().is_symlink());
    }

    #[cfg(unix)]
    #[test]
    fn modes_and_mtimes_are_restored() {
        use std::os::unix::fs::PermissionsExt;
        let stream = tar_with(|b| {
            let mut dir = tar::Header::new_gnu();
            dir.set_entry_type(tar::EntryType::Directory);
            dir.set_mode(0o555);
            dir.set_size(0);
            dir.set_mtime(1_000_000);
            b.append_data(&mut dir, "ro", io::empty()).unwrap();
            let mut exe = file_header(2);
            exe.set_mode(0o751);
            exe.set_mtime(1_234_567);
            b.append_data(&mut exe, "ro/run.sh", &b"#!"[..]).unwrap();
        });
        let out = tempdir().unwrap();
        read_tree(Cursor::new(stream), out.path()).unwrap();

        let exe = fs::metadata(out.path().join("ro/run.sh")).unwrap();
        assert_eq!(exe.permissions().mode() & 0o7777, 0o751);
        let exe_mtime = filetime::FileTime::from_last_modification_time(&exe);
        assert_eq!(exe_mtime.unix_seconds(), 1_234_567);

        let dir = fs::metadata(out.path().join("ro")).unwrap();
        assert_eq!(dir.permissions().mode() & 0o7777, 0o555);
        let dir_mtime = filetime::FileTime::from_last_modification_time(&dir);
        assert_eq!(dir_mtime.unix_seconds(), 1_000_000);

        // let tempdir clean up
        fs::set_unix_permissions(&out.path().join("ro"), 0o755).unwrap();
    }

    #[test]
    fn list_reports_without_writing() {
        let stream = tar_with(|b| {
            b.append_data(&mut file_header(4), "top/x.bin", &b"1234"[..]).unwrap();
            b.append_data(&mut file_header(2), "top/y.bin", &b"56"[..]).unwrap();
        });
        let entries = list_entries(Cursor::new(stream), Path::new("-")).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.path.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("top/x.bin"), PathBuf::from("top/y.bin")]);
        assert_eq!(entries[0].size, 4);
    }

    #[test]
    fn missing_end_marker_is_truncation() {
        // One complete entry, then the stream stops where the zero blocks belong.
        let mut stream = raw_file_entry("top/a.txt", b"abc");
        stream.truncate(1024);
        let out = tempdir().unwrap();
        let err = read_tree(Cursor::new(stream.clone()), out.path()).unwrap_err();
        assert!(matches!(err, ArchiverError::TruncatedArchive { entry: None, .. }), "{err}");
        let err = list_entries(Cursor::new(stream), Path::new("-")).unwrap_err();
        assert!(matches!(err, ArchiverError::TruncatedArchive { .. }), "{err}");
    }

    #[test]
    fn empty_stream_is_truncation() {
        let out = tempdir().unwrap();
        let err = read_tree(Cursor::new(Vec::new()), out.path()).unwrap_err();
        assert!(matches!(err, ArchiverError::TruncatedArchive { entry: None, .. }), "{err}");
    }

    fn hard_link_header() -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Link);
        header.set_size(0);
        header.set_mode(0o644);
        header
    }

    #[test]
    fn hard_link_shares_content() {
        let stream = tar_with(|b| {
            b.append_data(&mut file_header(3), "top/a", &b"abc"[..]).unwrap();
            b.append_link(&mut hard_link_header(), "top/h", "top/a").unwrap();
        });
        let out = tempdir().unwrap();
        let summary = read_tree(Cursor::new(stream), out.path()).unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.hard_links, 1);
        assert_eq!(fs::read(out.path().join("top/h")).unwrap(), b"abc");

        fs::write(out.path().join("top/a"), b"xyz").unwrap();
        assert_eq!(fs::read(out.path().join("top/h")).unwrap(), b"xyz");
    }

    #[test]
    fn hard_link_to_absolute_target_is_rejected() {
        let stream = tar_with(|b| {
            b.append_link(&mut hard_link_header(), "top/h", "/etc/passwd").unwrap();
        });
        let out = tempdir().unwrap();
        let err = read_tree(Cursor::new(stream), out.path()).unwrap_err();
        assert!(matches!(err, ArchiverError::UnsafePath { .. }), "{err}");
        assert!(!out.path().join("top/h").exists());
    }

    #[cfg(unix)]
    #[test]
    fn hard_link_through_extracted_symlink_is_rejected() {
        let outer = tempdir().unwrap();
        let dest = outer.path().join("dest");
        let escape = outer.path().join("escape");
        fs::create_dir_all(&escape).unwrap();
        fs::write(escape.join("secret"), b"outside").unwrap();

        let stream = tar_with(|b| {
            let mut link = tar::Header::new_gnu();
            link.set_entry_type(tar::EntryType::Symlink);
            link.set_size(0);
            link.set_mode(0o777);
            b.append_link(&mut link, "top/s", &escape).unwrap();
            b.append_link(&mut hard_link_header(), "top/h", "top/s/secret").unwrap();
        });
        let err = read_tree(Cursor::new(stream), &dest).unwrap_err();
        assert!(matches!(err, ArchiverError::UnsafePath { .. }), "{err}");
        assert!(fs::symlink_metadata(dest.join("top/h")).is_err());
        assert_eq!(fs::read(escape.join("secret")).unwrap(), b"outside");
    }

    #[test]
    fn directory_in_the_way_is_a_destination_failure() {
        let out = tempdir().unwrap();
        fs::create_dir_all(out.path().join("top/x")).unwrap();
        let stream = tar_with(|b| {
            b.append_data(&mut file_header(3), "top/x", &b"abc"[..]).unwrap();
        });
        let err = read_tree(Cursor::new(stream), out.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::DestinationWrite, "{err}");
        assert!(out.path().join("top/x").is_dir());
    }

    #[test]
    fn device_entries_are_skipped() {
        let stream = tar_with(|b| {
            let mut dev = tar::Header::new_gnu();
            dev.set_entry_type(tar::EntryType::Char);
            dev.set_size(0);
            dev.set_mode(0o600);
            b.append_data(&mut dev, "top/tty", io::empty()).unwrap();
            b.append_data(&mut file_header(2), "top/ok", &b"ok"[..]).unwrap();
        });
        let out = tempdir().unwrap();
        let summary = read_tree(Cursor::new(stream), out.path()).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.files, 1);
        assert!(fs::symlink_metadata(out.path().join("top/tty")).is_err());
        assert_eq!(fs::read(out.path().join("top/ok")).unwrap(), b"ok");
    }

    #[cfg(unix)]
    #[test]
    fn setuid_bit_needs_privilege() {
        use std::os::unix::fs::PermissionsExt;
        let stream = tar_with(|b| {
            let mut header = file_header(2);
            header.set_mode(0o4755);
            b.append_data(&mut header, "top/su", &b"#!"[..]).unwrap();
        });
        let out = tempdir().unwrap();
        read_tree(Cursor::new(stream), out.path()).unwrap();
        let mode = fs::metadata(out.path().join("top/su")).unwrap().permissions().mode() & 0o7777;
        let expected = if fs::is_privileged() { 0o4755 } else { 0o755 };
        assert_eq!(mode, expected);
    }
}
