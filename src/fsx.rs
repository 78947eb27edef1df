//! Cross-platform filesystem wrapper.
//!
//! Re-exports `std::fs` and adds the handful of helpers extraction needs on
//! top of it: permission bits, timestamps, symlink creation and the
//! replace-don't-follow rule for existing targets. The rest of the crate
//! imports `crate::fsx` instead of `std::fs` so call-sites stay identical
//! across OSes.

use std::io;
use std::path::Path;

use filetime::FileTime;

pub use std::fs::*;

#[cfg(unix)]
/// Set POSIX permission bits on Unix.
pub fn set_unix_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
/// Only the owner-write bit has a meaning here; it maps onto the read-only flag.
pub fn set_unix_permissions(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    std::fs::set_permissions(path, perms)
}

#[cfg(unix)]
/// Whether the process runs as root, and so may hand out setuid/setgid bits.
pub fn is_privileged() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_privileged() -> bool {
    false
}

pub fn set_mtime(path: &Path, mtime: u64) -> io::Result<()> {
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime as i64, 0))
}

/// Sets the timestamps of the link itself, never its target.
pub fn set_symlink_mtime(path: &Path, mtime: u64) -> io::Result<()> {
    let time = FileTime::from_unix_time(mtime as i64, 0);
    filetime::set_symlink_file_times(path, time, time)
}

#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    let resolved = match link.parent() {
        Some(parent) => parent.join(target),
        None => target.to_path_buf(),
    };
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

#[cfg(not(any(unix, windows)))]
pub fn symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks are not supported on this platform"))
}

/// Unlinks a file or symlink at `path` so a new object can take its place.
///
/// A missing path is fine. A real directory is left alone and reported as an
/// error.
pub fn clear_for_replace(path: &Path) -> io::Result<()> {
    match symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_dir() => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("'{}' is an existing directory", path.display()),
        )),
        Ok(_) => remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Makes sure a real directory exists at `path`. A file or symlink occupying
/// the name is removed first.
pub fn prepare_dir(path: &Path) -> io::Result<()> {
    match symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_dir() => Ok(()),
        Ok(_) => {
            remove_file(path)?;
            create_dir(path)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => create_dir(path),
        Err(e) => Err(e),
    }
}
