use std::io;
use std::path::PathBuf;

/// The primary error type for all operations in the `zstar` crate.
///
/// Every failure aborts the whole operation; the variant tells the caller which
/// stage of the pipeline gave up and carries the path involved where there is one.
#[derive(Debug, thiserror::Error)]
pub enum ArchiverError {
    /// The source directory (compress) or archive file (decompress) does not exist.
    #[error("input '{}' not found", path.display())]
    InputNotFound { path: PathBuf },

    /// An I/O error occurred while reading a filesystem object that is being archived.
    #[error("failed to read '{}': {source}", path.display())]
    SourceRead { path: PathBuf, source: io::Error },

    /// The compressed stream is malformed or truncated, or the compressor failed
    /// while writing its output.
    #[error("zstd stream error: {source}")]
    Codec { source: io::Error },

    /// The decompressed stream ended in the middle of an entry header or its content.
    /// `entry` names the entry whose content was cut short, if any.
    #[error("archive truncated: {detail}")]
    TruncatedArchive { entry: Option<PathBuf>, detail: String },

    /// The decompressed stream is not valid tar framing.
    #[error("malformed tar stream: {source}")]
    MalformedArchive { source: io::Error },

    /// An archive entry would be materialized outside the destination root.
    #[error("unsafe entry path '{}' escapes the destination", entry.display())]
    UnsafePath { entry: PathBuf },

    /// An I/O error occurred while creating a directory or file on the destination side.
    #[error("failed to write '{}': {source}", path.display())]
    DestinationWrite { path: PathBuf, source: io::Error },

    /// The compression level is outside `1..=22`.
    #[error("compression level {level} is outside 1..=22")]
    InvalidLevel { level: i32 },

    /// The thread count is below `-1`.
    #[error("thread count {threads} is invalid (use -1, 0 or a positive count)")]
    InvalidThreads { threads: i32 },

    /// The archive root has no final component to name the top-level directory after.
    #[error("cannot archive '{}': path has no final component", path.display())]
    UnnamedRoot { path: PathBuf },
}

/// Fieldless mirror of [`ArchiverError`] for matching on the failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InputNotFound,
    SourceRead,
    Codec,
    TruncatedArchive,
    MalformedArchive,
    UnsafePath,
    DestinationWrite,
    InvalidArgument,
}

impl ArchiverError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ArchiverError::InputNotFound { .. } => FailureKind::InputNotFound,
            ArchiverError::SourceRead { .. } => FailureKind::SourceRead,
            ArchiverError::Codec { .. } => FailureKind::Codec,
            ArchiverError::TruncatedArchive { .. } => FailureKind::TruncatedArchive,
            ArchiverError::MalformedArchive { .. } => FailureKind::MalformedArchive,
            ArchiverError::UnsafePath { .. } => FailureKind::UnsafePath,
            ArchiverError::DestinationWrite { .. } => FailureKind::DestinationWrite,
            ArchiverError::InvalidLevel { .. }
            | ArchiverError::InvalidThreads { .. }
            | ArchiverError::UnnamedRoot { .. } => FailureKind::InvalidArgument,
        }
    }

    pub(crate) fn destination(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ArchiverError::DestinationWrite {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn source_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ArchiverError::SourceRead {
            path: path.into(),
            source,
        }
    }
}

/// Terminal outcome of one compress, decompress or list operation.
pub type PipelineResult<T = ()> = Result<T, ArchiverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_violations_share_a_kind() {
        assert_eq!(ArchiverError::InvalidLevel { level: 0 }.kind(), FailureKind::InvalidArgument);
        assert_eq!(ArchiverError::InvalidThreads { threads: -2 }.kind(), FailureKind::InvalidArgument);
        assert_eq!(
            ArchiverError::UnnamedRoot { path: PathBuf::from("/") }.kind(),
            FailureKind::InvalidArgument
        );
    }

    #[test]
    fn display_carries_offending_path() {
        let err = ArchiverError::source_read("data/a.bin", io::Error::from(io::ErrorKind::PermissionDenied));
        let msg = err.to_string();
        assert!(msg.contains("data/a.bin"), "{msg}");
        assert_eq!(err.kind(), FailureKind::SourceRead);
    }
}
