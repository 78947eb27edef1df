//! # zstar Core Library
//!
//! Streams a directory tree into a single tar archive compressed with
//! Zstandard, and streams such an archive back into a directory tree. Neither
//! direction ever holds a whole file or the whole archive in memory.
//!
//! The `zstar` binary is a thin wrapper over [`pipeline`]; the stages are
//! public so they can also be driven directly over any `Read`/`Write`.
//!
//! ## Key Modules
//!
//! - [`pipeline`]: The compress, decompress and list operations.
//! - [`archive`]: Walks a tree and frames it as tar entries.
//! - [`extract`]: Parses tar entries and materializes them safely.
//! - [`codec`]: Streaming zstd compressor and decompressor.
//! - [`error`]: The failure taxonomy shared by every stage.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::Path;
//!
//! let summary = zstar::pipeline::compress(Path::new("project"), Path::new("project.tar.zst"), 19, -1)?;
//! println!("{} files archived", summary.files);
//! zstar::pipeline::decompress(Path::new("project.tar.zst"), Path::new("restored"))?;
//! # Ok::<(), zstar::ArchiverError>(())
//! ```

pub mod archive;
pub mod cli;
pub mod cli_runner;
pub mod codec;
pub mod common;
pub mod error;
pub mod extract;
pub mod pipeline;

// Cross-platform filesystem wrapper
pub mod fsx;

pub use common::{ArchiveEntry, ArchiveSummary, EntryKind};
pub use error::{ArchiverError, FailureKind, PipelineResult};
pub use pipeline::{compress, compress_with, decompress, list, CompressOptions};
