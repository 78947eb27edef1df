//! # Pipeline Orchestrator
//!
//! Wires the stages together for the three user-facing operations:
//!
//! - compress: source tree → [`ArchiveWriter`](crate::archive::ArchiveWriter)
//!   → [`CompressorSink`] → output file
//! - decompress: input file → [`DecompressorSource`](crate::codec::DecompressorSource)
//!   → [`ArchiveReader`] → destination tree
//! - list: input file → decompressor → reader, with nothing written
//!
//! Data flows through bounded buffers only. Each stage's resources are scoped
//! to the call, so the output file is closed on every exit path. A failed
//! compress leaves whatever was written so far on disk; cleaning it up is the
//! caller's business.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use tracing::info;

use crate::archive::{archive_root_name, write_tree};
use crate::codec::{open_decompressor, CompressionSession, CompressorSink, DEFAULT_LEVEL};
use crate::common::{ArchiveEntry, ArchiveSummary, SourceReader};
use crate::error::{ArchiverError, PipelineResult};
use crate::extract::{list_entries, ArchiveReader};

const OUTPUT_BUFFER: usize = 1 << 20;

/// Compression parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressOptions {
    /// zstd level, 1 (fastest) to 22 (smallest).
    pub level: i32,
    /// `-1` = all cores, `0` = single-threaded, `N` = N workers.
    pub threads: i32,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            threads: crate::codec::ALL_CORES,
        }
    }
}

impl CompressOptions {
    pub fn validate(&self) -> PipelineResult<CompressionSession> {
        CompressionSession::new(self.level, self.threads)
    }
}

/// Compresses the directory `input_dir` into the archive `output_file`.
pub fn compress(input_dir: &Path, output_file: &Path, level: i32, threads: i32) -> PipelineResult<ArchiveSummary> {
    compress_with(input_dir, output_file, &CompressOptions { level, threads })
}

pub fn compress_with(input_dir: &Path, output_file: &Path, options: &CompressOptions) -> PipelineResult<ArchiveSummary> {
    // Nothing is created on disk until the arguments and the root check out.
    let session = options.validate()?;
    archive_root_name(input_dir)?;

    info!(
        input = %input_dir.display(),
        output = %output_file.display(),
        level = session.level,
        workers = session.workers,
        "compressing"
    );

    let file = File::create(output_file).map_err(|e| ArchiverError::destination(output_file, e))?;
    let mut sink = CompressorSink::with_session(BufWriter::with_capacity(OUTPUT_BUFFER, file), session)?;
    let mut summary = write_tree(input_dir, &mut sink)?;
    let consumed = sink.consumed();
    let writer = sink.finish()?;
    let file = writer
        .into_inner()
        .map_err(|e| ArchiverError::Codec { source: e.into_error() })?;

    summary.compressed_bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
    info!(
        entries = summary.entries(),
        tar_bytes = consumed,
        compressed_bytes = summary.compressed_bytes,
        "compression finished"
    );
    Ok(summary)
}

/// Extracts the archive `input_file` under `output_dir`, creating it if needed.
pub fn decompress(input_file: &Path, output_dir: &Path) -> PipelineResult<ArchiveSummary> {
    let (file, compressed_bytes) = open_archive(input_file)?;
    info!(input = %input_file.display(), output = %output_dir.display(), "decompressing");

    let source = open_decompressor(SourceReader::new(file))?;
    let mut summary = ArchiveReader::new(source)
        .with_origin(input_file)
        .unpack(output_dir)?;
    summary.compressed_bytes = compressed_bytes;
    Ok(summary)
}

/// Returns every entry of the archive `input_file` in stream order.
pub fn list(input_file: &Path) -> PipelineResult<Vec<ArchiveEntry>> {
    let (file, _) = open_archive(input_file)?;
    let source = open_decompressor(SourceReader::new(file))?;
    list_entries(source, input_file)
}

fn open_archive(path: &Path) -> PipelineResult<(File, u64)> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ArchiverError::InputNotFound { path: path.to_path_buf() },
        _ => ArchiverError::source_read(path, e),
    })?;
    let meta = file.metadata().map_err(|e| ArchiverError::source_read(path, e))?;
    if meta.is_dir() {
        return Err(ArchiverError::InputNotFound { path: path.to_path_buf() });
    }
    Ok((file, meta.len()))
}
