//! # Codec Adapter
//!
//! Thin layer over the `zstd` streaming encoder and decoder. The compressor is a
//! byte sink that accepts writes of any size and the decompressor is a byte
//! source that yields reads of any size, so neither side ever buffers a whole
//! archive.
//!
//! ## Threads
//! - `-1` resolves to the host's available parallelism when the session opens.
//! - `0` keeps compression on the calling thread.
//! - `N > 0` asks libzstd for `N` compression workers. Workers compress
//!   independent jobs of the input but the frame they emit is in input order.
//!
//! Decompression is single-threaded at this boundary.

use std::io::{self, BufRead, BufReader, Read, Write};

use tracing::{debug, warn};

use crate::common::{find_stage, tag, Stage};
use crate::error::{ArchiverError, PipelineResult};

pub const MIN_LEVEL: i32 = 1;
pub const MAX_LEVEL: i32 = 22;
pub const DEFAULT_LEVEL: i32 = 22;

/// Use every core the host reports.
pub const ALL_CORES: i32 = -1;
/// Compress on the calling thread.
pub const SINGLE_THREADED: i32 = 0;

/// Largest window the decoder accepts (2 GiB), enough for `--long=31` streams.
const DECODER_WINDOW_LOG_MAX: u32 = 31;

pub fn validate_level(level: i32) -> PipelineResult<i32> {
    if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
        Ok(level)
    } else {
        Err(ArchiverError::InvalidLevel { level })
    }
}

/// Maps the external thread convention onto a libzstd worker count, where
/// `0` workers means single-threaded.
pub fn resolve_threads(threads: i32) -> PipelineResult<u32> {
    match threads {
        ALL_CORES => Ok(num_cpus::get().max(1) as u32),
        SINGLE_THREADED => Ok(0),
        n if n > 0 => Ok(n as u32),
        n => Err(ArchiverError::InvalidThreads { threads: n }),
    }
}

/// Validated compression parameters for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSession {
    pub level: i32,
    /// libzstd worker count; `0` = single-threaded.
    pub workers: u32,
}

impl CompressionSession {
    pub fn new(level: i32, threads: i32) -> PipelineResult<Self> {
        Ok(Self {
            level: validate_level(level)?,
            workers: resolve_threads(threads)?,
        })
    }
}

fn codec_error(source: io::Error) -> ArchiverError {
    ArchiverError::Codec { source }
}

/// Opens a compressing byte sink over `sink`.
///
/// Level and thread count are checked before anything is written.
pub fn open_compressor<W: Write>(sink: W, level: i32, threads: i32) -> PipelineResult<CompressorSink<W>> {
    let session = CompressionSession::new(level, threads)?;
    CompressorSink::with_session(sink, session)
}

/// Opens a decompressing byte source over `source`.
pub fn open_decompressor<R: Read>(source: R) -> PipelineResult<DecompressorSource<BufReader<R>>> {
    DecompressorSource::new(BufReader::new(source))
}

/// Streaming zstd compressor.
///
/// [`finish`](Self::finish) writes the end of the frame and hands back the
/// inner writer. If the sink is dropped without being finished (an error path
/// upstream), the frame is still closed on drop so the bytes written so far
/// remain a well-formed zstd stream.
pub struct CompressorSink<W: Write> {
    encoder: Option<zstd::stream::Encoder<'static, W>>,
    session: CompressionSession,
    consumed: u64,
}

impl<W: Write> CompressorSink<W> {
    pub fn with_session(sink: W, session: CompressionSession) -> PipelineResult<Self> {
        let mut encoder = zstd::stream::Encoder::new(sink, session.level).map_err(codec_error)?;
        encoder.include_checksum(true).map_err(codec_error)?;
        if session.workers > 0 {
            encoder.multithread(session.workers).map_err(codec_error)?;
        }
        debug!(level = session.level, workers = session.workers, "zstd compressor opened");
        Ok(Self { encoder: Some(encoder), session, consumed: 0 })
    }

    pub fn session(&self) -> CompressionSession {
        self.session
    }

    /// Uncompressed bytes accepted so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Flushes all pending compressed data, writes the end-of-frame marker and
    /// returns the inner writer.
    pub fn finish(mut self) -> PipelineResult<W> {
        let encoder = self.encoder.take().ok_or_else(|| {
            codec_error(io::Error::new(io::ErrorKind::Other, "compressor already finished"))
        })?;
        let mut inner = encoder.finish().map_err(codec_error)?;
        inner.flush().map_err(codec_error)?;
        debug!(consumed = self.consumed, "zstd frame finished");
        Ok(inner)
    }

    fn encoder_mut(&mut self) -> io::Result<&mut zstd::stream::Encoder<'static, W>> {
        self.encoder
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "compressor already finished"))
    }
}

impl<W: Write> Write for CompressorSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.encoder_mut()?.write(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder_mut()?.flush()
    }
}

impl<W: Write> Drop for CompressorSink<W> {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            match encoder.finish() {
                Ok(mut inner) => {
                    if let Err(e) = inner.flush() {
                        warn!("flushing abandoned zstd stream failed: {e}");
                    }
                    debug!(consumed = self.consumed, "abandoned zstd frame closed");
                }
                Err(e) => warn!("closing abandoned zstd stream failed: {e}"),
            }
        }
    }
}

/// Streaming zstd decompressor.
///
/// Errors raised by the decoder itself come out tagged as codec faults; errors
/// that were already tagged by an earlier stage (the archive file) pass
/// through untouched.
pub struct DecompressorSource<R: BufRead> {
    decoder: zstd::stream::read::Decoder<'static, R>,
    produced: u64,
}

impl<R: BufRead> DecompressorSource<R> {
    pub fn new(source: R) -> PipelineResult<Self> {
        let mut decoder = zstd::stream::read::Decoder::with_buffer(source).map_err(codec_error)?;
        decoder.window_log_max(DECODER_WINDOW_LOG_MAX).map_err(codec_error)?;
        Ok(Self { decoder, produced: 0 })
    }

    /// Decompressed bytes produced so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl<R: BufRead> Read for DecompressorSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.decoder.read(buf) {
            Ok(n) => {
                self.produced += n as u64;
                Ok(n)
            }
            Err(e) if find_stage(&e).is_some() => Err(e),
            Err(e) => Err(tag(Stage::Codec, e)),
        }
    }
}
