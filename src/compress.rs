//! Compression of the container byte stream.
//!
//! The whole container, headers included, runs through a zstd stream. [`ZstdEncoder`] and
//! [`ZstdDecoder`] adapt a zstd streaming context to [`Write`] and [`Read`], so the framing layer
//! never needs to know compression is happening. Each write session produces one zstd frame;
//! the decoder treats a run of concatenated zstd frames as one continuous stream, which is what
//! appending to an existing container produces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, BufRead, Read, Write};
use zstd_safe::{CCtx, CParameter, DCtx, InBuffer, OutBuffer};

/// Size of the staging buffer between the compressor and the underlying writer.
const OUT_CHUNK: usize = 1 << 17;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionError {
    ZstdInner(usize),
    Parsing(&'static str),
}

impl fmt::Display for CompressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionError::ZstdInner(v) => {
                write!(f, "zstd failure, code {} ({})", v, zstd_safe::get_error_name(*v))
            }
            CompressionError::Parsing(s) => f.write_str(s),
        }
    }
}

impl std::error::Error for CompressionError {}

impl From<zstd_safe::ErrorCode> for CompressionError {
    fn from(value: zstd_safe::ErrorCode) -> Self {
        CompressionError::ZstdInner(value)
    }
}

impl From<CompressionError> for io::Error {
    fn from(value: CompressionError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, value)
    }
}

fn zstd_err(code: zstd_safe::ErrorCode) -> io::Error {
    CompressionError::ZstdInner(code).into()
}

/// Compression settings for a container.
///
/// Both sides of a container must agree: a reader configured for zstd can't read an uncompressed
/// container, and vice versa.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub enum Compress {
    /// Store frames as-is.
    None,
    /// Compress with zstd at the given level.
    Zstd {
        /// The compression level
        level: i32,
    },
}

impl Compress {
    /// Create a new zstd compression setting.
    pub fn new_zstd(level: i32) -> Self {
        Compress::Zstd { level }
    }
}

impl std::default::Default for Compress {
    fn default() -> Self {
        Compress::Zstd { level: 3 }
    }
}

/// A [`Write`] adapter that zstd-compresses everything written through it.
///
/// Call [`finish`][ZstdEncoder::finish] to end the zstd frame. An encoder that is dropped without
/// finishing leaves a truncated frame behind.
pub struct ZstdEncoder<W: Write> {
    writer: W,
    ctx: CCtx<'static>,
    buf: Vec<u8>,
    finished: bool,
}

impl<W: Write> ZstdEncoder<W> {
    pub fn new(writer: W, level: i32) -> io::Result<Self> {
        let mut ctx = CCtx::create();
        ctx.set_parameter(CParameter::CompressionLevel(level))
            .map_err(zstd_err)?;
        ctx.set_parameter(CParameter::ChecksumFlag(true))
            .map_err(zstd_err)?;
        Ok(Self {
            writer,
            ctx,
            buf: vec![0u8; OUT_CHUNK],
            finished: false,
        })
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Drain the compressor with `step` until it reports nothing left to write.
    fn drain<F>(&mut self, mut step: F) -> io::Result<()>
    where
        F: FnMut(&mut CCtx<'static>, &mut OutBuffer<'_, [u8]>) -> zstd_safe::SafeResult,
    {
        loop {
            let (remaining, written) = {
                let mut out = OutBuffer::around(&mut self.buf[..]);
                let remaining = step(&mut self.ctx, &mut out).map_err(zstd_err)?;
                (remaining, out.pos())
            };
            self.writer.write_all(&self.buf[..written])?;
            if remaining == 0 {
                return Ok(());
            }
        }
    }

    /// End the zstd frame and flush the underlying writer. Safe to call more than once; only the
    /// first call ends the frame.
    pub fn try_finish(&mut self) -> io::Result<()> {
        if !self.finished {
            self.drain(|ctx, out| ctx.end_stream(out))?;
            self.finished = true;
        }
        self.writer.flush()
    }

    /// End the zstd frame, flush, and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.try_finish()?;
        Ok(self.writer)
    }
}

impl<W: Write> Write for ZstdEncoder<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut input = InBuffer::around(data);
        while input.pos() < data.len() {
            let written = {
                let mut out = OutBuffer::around(&mut self.buf[..]);
                self.ctx
                    .compress_stream(&mut out, &mut input)
                    .map_err(zstd_err)?;
                out.pos()
            };
            self.writer.write_all(&self.buf[..written])?;
        }
        self.finished = false;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.finished {
            self.drain(|ctx, out| ctx.flush_stream(out))?;
        }
        self.writer.flush()
    }
}

/// A [`Read`] adapter that decompresses a zstd stream.
///
/// Reaching the end of the underlying reader partway through a zstd frame is an error, so a
/// container cut off mid-write is never mistaken for a complete one.
pub struct ZstdDecoder<R: BufRead> {
    reader: R,
    ctx: DCtx<'static>,
    in_frame: bool,
}

impl<R: BufRead> ZstdDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            ctx: DCtx::create(),
            in_frame: false,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }
}

impl<R: BufRead> Read for ZstdDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let (hint, consumed, produced, at_eof) = {
                let src = self.reader.fill_buf()?;
                let at_eof = src.is_empty();
                if at_eof && !self.in_frame {
                    return Ok(0);
                }
                // Even with no input left, the context may still hold output to flush.
                let mut input = InBuffer::around(src);
                let mut out = OutBuffer::around(&mut buf[..]);
                let hint = self
                    .ctx
                    .decompress_stream(&mut out, &mut input)
                    .map_err(zstd_err)?;
                (hint, input.pos(), out.pos(), at_eof)
            };
            self.reader.consume(consumed);
            // A hint of 0 means a frame just ended and everything in it has been flushed.
            self.in_frame = hint != 0;
            if produced > 0 {
                return Ok(produced);
            }
            if at_eof {
                if self.in_frame {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        CompressionError::Parsing("compressed stream ended partway through a frame"),
                    ));
                }
                return Ok(0);
            }
        }
    }
}
