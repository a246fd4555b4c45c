//! The read side: compressed container in, records out.
//!
//! [`ContainerReader`] pulls frames one at a time. [`Records`] wraps it as an iterator of decoded
//! device-apps records, skipping frames of any other type. Iteration stops for good on the first
//! error, since a bad frame leaves no reliable way to find the start of the next one.

use crate::compress::{Compress, ZstdDecoder};
use crate::error::Result;
use crate::frame::{read_frame_into, Frame, FrameHeader, HEADER_LEN};
use crate::options::Options;
use crate::record::Record;
use crate::{payload, DEVICE_APPS_TYPE};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

enum Source<R: Read> {
    Plain(BufReader<R>),
    Zstd(ZstdDecoder<BufReader<R>>),
}

impl<R: Read> Read for Source<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Plain(r) => r.read(buf),
            Source::Zstd(r) => r.read(buf),
        }
    }
}

/// Reads frames out of a container.
pub struct ContainerReader<R: Read> {
    source: Source<R>,
    magic: u32,
    bytes_read: u64,
}

impl ContainerReader<File> {
    /// Open a container file with the default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &Options::default())
    }

    /// Open a container file.
    pub fn open_with<P: AsRef<Path>>(path: P, opts: &Options) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened container for reading");
        Ok(Self::with_options(file, opts))
    }
}

impl<R: Read> ContainerReader<R> {
    /// Read a container from an arbitrary reader, with the default options.
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, &Options::default())
    }

    pub fn with_options(reader: R, opts: &Options) -> Self {
        let reader = BufReader::with_capacity(opts.io_buffer_size(), reader);
        let source = match opts.compress {
            Compress::None => Source::Plain(reader),
            Compress::Zstd { .. } => Source::Zstd(ZstdDecoder::new(reader)),
        };
        Self {
            source,
            magic: opts.magic,
            bytes_read: 0,
        }
    }

    /// Total header and payload bytes consumed so far, after decompression.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn read_header_into(&mut self, payload: &mut Vec<u8>) -> Result<Option<FrameHeader>> {
        let header = read_frame_into(&mut self.source, self.magic, payload)?;
        if let Some(header) = header {
            self.bytes_read += (HEADER_LEN + header.length as usize) as u64;
        }
        Ok(header)
    }

    /// Read the next frame of any type. Returns `Ok(None)` at the clean end of the container.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut payload = Vec::new();
        Ok(self.read_header_into(&mut payload)?.map(|header| Frame {
            kind: header.kind,
            payload,
        }))
    }

    /// Turn this reader into an iterator over its device-apps records.
    pub fn records(self) -> Records<R> {
        Records {
            reader: self,
            payload: Vec::new(),
            done: false,
            records: 0,
            skipped: 0,
        }
    }
}

impl<R: Read> fmt::Debug for ContainerReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ContainerReader")
            .field("magic", &self.magic)
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

/// Iterator over the device-apps records in a container.
///
/// Yields records in the order they were written. After the first error, or once the container
/// is exhausted, it yields nothing more.
#[derive(Debug)]
pub struct Records<R: Read> {
    reader: ContainerReader<R>,
    payload: Vec<u8>,
    done: bool,
    records: u64,
    skipped: u64,
}

impl<R: Read> Records<R> {
    /// Total header and payload bytes consumed so far, skipped frames included.
    pub fn bytes_read(&self) -> u64 {
        self.reader.bytes_read()
    }

    /// Number of frames skipped for having a type other than device-apps.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let header = match self.reader.read_header_into(&mut self.payload)? {
                Some(header) => header,
                None => return Ok(None),
            };
            if header.kind != DEVICE_APPS_TYPE {
                debug!(
                    kind = header.kind,
                    len = header.length,
                    "skipping frame of unknown type"
                );
                self.skipped += 1;
                continue;
            }
            return payload::decode(&self.payload).map(Some);
        }
    }
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => {
                self.records += 1;
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                info!(
                    records = self.records,
                    skipped = self.skipped,
                    bytes = self.bytes_read(),
                    "finished reading container"
                );
                None
            }
            Err(e) => {
                self.done = true;
                warn!(records = self.records, error = %e, "container read failed");
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> std::iter::FusedIterator for Records<R> {}

/// Open the container at `path` with the default options and iterate over its records.
///
/// Failing to open the file is reported here; everything else comes out of the iterator.
pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Records<File>> {
    read_all_with(path, &Options::default())
}

/// Open the container at `path` and iterate over its records.
pub fn read_all_with<P: AsRef<Path>>(path: P, opts: &Options) -> Result<Records<File>> {
    Ok(ContainerReader::open_with(path, opts)?.records())
}
