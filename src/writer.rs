//! The write side: records in, compressed container out.
//!
//! [`ContainerWriter`] owns the destination for the length of a write session. Each record is
//! validated, encoded, framed, and pushed into the compressed sink in order. Closing the writer,
//! whether through [`finish`][ContainerWriter::finish] or by dropping it, ends the compressed
//! stream and flushes the destination.
//!
//! [`write_all`] runs a whole session over an input sequence. It stops at the first bad record
//! or I/O failure, closes the destination, and returns that error. Frames written before the
//! failure stay in the file, and the compressed stream is still properly ended, so they remain
//! readable. Callers should still treat the file as suspect after a failure.

use crate::compress::{Compress, ZstdEncoder};
use crate::error::{Error, Result};
use crate::frame::encode_frame;
use crate::options::Options;
use crate::record::Record;
use crate::validate::validate;
use crate::value::Value;
use crate::{payload, DEVICE_APPS_TYPE};
use std::borrow::Borrow;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

enum Sink<W: Write> {
    Plain(W),
    Zstd(ZstdEncoder<W>),
}

impl<W: Write> Sink<W> {
    fn new(writer: W, compress: Compress) -> io::Result<Self> {
        Ok(match compress {
            Compress::None => Sink::Plain(writer),
            Compress::Zstd { level } => Sink::Zstd(ZstdEncoder::new(writer, level)?),
        })
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.write_all(data),
            Sink::Zstd(w) => w.write_all(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Zstd(w) => w.flush(),
        }
    }

    fn close(self) -> io::Result<W> {
        match self {
            Sink::Plain(mut w) => {
                w.flush()?;
                Ok(w)
            }
            Sink::Zstd(w) => w.finish(),
        }
    }
}

/// Writes records into a container, one frame per record.
pub struct ContainerWriter<W: Write> {
    sink: Option<Sink<W>>,
    magic: u32,
    payload: Vec<u8>,
    frame: Vec<u8>,
    bytes_written: u64,
    records_written: u64,
}

impl ContainerWriter<BufWriter<File>> {
    /// Open a container file for appending with the default options, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &Options::default())
    }

    /// Open a container file for appending, creating it if needed.
    pub fn open_with<P: AsRef<Path>>(path: P, opts: &Options) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened container for writing");
        Self::with_options(BufWriter::with_capacity(opts.io_buffer_size(), file), opts)
    }
}

impl<W: Write> ContainerWriter<W> {
    /// Start a container on an arbitrary writer, with the default options.
    pub fn new(writer: W) -> Result<Self> {
        Self::with_options(writer, &Options::default())
    }

    pub fn with_options(writer: W, opts: &Options) -> Result<Self> {
        Ok(Self {
            sink: Some(Sink::new(writer, opts.compress)?),
            magic: opts.magic,
            payload: Vec::new(),
            frame: Vec::new(),
            bytes_written: 0,
            records_written: 0,
        })
    }

    /// Total header and payload bytes written so far, before compression.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of frames written so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    fn sink(&mut self) -> Result<&mut Sink<W>> {
        self.sink
            .as_mut()
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::Other, "writer is closed")))
    }

    /// Write a frame with an arbitrary type tag. Returns the number of bytes the frame took.
    pub fn write_frame(&mut self, kind: u16, payload: &[u8]) -> Result<usize> {
        self.frame.clear();
        let len = encode_frame(&mut self.frame, self.magic, kind, payload)?;
        let frame = std::mem::take(&mut self.frame);
        let result = self.sink().and_then(|sink| Ok(sink.write_all(&frame)?));
        self.frame = frame;
        result?;
        self.bytes_written += len as u64;
        self.records_written += 1;
        debug!(kind, len, "wrote frame");
        Ok(len)
    }

    /// Encode and write a typed record. Returns the number of bytes the frame took.
    pub fn write_record(&mut self, record: &Record) -> Result<usize> {
        let mut payload = std::mem::take(&mut self.payload);
        payload.clear();
        payload::encode_into(record, &mut payload);
        let result = self.write_frame(DEVICE_APPS_TYPE, &payload);
        self.payload = payload;
        result
    }

    /// Validate, encode, and write a loosely-typed record. Nothing is written if validation
    /// fails.
    pub fn write_value(&mut self, value: &Value) -> Result<usize> {
        let record = validate(value)?;
        self.write_record(&record)
    }

    /// Push buffered data through the compressor and out to the destination, without ending the
    /// compressed stream.
    pub fn flush(&mut self) -> Result<()> {
        Ok(self.sink()?.flush()?)
    }

    fn close(&mut self) -> Result<W> {
        match self.sink.take() {
            Some(sink) => Ok(sink.close()?),
            None => Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "writer is closed",
            ))),
        }
    }

    /// End the container session, returning the total bytes written.
    pub fn finish(mut self) -> Result<u64> {
        self.close()?;
        info!(
            records = self.records_written,
            bytes = self.bytes_written,
            "closed container"
        );
        Ok(self.bytes_written)
    }

    /// End the container session and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.close()
    }
}

impl<W: Write> Drop for ContainerWriter<W> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.close() {
                warn!(error = %e, "failed to close container writer on drop");
            }
        }
    }
}

impl<W: Write> fmt::Debug for ContainerWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ContainerWriter")
            .field("open", &self.sink.is_some())
            .field("magic", &self.magic)
            .field("bytes_written", &self.bytes_written)
            .field("records_written", &self.records_written)
            .finish()
    }
}

/// Write every record in `records` to the container at `path`, with the default options.
///
/// Returns the total number of header and payload bytes written. See [`write_all_with`].
pub fn write_all<I, P>(records: I, path: P) -> Result<u64>
where
    I: IntoIterator,
    I::Item: Borrow<Value>,
    P: AsRef<Path>,
{
    write_all_with(records, path, &Options::default())
}

/// Write every record in `records` to the container at `path`.
///
/// Items are pulled one at a time. The first item that fails validation, or the first write
/// that fails, ends the session: the destination is closed and that error is returned. There is
/// no partial success count.
pub fn write_all_with<I, P>(records: I, path: P, opts: &Options) -> Result<u64>
where
    I: IntoIterator,
    I::Item: Borrow<Value>,
    P: AsRef<Path>,
{
    try_write_all_with(
        records.into_iter().map(Ok::<_, std::convert::Infallible>),
        path,
        opts,
    )
}

/// Like [`write_all`], but for input sequences that can themselves fail. A failed item aborts
/// the session with [`Error::InputShape`].
pub fn try_write_all<I, V, E, P>(records: I, path: P) -> Result<u64>
where
    I: IntoIterator<Item = std::result::Result<V, E>>,
    V: Borrow<Value>,
    E: fmt::Display,
    P: AsRef<Path>,
{
    try_write_all_with(records, path, &Options::default())
}

/// Like [`write_all_with`], but for input sequences that can themselves fail.
pub fn try_write_all_with<I, V, E, P>(records: I, path: P, opts: &Options) -> Result<u64>
where
    I: IntoIterator<Item = std::result::Result<V, E>>,
    V: Borrow<Value>,
    E: fmt::Display,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut writer = ContainerWriter::open_with(path, opts)?;
    for item in records {
        let result = match item {
            Ok(value) => writer.write_value(value.borrow()),
            Err(e) => Err(Error::InputShape(format!("input source failed: {}", e))),
        };
        if let Err(err) = result {
            warn!(
                path = %path.display(),
                records = writer.records_written(),
                error = %err,
                "aborting container write"
            );
            if let Err(close_err) = writer.finish() {
                warn!(path = %path.display(), error = %close_err, "close after failure also failed");
            }
            return Err(err);
        }
    }
    writer.finish()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::frame::HEADER_LEN;
    use crate::record::Device;
    use crate::MAGIC;

    fn plain() -> Options {
        Options::new().compress(Compress::None)
    }

    fn json(s: &str) -> Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn plain_layout() {
        let mut writer = ContainerWriter::with_options(Vec::new(), &plain()).unwrap();
        let rec = Record::new().app(5);
        assert_eq!(writer.write_record(&rec).unwrap(), HEADER_LEN + 2);
        assert_eq!(writer.write_record(&Record::new()).unwrap(), HEADER_LEN);
        assert_eq!(writer.bytes_written(), 18);
        assert_eq!(writer.records_written(), 2);
        let out = writer.into_inner().unwrap();
        assert_eq!(
            out,
            vec![
                0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x02, 0x00, 0x20, 0x05, // first
                0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x00, 0x00, // second, empty
            ]
        );
    }

    #[test]
    fn custom_magic_and_kind() {
        let opts = plain().magic(0x0102_0304);
        let mut writer = ContainerWriter::with_options(Vec::new(), &opts).unwrap();
        writer.write_frame(9, b"abc").unwrap();
        let out = writer.into_inner().unwrap();
        assert_eq!(&out[..8], &[0x04, 0x03, 0x02, 0x01, 0x09, 0x00, 0x03, 0x00]);
    }

    #[test]
    fn bad_value_writes_nothing() {
        let mut writer = ContainerWriter::with_options(Vec::new(), &plain()).unwrap();
        let err = writer.write_value(&json(r#"{"apps": ["x"]}"#)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FieldType);
        assert_eq!(writer.bytes_written(), 0);
        assert!(writer.into_inner().unwrap().is_empty());
    }

    #[test]
    fn oversized_record() {
        let mut writer = ContainerWriter::with_options(Vec::new(), &plain()).unwrap();
        let rec = Record::new().device(Device::new().id("x".repeat(70_000)));
        let err = writer.write_record(&rec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encode);
        assert_eq!(writer.records_written(), 0);
    }

    #[test]
    fn write_all_counts_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pb.zst");
        let input = vec![
            json(r#"{"device": {"type": "idfa", "id": "e7e1a50c0ec2747ca56cd9e1558c0d7c"}, "lat": 67.7835424444, "lon": -22.8044005471, "apps": [1, 2, 3, 4]}"#),
            json(r#"{"device": {"type": "gaid", "id": "e7e1a50c0ec2747ca56cd9e1558c0d7d"}, "lat": 42, "lon": -42, "apps": [1, 2]}"#),
            json(r#"{"device": {"type": "gaid", "id": "e7e1a50c0ec2747ca56cd9e1558c0d7d"}, "lat": 42, "lon": -42, "apps": []}"#),
            json(r#"{"device": {"type": "gaid", "id": "e7e1a50c0ec2747ca56cd9e1558c0d7d"}, "apps": [1]}"#),
        ];
        let expected: u64 = input
            .iter()
            .map(|v| (HEADER_LEN + payload::encoded_len(&validate(v).unwrap())) as u64)
            .sum();
        let total = write_all(&input, &path).unwrap();
        assert_eq!(total, expected);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn write_all_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pb.zst");
        let input = vec![
            json(r#"{"apps": [1]}"#),
            json(r#"{"apps": [2]}"#),
            json(r#"{"apps": [3, "four"]}"#),
            json(r#"{"apps": [5]}"#),
        ];
        let mut pulled = 0;
        let iter = input.iter().inspect(|_| pulled += 1);
        let err = write_all(iter, &path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FieldType);
        assert_eq!(err.field(), Some("apps"));
        assert_eq!(pulled, 3, "no items should be pulled after the bad one");

        // Frames before the failure stay readable.
        let records: Vec<Record> = crate::reader::read_all(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records, vec![Record::new().app(1), Record::new().app(2)]);

        // A later session appends after the surviving prefix.
        write_all(&input[3..], &path).unwrap();
        let records: Vec<Record> = crate::reader::read_all(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            records,
            vec![Record::new().app(1), Record::new().app(2), Record::new().app(5)]
        );
    }

    #[test]
    fn write_all_rejects_non_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pb.zst");
        let input = vec![json(r#"{"apps": [1]}"#), json("[1, 2, 3]")];
        let err = write_all(input, &path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputShape);
    }

    #[test]
    fn failing_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.pb.zst");
        let input: Vec<std::result::Result<Value, String>> =
            vec![Ok(json("{}")), Err("host iterator raised".to_string())];
        let err = try_write_all(input, &path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputShape);
        assert!(err.to_string().contains("host iterator raised"));
    }

    #[test]
    fn unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("out.pb.zst");
        let err = write_all(Vec::<Value>::new(), &path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pb.zst");
        assert_eq!(write_all(Vec::<Value>::new(), &path).unwrap(), 0);
    }

    struct FailAfter {
        limit: usize,
        written: usize,
    }

    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written + buf.len() > self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.written += buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn io_failure_is_resource_error() {
        let sink = FailAfter {
            limit: 15,
            written: 0,
        };
        let mut writer = ContainerWriter::with_options(sink, &plain()).unwrap();
        writer.write_record(&Record::new().app(1)).unwrap();
        let err = writer.write_record(&Record::new().app(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(writer.records_written(), 1);
    }

    #[test]
    fn closed_writer_refuses() {
        let mut writer = ContainerWriter::with_options(Vec::new(), &plain()).unwrap();
        writer.close().unwrap();
        assert!(writer.write_record(&Record::new()).is_err());
        assert!(writer.flush().is_err());
    }

    #[test]
    fn drop_closes_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drop.pb.zst");
        {
            let mut writer = ContainerWriter::open(&path).unwrap();
            writer.write_record(&Record::new().app(1)).unwrap();
        }
        // A complete zstd frame ends with the 4-byte checksum; just check it decodes.
        let file = std::io::BufReader::new(File::open(&path).unwrap());
        let mut dec = crate::compress::ZstdDecoder::new(file);
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut dec, &mut out).unwrap();
        assert_eq!(&out[..4], &MAGIC.to_le_bytes());
        assert_eq!(out.len(), HEADER_LEN + 2);
    }
}
