use crate::compress::CompressionError;
use std::{fmt, io};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad classification of an [`Error`], for callers that only care about which stage failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input sequence or one of its items had the wrong overall shape.
    InputShape,
    /// A record field had the wrong type.
    FieldType,
    /// The destination or origin couldn't be opened, read, or written.
    Resource,
    /// The container bytes are not a valid container.
    Format,
    /// A valid record couldn't be turned into a frame.
    Encode,
}

#[derive(Debug)]
pub enum Error {
    /// An input item was not a key/value mapping, or the input source itself failed.
    InputShape(String),
    /// A field was present but held the wrong kind of value.
    FieldType {
        field: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    /// Underlying I/O failure on the destination or origin.
    Io(io::Error),
    /// Frame header didn't start with the expected magic number.
    BadMagic { expected: u32, actual: u32 },
    /// Stream ended partway through a frame.
    Truncated {
        step: &'static str,
        actual: usize,
        expected: usize,
    },
    /// Payload bytes couldn't be decoded into a record.
    BadPayload {
        field: Option<&'static str>,
        reason: String,
    },
    /// Occurs when zstd decompression fails, or the compressed stream is cut off.
    FailDecompress(CompressionError),
    /// Encoded payload doesn't fit in the 16-bit frame length.
    PayloadTooLong { max: usize, actual: usize },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InputShape(_) => ErrorKind::InputShape,
            Error::FieldType { .. } => ErrorKind::FieldType,
            Error::Io(_) => ErrorKind::Resource,
            Error::BadMagic { .. }
            | Error::Truncated { .. }
            | Error::BadPayload { .. }
            | Error::FailDecompress(_) => ErrorKind::Format,
            Error::PayloadTooLong { .. } => ErrorKind::Encode,
        }
    }

    /// The name of the record field responsible for the error, if one is known.
    pub fn field(&self) -> Option<&'static str> {
        match *self {
            Error::FieldType { field, .. } => Some(field),
            Error::BadPayload { field, .. } => field,
            _ => None,
        }
    }

    pub(crate) fn bad_payload(field: &'static str, reason: impl Into<String>) -> Self {
        Error::BadPayload {
            field: Some(field),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InputShape(ref err) => write!(f, "Bad input shape: {}", err),
            Error::FieldType {
                field,
                expected,
                actual,
            } => write!(
                f,
                "Field `{}` should be {}, but got {}",
                field, expected, actual
            ),
            Error::Io(ref err) => write!(f, "I/O failure: {}", err),
            Error::BadMagic { expected, actual } => write!(
                f,
                "Frame magic was 0x{:08X}, expected 0x{:08X}",
                actual, expected
            ),
            Error::Truncated {
                step,
                actual,
                expected,
            } => write!(
                f,
                "Expected {} bytes, but got {} on step [{}]",
                expected, actual, step
            ),
            Error::BadPayload {
                field: Some(field),
                ref reason,
            } => write!(f, "Malformed payload at field `{}`: {}", field, reason),
            Error::BadPayload {
                field: None,
                ref reason,
            } => write!(f, "Malformed payload: {}", reason),
            Error::FailDecompress(ref err) => write!(f, "Failed decompression step: {}", err),
            Error::PayloadTooLong { max, actual } => write!(
                f,
                "Payload too long: was {} bytes, maximum allowed is {}",
                actual, max
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            Error::FailDecompress(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // Decompression failures travel through `io::Read` wrapped in an io::Error; unwrap them
        // back out so they're reported as format errors rather than resource errors.
        let is_compression = e
            .get_ref()
            .map_or(false, |inner| inner.is::<CompressionError>());
        if is_compression {
            if let Some(inner) = e.into_inner() {
                if let Ok(err) = inner.downcast::<CompressionError>() {
                    return Error::FailDecompress(*err);
                }
            }
            return Error::FailDecompress(CompressionError::Parsing("unknown compression failure"));
        }
        Error::Io(e)
    }
}

impl From<CompressionError> for Error {
    fn from(e: CompressionError) -> Self {
        Self::FailDecompress(e)
    }
}
