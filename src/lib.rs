//! A compact, append-friendly container format for device/app usage records.
//!
//! Each record describes one device (an identifier and an identifier type), an optional
//! location, and the list of numeric app IDs seen on that device. Records go through a fixed
//! pipeline on their way to disk:
//!
//! 1. Validation: a loosely-typed [`Value`] map is checked and turned into a [`Record`].
//! 2. Encoding: the record becomes a protobuf-compatible payload (see [`payload`]).
//! 3. Framing: the payload gets an 8-byte header holding a magic number, a type tag, and the
//!    payload length (see [`frame`]).
//! 4. Compression: the frames are written back to back into a zstd stream (see [`compress`]).
//!
//! Reading runs the same pipeline in reverse. A container file may hold several compressed
//! streams in a row, one per write session, and is read as one continuous run of frames.
//!
//! # Example
//!
//! ```
//! # fn main() -> deviceapps_pack::Result<()> {
//! use deviceapps_pack::{read_all, write_all, Value};
//!
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("apps.pb.zst");
//!
//! let record: Value = vec![
//!     ("device", vec![("id", "e7e1a50c"), ("type", "idfa")].into_iter().collect()),
//!     ("lat", Value::from(67.78)),
//!     ("lon", Value::from(-22.8)),
//!     ("apps", Value::from(vec![1u32, 2, 3])),
//! ]
//! .into_iter()
//! .collect();
//!
//! let written = write_all([&record], &path)?;
//! assert!(written > 0);
//!
//! let mut records = read_all(&path)?;
//! let back = records.next().unwrap()?;
//! assert_eq!(back.apps, vec![1, 2, 3]);
//! assert_eq!(records.bytes_read(), written);
//! # Ok(())
//! # }
//! ```

mod error;
mod integer;
mod options;
mod reader;
mod record;
mod validate;
mod value;
mod varint;
mod writer;

pub mod compress;
pub mod frame;
pub mod payload;

pub use self::compress::Compress;
pub use self::error::{Error, ErrorKind, Result};
pub use self::integer::Integer;
pub use self::options::Options;
pub use self::reader::{read_all, read_all_with, ContainerReader, Records};
pub use self::record::{Device, Record};
pub use self::validate::validate;
pub use self::value::Value;
pub use self::writer::{
    try_write_all, try_write_all_with, write_all, write_all_with, ContainerWriter,
};

/// The default magic number at the start of every frame header.
pub const MAGIC: u32 = 0xFFFF_FFFF;

/// Frame type tag for device-apps records. Frames with any other tag are skipped when reading
/// records.
pub const DEVICE_APPS_TYPE: u16 = 1;
