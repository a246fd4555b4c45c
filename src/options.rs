//! Settings shared by container writers and readers.

use crate::compress::Compress;
use crate::MAGIC;
use educe::Educe;
use serde::{Deserialize, Deserializer, Serialize};

#[inline]
fn magic_is_default(v: &u32) -> bool {
    *v == MAGIC
}

#[inline]
fn buffer_is_default(v: &usize) -> bool {
    *v == DEFAULT_BUFFER_SIZE
}

fn buffer_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let size = usize::deserialize(deserializer)?;
    Ok(if size == 0 { DEFAULT_BUFFER_SIZE } else { size })
}

const DEFAULT_BUFFER_SIZE: usize = 1 << 16;

/// Settings shared by container writers and readers.
///
/// A reader must be given the same `compress` and `magic` settings the writer used.
///
/// # Defaults
///
/// Fields that aren't specified use their defaults instead. The defaults for each field are:
///
/// - compress: zstd, level 3
/// - magic: [`MAGIC`]
/// - buffer_size: 64 kiB
///
#[derive(Educe, Clone, Debug, Serialize, Deserialize)]
#[educe(PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Options {
    /// How the container byte stream is compressed.
    pub compress: Compress,
    /// Magic number written at the start of, and expected at the start of, every frame.
    #[educe(Default = MAGIC)]
    #[serde(skip_serializing_if = "magic_is_default")]
    pub magic: u32,
    /// Size of the buffer between the container and the file.
    #[educe(Default = DEFAULT_BUFFER_SIZE)]
    #[serde(
        skip_serializing_if = "buffer_is_default",
        deserialize_with = "buffer_or_default"
    )]
    pub buffer_size: usize,
}

impl Options {
    /// Make a new set of options with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose the compression setting.
    pub fn compress(mut self, compress: Compress) -> Self {
        self.compress = compress;
        self
    }

    /// Choose the frame magic number.
    pub fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    /// Choose the I/O buffer size. Zero falls back to the default.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };
        self
    }

    /// The I/O buffer size to actually use. A zero size, possible when the struct is built by
    /// hand, falls back to the default.
    pub(crate) fn io_buffer_size(&self) -> usize {
        if self.buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            self.buffer_size
        }
    }
}
