//! Base-128 varints, least significant group first, as used by the payload wire format.

use crate::error::{Error, Result};

/// The longest encoding a `u64` can take.
pub const MAX_VARINT_LEN: usize = 10;

/// Number of bytes `v` takes once encoded.
pub fn encoded_len(v: u64) -> usize {
    // Each byte carries 7 bits; zero still takes one byte.
    let bits = 64 - (v | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

pub fn write(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

/// Read a varint from the front of `buf`, advancing it past the varint. `field` names what was
/// being read, for the error.
pub fn read(buf: &mut &[u8], field: &'static str) -> Result<u64> {
    let data = *buf;
    let mut v = 0u64;
    for (i, &byte) in data.iter().enumerate().take(MAX_VARINT_LEN) {
        let bits = (byte & 0x7F) as u64;
        if i == MAX_VARINT_LEN - 1 && bits > 1 {
            return Err(Error::bad_payload(field, "varint overflows 64 bits"));
        }
        v |= bits << (7 * i);
        if byte & 0x80 == 0 {
            *buf = &data[i + 1..];
            return Ok(v);
        }
    }
    if data.len() >= MAX_VARINT_LEN {
        Err(Error::bad_payload(field, "varint longer than 10 bytes"))
    } else {
        Err(Error::bad_payload(field, "varint truncated"))
    }
}
