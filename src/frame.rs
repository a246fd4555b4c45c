//! Framing of payloads within a container.
//!
//! Every payload is preceded by a fixed 8-byte header, all fields little-endian regardless of
//! host:
//!
//! ```text
//! +-----------+----------+------------+-------------------+
//! | magic u32 | type u16 | length u16 | payload[length]   |
//! +-----------+----------+------------+-------------------+
//! ```
//!
//! The container is nothing but these frames laid end to end. `length` is the exact payload size,
//! so a payload can be at most 65535 bytes.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 8;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub kind: u16,
    pub length: u16,
}

impl FrameHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.kind.to_le_bytes());
        out[6..8].copy_from_slice(&self.length.to_le_bytes());
        out
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_bytes());
    }

    /// Parse a header from the front of `buf`. Doesn't check the magic number.
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::Truncated {
                step: "frame header",
                actual: buf.len(),
                expected: HEADER_LEN,
            });
        }
        // Length was checked above, so these reads can't run dry.
        let magic = buf.read_u32::<LittleEndian>()?;
        let kind = buf.read_u16::<LittleEndian>()?;
        let length = buf.read_u16::<LittleEndian>()?;
        Ok(Self {
            magic,
            kind,
            length,
        })
    }
}

/// A decoded frame: the type tag and the raw payload bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub kind: u16,
    pub payload: Vec<u8>,
}

/// Append a complete frame (header and payload) to `buf`, returning the number of bytes added.
pub fn encode_frame(buf: &mut Vec<u8>, magic: u32, kind: u16, payload: &[u8]) -> Result<usize> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadTooLong {
            max: MAX_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }
    let header = FrameHeader {
        magic,
        kind,
        length: payload.len() as u16,
    };
    buf.reserve(HEADER_LEN + payload.len());
    header.encode(buf);
    buf.extend_from_slice(payload);
    Ok(HEADER_LEN + payload.len())
}

/// Fill `buf` as far as the reader allows, returning how many bytes were read. Stops short only
/// at end of stream.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read the next frame from `reader`, placing its payload in `payload` (which is cleared first).
///
/// Returns `Ok(None)` on a clean end of stream, meaning no bytes at all were left. A partial
/// header or a payload shorter than the header promised is an error, as is a header whose magic
/// number isn't `magic`.
pub fn read_frame_into<R: Read + ?Sized>(
    reader: &mut R,
    magic: u32,
    payload: &mut Vec<u8>,
) -> Result<Option<FrameHeader>> {
    let mut raw = [0u8; HEADER_LEN];
    let got = read_full(reader, &mut raw)?;
    if got == 0 {
        return Ok(None);
    }
    let header = FrameHeader::decode(&raw[..got])?;
    if header.magic != magic {
        return Err(Error::BadMagic {
            expected: magic,
            actual: header.magic,
        });
    }
    let expected = header.length as usize;
    payload.clear();
    payload.resize(expected, 0);
    let got = read_full(reader, payload)?;
    if got < expected {
        payload.truncate(got);
        return Err(Error::Truncated {
            step: "frame payload",
            actual: got,
            expected,
        });
    }
    Ok(Some(header))
}

/// Read the next frame from `reader`. See [`read_frame_into`].
pub fn read_frame<R: Read + ?Sized>(reader: &mut R, magic: u32) -> Result<Option<Frame>> {
    let mut payload = Vec::new();
    Ok(read_frame_into(reader, magic, &mut payload)?.map(|header| Frame {
        kind: header.kind,
        payload,
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::{DEVICE_APPS_TYPE, MAGIC};
    use std::io::Cursor;

    #[test]
    fn header_layout() {
        let header = FrameHeader {
            magic: 0x0102_0304,
            kind: 0x0506,
            length: 0x0708,
        };
        assert_eq!(
            header.to_bytes(),
            [0x04, 0x03, 0x02, 0x01, 0x06, 0x05, 0x08, 0x07]
        );
        assert_eq!(FrameHeader::decode(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn encode_layout() {
        let mut buf = Vec::new();
        let len = encode_frame(&mut buf, MAGIC, DEVICE_APPS_TYPE, &[0xAA, 0xBB, 0xCC]).unwrap();
        assert_eq!(len, 11);
        assert_eq!(
            buf,
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x03, 0x00, 0xAA, 0xBB, 0xCC]
        );
    }

    #[test]
    fn sequence() {
        let mut buf = Vec::new();
        encode_frame(&mut buf, MAGIC, 1, b"first").unwrap();
        encode_frame(&mut buf, MAGIC, 7, b"").unwrap();
        encode_frame(&mut buf, MAGIC, 1, b"third").unwrap();
        let mut rd = Cursor::new(buf);
        let frame = read_frame(&mut rd, MAGIC).unwrap().unwrap();
        assert_eq!(frame.kind, 1);
        assert_eq!(frame.payload, b"first");
        let frame = read_frame(&mut rd, MAGIC).unwrap().unwrap();
        assert_eq!(frame.kind, 7);
        assert!(frame.payload.is_empty());
        let frame = read_frame(&mut rd, MAGIC).unwrap().unwrap();
        assert_eq!(frame.payload, b"third");
        assert!(read_frame(&mut rd, MAGIC).unwrap().is_none());
    }

    #[test]
    fn too_long() {
        let mut buf = Vec::new();
        let payload = vec![0u8; MAX_PAYLOAD_LEN];
        assert!(encode_frame(&mut buf, MAGIC, 1, &payload).is_ok());
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let err = encode_frame(&mut buf, MAGIC, 1, &payload).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encode);
    }

    #[test]
    fn bad_magic() {
        let mut buf = Vec::new();
        encode_frame(&mut buf, 0xDEAD_BEEF, 1, b"x").unwrap();
        let err = read_frame(&mut Cursor::new(buf), MAGIC).unwrap_err();
        assert!(matches!(
            err,
            Error::BadMagic {
                expected: MAGIC,
                actual: 0xDEAD_BEEF
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn partial_header() {
        for cut in 1..HEADER_LEN {
            let data = vec![0xFFu8; cut];
            let err = read_frame(&mut Cursor::new(data), MAGIC).unwrap_err();
            assert!(
                matches!(err, Error::Truncated { step: "frame header", actual, .. } if actual == cut),
                "cut at {}: {}",
                cut,
                err
            );
        }
    }

    #[test]
    fn partial_payload() {
        let mut buf = Vec::new();
        FrameHeader {
            magic: MAGIC,
            kind: DEVICE_APPS_TYPE,
            length: 100,
        }
        .encode(&mut buf);
        buf.extend_from_slice(&[0u8; 40]);
        let err = read_frame(&mut Cursor::new(buf), MAGIC).unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated {
                step: "frame payload",
                actual: 40,
                expected: 100
            }
        ));
    }
}
