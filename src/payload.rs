//! Schema encoding of a [`Record`] into frame payload bytes.
//!
//! The payload uses the protocol buffers wire format. Each field is a key varint
//! (`field_number << 3 | wire_type`) followed by its value:
//!
//! | Field | Number | Wire type | Contents                                         |
//! | ----- | ------ | --------- | ------------------------------------------------ |
//! | device| 1      | LEN       | embedded message: `id` = 1 (LEN), `type` = 2 (LEN) |
//! | lat   | 2      | I64       | little-endian `f64`                              |
//! | lon   | 3      | I64       | little-endian `f64`                              |
//! | apps  | 4      | VARINT    | one occurrence per app, in order                 |
//!
//! Absent optional fields are not written at all. A record with nothing set encodes to zero
//! bytes.
//!
//! Decoding skips fields it doesn't know, accepts `apps` in packed form as well, and lets the
//! last occurrence of a singular field win. Repeated `device` messages are merged.

use crate::error::{Error, Result};
use crate::record::{Device, Record};
use crate::varint;
use byteorder::{LittleEndian, ReadBytesExt};
use std::convert::TryFrom;

const FIELD_DEVICE: u64 = 1;
const FIELD_LAT: u64 = 2;
const FIELD_LON: u64 = 3;
const FIELD_APPS: u64 = 4;

const FIELD_DEVICE_ID: u64 = 1;
const FIELD_DEVICE_TYPE: u64 = 2;

/// Largest field number the wire format allows.
const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

/// The wire types this decoder understands. Group start/end (3 and 4) are deprecated and rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WireType {
    Varint,
    I64,
    Len,
    I32,
}

impl From<WireType> for u64 {
    fn from(val: WireType) -> u64 {
        match val {
            WireType::Varint => 0,
            WireType::I64 => 1,
            WireType::Len => 2,
            WireType::I32 => 5,
        }
    }
}

impl TryFrom<u64> for WireType {
    type Error = u64;
    fn try_from(val: u64) -> Result<WireType, u64> {
        match val {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            5 => Ok(WireType::I32),
            _ => Err(val),
        }
    }
}

fn key(field: u64, wire: WireType) -> u64 {
    (field << 3) | u64::from(wire)
}

fn bytes_field_len(field: u64, len: usize) -> usize {
    varint::encoded_len(key(field, WireType::Len)) + varint::encoded_len(len as u64) + len
}

fn device_len(device: &Device) -> usize {
    let id = device
        .id
        .as_ref()
        .map_or(0, |s| bytes_field_len(FIELD_DEVICE_ID, s.len()));
    let kind = device
        .kind
        .as_ref()
        .map_or(0, |s| bytes_field_len(FIELD_DEVICE_TYPE, s.len()));
    id + kind
}

/// Exact number of bytes [`encode_into`] will append for this record.
pub fn encoded_len(record: &Record) -> usize {
    let device = record
        .device
        .as_ref()
        .map_or(0, |d| bytes_field_len(FIELD_DEVICE, device_len(d)));
    let lat = record.latitude.map_or(0, |_| 9);
    let lon = record.longitude.map_or(0, |_| 9);
    let apps: usize = record
        .apps
        .iter()
        .map(|&app| 1 + varint::encoded_len(app as u64))
        .sum();
    device + lat + lon + apps
}

fn write_bytes(buf: &mut Vec<u8>, field: u64, data: &[u8]) {
    varint::write(buf, key(field, WireType::Len));
    varint::write(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

fn write_f64(buf: &mut Vec<u8>, field: u64, v: f64) {
    varint::write(buf, key(field, WireType::I64));
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append the encoded record onto `buf`.
pub fn encode_into(record: &Record, buf: &mut Vec<u8>) {
    buf.reserve(encoded_len(record));
    if let Some(ref device) = record.device {
        varint::write(buf, key(FIELD_DEVICE, WireType::Len));
        varint::write(buf, device_len(device) as u64);
        if let Some(ref id) = device.id {
            write_bytes(buf, FIELD_DEVICE_ID, id.as_bytes());
        }
        if let Some(ref kind) = device.kind {
            write_bytes(buf, FIELD_DEVICE_TYPE, kind.as_bytes());
        }
    }
    if let Some(lat) = record.latitude {
        write_f64(buf, FIELD_LAT, lat);
    }
    if let Some(lon) = record.longitude {
        write_f64(buf, FIELD_LON, lon);
    }
    for &app in record.apps.iter() {
        varint::write(buf, key(FIELD_APPS, WireType::Varint));
        varint::write(buf, app as u64);
    }
}

/// Encode the record into a new byte vector.
pub fn encode(record: &Record) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(record));
    encode_into(record, &mut buf);
    buf
}

fn read_key(buf: &mut &[u8], context: &'static str) -> Result<(u64, WireType)> {
    let key = varint::read(buf, context)?;
    let field = key >> 3;
    if field == 0 || field > MAX_FIELD_NUMBER {
        return Err(Error::bad_payload(
            context,
            format!("invalid field number {}", field),
        ));
    }
    let wire = WireType::try_from(key & 0x7).map_err(|w| {
        Error::bad_payload(
            context,
            format!("unsupported wire type {} on field {}", w, field),
        )
    })?;
    Ok((field, wire))
}

fn read_len<'a>(buf: &mut &'a [u8], field: &'static str) -> Result<&'a [u8]> {
    let len = varint::read(buf, field)?;
    if len > buf.len() as u64 {
        return Err(Error::bad_payload(
            field,
            format!("length {} runs past the {} remaining bytes", len, buf.len()),
        ));
    }
    let (data, rest) = buf.split_at(len as usize);
    *buf = rest;
    Ok(data)
}

fn read_f64(buf: &mut &[u8], field: &'static str) -> Result<f64> {
    buf.read_f64::<LittleEndian>()
        .map_err(|_| Error::bad_payload(field, "expected 8 bytes for a double"))
}

fn read_string(buf: &mut &[u8], field: &'static str) -> Result<String> {
    let data = read_len(buf, field)?;
    std::str::from_utf8(data)
        .map(|s| s.to_string())
        .map_err(|e| Error::bad_payload(field, format!("invalid UTF-8: {}", e)))
}

fn skip(buf: &mut &[u8], wire: WireType, context: &'static str) -> Result<()> {
    let fixed = match wire {
        WireType::Varint => {
            varint::read(buf, context)?;
            return Ok(());
        }
        WireType::Len => {
            read_len(buf, context)?;
            return Ok(());
        }
        WireType::I64 => 8,
        WireType::I32 => 4,
    };
    if buf.len() < fixed {
        return Err(Error::bad_payload(
            context,
            format!("unknown field needs {} bytes, {} remain", fixed, buf.len()),
        ));
    }
    *buf = &buf[fixed..];
    Ok(())
}

fn wrong_wire(field: &'static str, expected: WireType, actual: WireType) -> Error {
    Error::bad_payload(
        field,
        format!("expected wire type {:?}, got {:?}", expected, actual),
    )
}

fn decode_device(mut buf: &[u8], device: &mut Device) -> Result<()> {
    while !buf.is_empty() {
        match read_key(&mut buf, "device")? {
            (FIELD_DEVICE_ID, WireType::Len) => device.id = Some(read_string(&mut buf, "device.id")?),
            (FIELD_DEVICE_ID, w) => return Err(wrong_wire("device.id", WireType::Len, w)),
            (FIELD_DEVICE_TYPE, WireType::Len) => {
                device.kind = Some(read_string(&mut buf, "device.type")?)
            }
            (FIELD_DEVICE_TYPE, w) => return Err(wrong_wire("device.type", WireType::Len, w)),
            (_, w) => skip(&mut buf, w, "device")?,
        }
    }
    Ok(())
}

/// Decode payload bytes into a record. The whole slice must be consumed.
pub fn decode(mut buf: &[u8]) -> Result<Record> {
    let mut record = Record::default();
    while !buf.is_empty() {
        match read_key(&mut buf, "record")? {
            (FIELD_DEVICE, WireType::Len) => {
                let data = read_len(&mut buf, "device")?;
                decode_device(data, record.device.get_or_insert_with(Device::default))?;
            }
            (FIELD_DEVICE, w) => return Err(wrong_wire("device", WireType::Len, w)),
            (FIELD_LAT, WireType::I64) => record.latitude = Some(read_f64(&mut buf, "lat")?),
            (FIELD_LAT, w) => return Err(wrong_wire("lat", WireType::I64, w)),
            (FIELD_LON, WireType::I64) => record.longitude = Some(read_f64(&mut buf, "lon")?),
            (FIELD_LON, w) => return Err(wrong_wire("lon", WireType::I64, w)),
            // uint32 fields keep the low 32 bits of whatever varint was sent.
            (FIELD_APPS, WireType::Varint) => {
                record.apps.push(varint::read(&mut buf, "apps")? as u32)
            }
            (FIELD_APPS, WireType::Len) => {
                let mut packed = read_len(&mut buf, "apps")?;
                while !packed.is_empty() {
                    record.apps.push(varint::read(&mut packed, "apps")? as u32);
                }
            }
            (FIELD_APPS, w) => return Err(wrong_wire("apps", WireType::Varint, w)),
            (_, w) => skip(&mut buf, w, "record")?,
        }
    }
    Ok(record)
}
