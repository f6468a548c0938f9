//! Binary codecs for the game protocol
//!
//! Every multi-byte value is big-endian. Strings carry a `u16` byte length
//! (or a `u32` one for the large JSON blobs), connection keys a `u16` length.

use bytes::{Buf, BufMut, BytesMut};
use krelay_core::{Location, RelayError, Result};

/// Trait for structures that can be encoded/decoded with the protocol codecs
pub trait WireFormat: Sized {
    fn write_to(&self, buf: &mut BytesMut);
    fn read_from(buf: &mut BytesMut) -> Result<Self>;
}

#[inline]
fn ensure(buf: &BytesMut, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(RelayError::InvalidData(format!(
            "Not enough bytes for {}: need {}, have {}",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

#[inline]
pub fn write_bool(buf: &mut BytesMut, val: bool) {
    buf.put_u8(val as u8);
}

#[inline]
pub fn read_bool(buf: &mut BytesMut) -> Result<bool> {
    ensure(buf, 1, "bool")?;
    Ok(buf.get_u8() != 0)
}

#[inline]
pub fn write_u8(buf: &mut BytesMut, val: u8) {
    buf.put_u8(val);
}

#[inline]
pub fn read_u8(buf: &mut BytesMut) -> Result<u8> {
    ensure(buf, 1, "u8")?;
    Ok(buf.get_u8())
}

#[inline]
pub fn write_i16(buf: &mut BytesMut, val: i16) {
    buf.put_i16(val);
}

#[inline]
pub fn read_i16(buf: &mut BytesMut) -> Result<i16> {
    ensure(buf, 2, "i16")?;
    Ok(buf.get_i16())
}

#[inline]
pub fn write_u16(buf: &mut BytesMut, val: u16) {
    buf.put_u16(val);
}

#[inline]
pub fn read_u16(buf: &mut BytesMut) -> Result<u16> {
    ensure(buf, 2, "u16")?;
    Ok(buf.get_u16())
}

#[inline]
pub fn write_i32(buf: &mut BytesMut, val: i32) {
    buf.put_i32(val);
}

#[inline]
pub fn read_i32(buf: &mut BytesMut) -> Result<i32> {
    ensure(buf, 4, "i32")?;
    Ok(buf.get_i32())
}

#[inline]
pub fn write_u32(buf: &mut BytesMut, val: u32) {
    buf.put_u32(val);
}

#[inline]
pub fn read_u32(buf: &mut BytesMut) -> Result<u32> {
    ensure(buf, 4, "u32")?;
    Ok(buf.get_u32())
}

#[inline]
pub fn write_f32(buf: &mut BytesMut, val: f32) {
    buf.put_f32(val);
}

#[inline]
pub fn read_f32(buf: &mut BytesMut) -> Result<f32> {
    ensure(buf, 4, "f32")?;
    Ok(buf.get_f32())
}

/// Write a string with a `u16` length prefix
///
/// Strings longer than `u16::MAX` bytes are truncated.
#[inline]
pub fn write_string(buf: &mut BytesMut, val: &str) {
    let bytes = val.as_bytes();
    let len = bytes.len().min(u16::MAX as usize);
    buf.put_u16(len as u16);
    buf.put_slice(&bytes[..len]);
}

/// Read a string with a `u16` length prefix (lossy UTF-8)
#[inline]
pub fn read_string(buf: &mut BytesMut) -> Result<String> {
    let len = read_u16(buf)? as usize;
    ensure(buf, len, "string")?;
    let bytes = buf.split_to(len);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write a string with a `u32` length prefix
#[inline]
pub fn write_string32(buf: &mut BytesMut, val: &str) {
    buf.put_u32(val.len() as u32);
    buf.put_slice(val.as_bytes());
}

/// Read a string with a `u32` length prefix (lossy UTF-8)
#[inline]
pub fn read_string32(buf: &mut BytesMut) -> Result<String> {
    let len = read_u32(buf)? as usize;
    ensure(buf, len, "string32")?;
    let bytes = buf.split_to(len);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write a byte array with a `u16` length prefix
#[inline]
pub fn write_bytes(buf: &mut BytesMut, val: &[u8]) {
    let len = val.len().min(u16::MAX as usize);
    buf.put_u16(len as u16);
    buf.put_slice(&val[..len]);
}

/// Read a byte array with a `u16` length prefix
#[inline]
pub fn read_bytes(buf: &mut BytesMut) -> Result<Vec<u8>> {
    let len = read_u16(buf)? as usize;
    ensure(buf, len, "byte array")?;
    Ok(buf.split_to(len).to_vec())
}

/// Consume whatever is left in the buffer
#[inline]
pub fn read_remaining(buf: &mut BytesMut) -> Vec<u8> {
    buf.split().to_vec()
}

/// Write a list with a `u16` element count
pub fn write_list<T: WireFormat>(buf: &mut BytesMut, items: &[T]) {
    buf.put_u16(items.len().min(u16::MAX as usize) as u16);
    for item in items.iter().take(u16::MAX as usize) {
        item.write_to(buf);
    }
}

/// Read a list with a `u16` element count
pub fn read_list<T: WireFormat>(buf: &mut BytesMut) -> Result<Vec<T>> {
    let count = read_u16(buf)? as usize;
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        items.push(T::read_from(buf)?);
    }
    Ok(items)
}

impl WireFormat for Location {
    fn write_to(&self, buf: &mut BytesMut) {
        write_f32(buf, self.x);
        write_f32(buf, self.y);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        Ok(Location {
            x: read_f32(buf)?,
            y: read_f32(buf)?,
        })
    }
}

impl WireFormat for i32 {
    fn write_to(&self, buf: &mut BytesMut) {
        write_i32(buf, *self);
    }

    fn read_from(buf: &mut BytesMut) -> Result<Self> {
        read_i32(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        let mut buf = BytesMut::new();
        write_i32(&mut buf, 2050);
        assert_eq!(&buf[..], &[0x00, 0x00, 0x08, 0x02]);

        let mut buf = BytesMut::new();
        write_i32(&mut buf, -1);
        assert_eq!(&buf[..], &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(read_i32(&mut buf).unwrap(), -1);
    }

    #[test]
    fn test_string_layout() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "Nexus");
        assert_eq!(&buf[..2], &[0x00, 0x05]);
        assert_eq!(&buf[2..], b"Nexus");
        assert_eq!(read_string(&mut buf).unwrap(), "Nexus");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_string_and_bytes() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "");
        write_bytes(&mut buf, &[]);
        assert_eq!(read_string(&mut buf).unwrap(), "");
        assert!(read_bytes(&mut buf).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let mut buf = BytesMut::from(&[0x00, 0x09, b'a', b'b'][..]);
        assert!(read_string(&mut buf).is_err());

        let mut buf = BytesMut::from(&[0x00, 0x01][..]);
        assert!(read_i32(&mut buf).is_err());

        let mut buf = BytesMut::new();
        assert!(read_bool(&mut buf).is_err());
    }

    #[test]
    fn test_string32_holds_large_payload() {
        let json = "x".repeat(70_000);
        let mut buf = BytesMut::new();
        write_string32(&mut buf, &json);
        assert_eq!(read_string32(&mut buf).unwrap().len(), 70_000);
    }
}
