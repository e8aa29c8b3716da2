//! Little-endian byte packing for wire payloads.
//!
//! Every value that crosses the transport is packed with [`WireWriter`] and
//! unpacked with [`WireReader`]. The layout is fixed little-endian with no
//! self-description: both ends of a link run the same build, so a malformed
//! payload indicates a version mismatch, not user error (callers treat
//! [`WireError`] as fatal).
//!
//! # Primitive layouts
//!
//! ```text
//! i32/u32    4 bytes LE
//! i64/u64    8 bytes LE
//! u8         1 byte
//! bytes      [len: u32 LE][len bytes]
//! str        [len: u16 LE][len bytes UTF-8]
//! ```

use thiserror::Error;

/// Errors from unpacking a wire payload.
///
/// Any of these on a live link means the peer runs an incompatible build;
/// the managers abort on them per the error-handling design.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The payload ended before the expected value.
    #[error("Payload too short: needed {needed} more bytes, {remaining} remain")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A length-prefixed string was not valid UTF-8.
    #[error("String field is not valid UTF-8")]
    InvalidUtf8,

    /// Leading message tag byte matches no known message kind.
    #[error("Unknown message tag: {tag}")]
    UnknownTag { tag: u8 },

    /// Record descriptor byte matches no known descriptor.
    #[error("Unknown record descriptor: {value}")]
    UnknownDescriptor { value: u8 },

    /// Field entry state byte matches neither set nor consumed.
    #[error("Unknown entry state: {value}")]
    UnknownEntryState { value: u8 },

    /// Data mode byte matches neither textual nor binary.
    #[error("Unknown data mode: {value}")]
    UnknownDataMode { value: u8 },

    /// The record kind carries process-local state and cannot cross the wire.
    #[error("Record descriptor {descriptor} cannot be serialized")]
    UnsendableRecord { descriptor: &'static str },

    /// An interface pack/unpack callback rejected the payload.
    #[error("Interface callback failed: {reason}")]
    Interface { reason: String },
}

/// Append-only buffer for packing a wire payload.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a u32-length-prefixed byte block.
    pub fn put_bytes(&mut self, v: &[u8]) {
        self.put_u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }

    /// Append a u16-length-prefixed UTF-8 string.
    ///
    /// Strings on the wire are registry names; anything longer than 64 KiB
    /// is a caller bug, so the length is truncated-checked with a debug
    /// assertion rather than a runtime error.
    pub fn put_str(&mut self, v: &str) {
        debug_assert!(v.len() <= u16::MAX as usize);
        self.buf.extend_from_slice(&(v.len() as u16).to_le_bytes());
        self.buf.extend_from_slice(v.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer, yielding the packed frame.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received wire payload.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_i32(&mut self) -> Result<i32, WireError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_i64(&mut self) -> Result<i64, WireError> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn get_u64(&mut self) -> Result<u64, WireError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read a u32-length-prefixed byte block.
    pub fn get_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }

    /// Read a u16-length-prefixed UTF-8 string.
    pub fn get_str(&mut self) -> Result<&'a str, WireError> {
        let b = self.take(2)?;
        let len = u16::from_le_bytes([b[0], b[1]]) as usize;
        std::str::from_utf8(self.take(len)?).map_err(|_| WireError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_primitives() {
        let mut w = WireWriter::new();
        w.put_u8(7);
        w.put_i32(-42);
        w.put_u64(u64::MAX - 1);
        w.put_bytes(b"payload");
        w.put_str("weir/test");

        let frame = w.into_bytes();
        let mut r = WireReader::new(&frame);
        assert_eq!(r.get_u8().unwrap(), 7);
        assert_eq!(r.get_i32().unwrap(), -42);
        assert_eq!(r.get_u64().unwrap(), u64::MAX - 1);
        assert_eq!(r.get_bytes().unwrap(), b"payload");
        assert_eq!(r.get_str().unwrap(), "weir/test");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_short_read_reports_sizes() {
        let mut r = WireReader::new(&[1, 2]);
        let err = r.get_i32().unwrap_err();
        assert_eq!(
            err,
            WireError::UnexpectedEof {
                needed: 4,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_truncated_bytes_block() {
        let mut w = WireWriter::new();
        w.put_bytes(&[1, 2, 3, 4]);
        let mut frame = w.into_bytes();
        frame.truncate(6);

        let mut r = WireReader::new(&frame);
        assert!(matches!(
            r.get_bytes(),
            Err(WireError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_string() {
        let frame = [2u8, 0, 0xff, 0xfe];
        let mut r = WireReader::new(&frame);
        assert_eq!(r.get_str(), Err(WireError::InvalidUtf8));
    }
}
