//! Field-level codec for the bus wire format.
//!
//! Every payload is a flat sequence of typed fields read in a fixed,
//! subchannel-specific order. All multi-byte values are big-endian;
//! strings are UTF-8 with a u16 byte-length prefix. The ordering is the
//! wire contract and must match exactly between sender and receiver.

use crate::error::WireError;

/// Appends typed fields to a payload buffer.
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn put_str(&mut self, s: &str) -> Result<(), WireError> {
        let bytes = s.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(WireError::StringTooLong(bytes.len()));
        }
        self.buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads typed fields off a payload in declaration order.
#[derive(Debug)]
pub struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let remaining = self.data.len() - self.pos;
        if remaining < n {
            return Err(WireError::Truncated { needed: n - remaining });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn take_str(&mut self) -> Result<String, WireError> {
        let len_bytes = self.take(2)?;
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    pub fn take_i32(&mut self) -> Result<i32, WireError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn take_i64(&mut self) -> Result<i64, WireError> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    pub fn take_f64(&mut self) -> Result<f64, WireError> {
        let b = self.take(8)?;
        Ok(f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Asserts that every byte of the payload was consumed.
    pub fn expect_end(&self) -> Result<(), WireError> {
        let remaining = self.data.len() - self.pos;
        if remaining != 0 {
            return Err(WireError::TrailingBytes(remaining));
        }
        Ok(())
    }
}
