//! Little-endian payload primitives shared by every frame variant.
//!
//! Fixed-width integers and floats are little-endian. Strings are UTF-8
//! preceded by a `u16` byte length, and the declared length must match the
//! bytes that follow. Any shortfall is a `MalformedFrame`.

use bytes::{BufMut, BytesMut};

use crate::error::{constants, Result, SessionError};

/// Appends payload fields to a buffer.
pub struct WireWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    /// Write a `u16`-prefixed UTF-8 string.
    ///
    /// # Errors
    /// Returns `MalformedFrame` if the encoded string is longer than `u16::MAX` bytes.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        let len = u16::try_from(value.len())
            .map_err(|_| SessionError::malformed(constants::ERR_STRING_TOO_LONG))?;
        self.buf.put_u16_le(len);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Write a `u16` element count for a list that follows.
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        let count = u16::try_from(count)
            .map_err(|_| SessionError::malformed(constants::ERR_LIST_TOO_LONG))?;
        self.buf.put_u16_le(count);
        Ok(())
    }
}

/// Reads payload fields from a byte slice, tracking the remaining length.
pub struct WireReader<'a> {
    data: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.data.len() < len {
            return Err(SessionError::malformed(format!(
                "{}: needed {len} bytes, {} remaining",
                constants::ERR_TRUNCATED_PAYLOAD,
                self.data.len()
            )));
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    /// Read a `u16`-prefixed UTF-8 string. The prefix must not claim more
    /// bytes than remain in the payload.
    pub fn read_str(&mut self) -> Result<String> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| SessionError::malformed(constants::ERR_INVALID_UTF8))
    }

    /// Read a `u16` list count
    pub fn read_count(&mut self) -> Result<usize> {
        Ok(usize::from(self.read_u16()?))
    }

    /// Require that every byte was consumed.
    pub fn finish(self) -> Result<()> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(SessionError::malformed(format!(
                "{} ({} left)",
                constants::ERR_TRAILING_BYTES,
                self.data.len()
            )))
        }
    }
}
