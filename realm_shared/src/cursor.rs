//! Binary cursor.
//!
//! Every byte that crosses the wire is produced by a [`WriteCursor`] and
//! consumed by a [`ReadCursor`]. The client speaks a handful of obfuscated
//! integer encodings on top of plain big-endian values:
//! - `C`: the value negated.
//! - `A`: the value plus 128.
//! - `S`: 128 minus the value.
//! - little-endian shorts, and two "middle-endian" int orderings.
//!
//! Bit-packed sections are written MSB-first through a [`BitWriter`] borrowed
//! from the cursor. The borrow keeps byte writes out until the bit section is
//! finished; dropping the guard leaves the cursor byte-aligned.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Terminator byte for strings on the wire.
pub const STRING_TERMINATOR: u8 = 10;

/// Largest value representable in an unsigned byte.
pub const BYTE_CAPACITY: usize = 255;

/// Errors raised while reading a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CursorError {
    /// A read asked for more bytes (or bits) than remain.
    #[error("buffer underflow: needed {needed} more, {remaining} remaining")]
    Underflow { needed: usize, remaining: usize },
}

fn bit_mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

/// Growable output buffer.
#[derive(Debug, Default, Clone)]
pub struct WriteCursor {
    buf: BytesMut,
}

impl WriteCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the cursor and returns the written bytes.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Byte encoded as its negation.
    pub fn put_u8_c(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value.wrapping_neg());
        self
    }

    /// Byte offset by +128.
    pub fn put_u8_a(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value.wrapping_add(128));
        self
    }

    /// Byte encoded as `128 - value`.
    pub fn put_u8_s(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(128u8.wrapping_sub(value));
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16(value);
        self
    }

    /// Big-endian short whose low byte is offset by +128.
    pub fn put_u16_a(&mut self, value: u16) -> &mut Self {
        self.buf.put_u8((value >> 8) as u8);
        self.buf.put_u8((value as u8).wrapping_add(128));
        self
    }

    pub fn put_u16_le(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    /// Little-endian short whose low byte is offset by +128.
    pub fn put_u16_le_a(&mut self, value: u16) -> &mut Self {
        self.buf.put_u8((value as u8).wrapping_add(128));
        self.buf.put_u8((value >> 8) as u8);
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32(value);
        self
    }

    /// Int written in byte order 1, 0, 3, 2 (0 = least significant).
    pub fn put_u32_me(&mut self, value: u32) -> &mut Self {
        self.buf.put_u8((value >> 8) as u8);
        self.buf.put_u8(value as u8);
        self.buf.put_u8((value >> 24) as u8);
        self.buf.put_u8((value >> 16) as u8);
        self
    }

    /// Int written in byte order 2, 3, 0, 1 (0 = least significant).
    pub fn put_u32_ime(&mut self, value: u32) -> &mut Self {
        self.buf.put_u8((value >> 16) as u8);
        self.buf.put_u8((value >> 24) as u8);
        self.buf.put_u8(value as u8);
        self.buf.put_u8((value >> 8) as u8);
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64(value);
        self
    }

    /// ASCII string followed by [`STRING_TERMINATOR`]. Non-ASCII characters
    /// are replaced with `?`.
    pub fn put_str(&mut self, value: &str) -> &mut Self {
        for c in value.chars() {
            self.buf.put_u8(if c.is_ascii() { c as u8 } else { b'?' });
        }
        self.buf.put_u8(STRING_TERMINATOR);
        self
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Switches to bit access until the returned guard is dropped.
    pub fn bits(&mut self) -> BitWriter<'_> {
        let bit_pos = self.buf.len() * 8;
        BitWriter {
            buf: &mut self.buf,
            bit_pos,
        }
    }
}

/// Bit-level view over a [`WriteCursor`].
///
/// Bits are packed MSB-first. The underlying buffer always covers every
/// partially written byte, so dropping the guard realigns to the next whole
/// byte.
pub struct BitWriter<'a> {
    buf: &'a mut BytesMut,
    bit_pos: usize,
}

impl BitWriter<'_> {
    /// Writes the low `count` bits of `value` (1..=32).
    pub fn write(&mut self, count: u32, value: u32) -> &mut Self {
        debug_assert!((1..=32).contains(&count), "bit count out of range");

        let mut remaining = count;
        let mut byte = self.bit_pos >> 3;
        let mut free = 8 - (self.bit_pos & 7) as u32;
        self.bit_pos += count as usize;

        let needed = (self.bit_pos + 7) / 8;
        if self.buf.len() < needed {
            self.buf.resize(needed, 0);
        }

        while remaining > free {
            let chunk = (value >> (remaining - free)) & bit_mask(free);
            self.buf[byte] = (self.buf[byte] & !(bit_mask(free) as u8)) | chunk as u8;
            byte += 1;
            remaining -= free;
            free = 8;
        }

        let shift = free - remaining;
        let mask = (bit_mask(remaining) << shift) as u8;
        let chunk = ((value & bit_mask(remaining)) << shift) as u8;
        self.buf[byte] = (self.buf[byte] & !mask) | chunk;
        self
    }

    pub fn write_bool(&mut self, flag: bool) -> &mut Self {
        self.write(1, u32::from(flag))
    }

    /// Bits written since the cursor was created.
    pub fn position(&self) -> usize {
        self.bit_pos
    }
}

/// Reader over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ReadCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CursorError> {
        if self.remaining() < n {
            return Err(CursorError::Underflow {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let data = self.data;
        let out = &data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, CursorError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u8_c(&mut self) -> Result<u8, CursorError> {
        Ok(self.read_u8()?.wrapping_neg())
    }

    pub fn read_u8_a(&mut self) -> Result<u8, CursorError> {
        Ok(self.read_u8()?.wrapping_sub(128))
    }

    pub fn read_u8_s(&mut self) -> Result<u8, CursorError> {
        Ok(128u8.wrapping_sub(self.read_u8()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u16_a(&mut self) -> Result<u16, CursorError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1].wrapping_sub(128)]))
    }

    pub fn read_u16_le(&mut self) -> Result<u16, CursorError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u16_le_a(&mut self) -> Result<u16, CursorError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0].wrapping_sub(128), b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32_me(&mut self) -> Result<u32, CursorError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[2], b[3], b[0], b[1]]))
    }

    pub fn read_u32_ime(&mut self) -> Result<u32, CursorError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[1], b[0], b[3], b[2]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, CursorError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CursorError> {
        self.take(n)
    }

    /// Reads `n` bytes, each offset by +128.
    pub fn read_bytes_a(&mut self, n: usize) -> Result<Vec<u8>, CursorError> {
        Ok(self.take(n)?.iter().map(|b| b.wrapping_add(128)).collect())
    }

    /// Reads up to the string terminator or the end of the buffer.
    pub fn read_string(&mut self) -> String {
        let data = self.data;
        let rest = &data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == STRING_TERMINATOR)
            .unwrap_or(rest.len());
        let text: String = rest[..end].iter().map(|&b| b as char).collect();
        self.pos += (end + 1).min(rest.len());
        text
    }

    /// Switches to bit access until the returned guard is dropped.
    pub fn bits(&mut self) -> BitReader<'_, 'a> {
        let bit_pos = self.pos * 8;
        BitReader {
            cursor: self,
            bit_pos,
        }
    }
}

/// Bit-level view over a [`ReadCursor`]. Dropping it realigns the cursor to
/// the next whole byte.
pub struct BitReader<'c, 'a> {
    cursor: &'c mut ReadCursor<'a>,
    bit_pos: usize,
}

impl BitReader<'_, '_> {
    pub fn read(&mut self, count: u32) -> Result<u32, CursorError> {
        let available = self.cursor.data.len() * 8 - self.bit_pos;
        if (count as usize) > available {
            return Err(CursorError::Underflow {
                needed: count as usize,
                remaining: available,
            });
        }
        let mut value = 0u32;
        for _ in 0..count {
            let byte = self.cursor.data[self.bit_pos >> 3];
            let bit = (byte >> (7 - (self.bit_pos & 7))) & 1;
            value = (value << 1) | u32::from(bit);
            self.bit_pos += 1;
        }
        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool, CursorError> {
        Ok(self.read(1)? == 1)
    }

    /// Reads a two's-complement value of `count` bits.
    pub fn read_signed(&mut self, count: u32) -> Result<i32, CursorError> {
        let raw = self.read(count)?;
        let sign = 1u32 << (count - 1);
        Ok(if raw & sign != 0 {
            raw as i32 - (1i32 << count)
        } else {
            raw as i32
        })
    }

    /// Bits left before the end of the data.
    pub fn remaining(&self) -> usize {
        self.cursor.data.len() * 8 - self.bit_pos
    }
}

impl Drop for BitReader<'_, '_> {
    fn drop(&mut self) {
        self.cursor.pos = (self.bit_pos + 7) / 8;
    }
}
