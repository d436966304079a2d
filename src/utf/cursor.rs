//! Bounds-checked sequential reader over a shared byte buffer.
//!
//! Every read advances the cursor and shrinks the remaining length. Reading
//! past the end fails with [`Error::Range`]; nothing else can fail here.

use std::rc::Rc;

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct Cursor {
    buffer: Rc<[u8]>,
    offset: usize,
    remaining: usize,
}

impl Cursor {
    /// Cursor over `len` bytes of `buffer` starting at `offset`.
    ///
    /// A `len` of 0 covers everything from `offset` to the end of the buffer.
    pub fn new(buffer: Rc<[u8]>, offset: usize, len: usize) -> Result<Self> {
        if offset > buffer.len() {
            return Err(Error::range(format!(
                "cursor offset {offset} exceeds buffer of {} bytes",
                buffer.len()
            )));
        }
        let available = buffer.len() - offset;
        let remaining = if len == 0 { available } else { len };
        if remaining > available {
            return Err(Error::range(format!(
                "cursor length {remaining} exceeds the {available} bytes after offset {offset}"
            )));
        }
        Ok(Self {
            buffer,
            offset,
            remaining,
        })
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let remaining = bytes.len();
        Self {
            buffer: bytes.into(),
            offset: 0,
            remaining,
        }
    }

    /// Absolute position in the underlying buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Unread bytes without advancing.
    pub fn peek(&self) -> &[u8] {
        &self.buffer[self.offset..self.offset + self.remaining]
    }

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        if len > self.remaining {
            return Err(Error::range(format!(
                "read of {len} bytes exceeds the {} remaining",
                self.remaining
            )));
        }
        let start = self.offset;
        self.offset += len;
        self.remaining -= len;
        Ok(&self.buffer[start..start + len])
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    /// Copies `len` bytes out of the buffer, or all remaining bytes for 0.
    pub fn copy(&mut self, len: usize) -> Result<Vec<u8>> {
        let len = if len == 0 { self.remaining } else { len };
        self.take(len).map(<[u8]>::to_vec)
    }

    /// Splits off a cursor over the next `len` bytes and advances past them.
    pub fn sub_cursor(&mut self, len: usize) -> Result<Cursor> {
        let start = self.offset;
        self.skip(len)?;
        Ok(Cursor {
            buffer: self.buffer.clone(),
            offset: start,
            remaining: len,
        })
    }

    /// Reads a NUL-terminated string occupying `len` bytes.
    ///
    /// A `len` of 0 takes all remaining bytes. The cursor always advances by
    /// the full length even when the string ends earlier.
    pub fn read_string(&mut self, len: usize) -> Result<String> {
        let len = if len == 0 { self.remaining } else { len };
        let bytes = self.take(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(bytes[..end].iter().map(|&b| b as char).collect())
    }

    fn read_run<T, const N: usize>(
        &mut self,
        count: usize,
        decode: fn([u8; N]) -> T,
    ) -> Result<Vec<T>> {
        let count = if count == 0 { self.remaining / N } else { count };
        let len = count
            .checked_mul(N)
            .ok_or_else(|| Error::range(format!("element count {count} overflows")))?;
        let bytes = self.take(len)?;
        Ok(bytes
            .chunks_exact(N)
            .map(|chunk| {
                let mut raw = [0u8; N];
                raw.copy_from_slice(chunk);
                decode(raw)
            })
            .collect())
    }

    /// Reads `count` bytes, or every remaining byte for 0.
    pub fn read_u8s(&mut self, count: usize) -> Result<Vec<u8>> {
        self.read_run(count, |[b]: [u8; 1]| b)
    }

    pub fn read_u16s(&mut self, count: usize) -> Result<Vec<u16>> {
        self.read_run(count, u16::from_le_bytes)
    }

    pub fn read_i16s(&mut self, count: usize) -> Result<Vec<i16>> {
        self.read_run(count, i16::from_le_bytes)
    }

    pub fn read_u32s(&mut self, count: usize) -> Result<Vec<u32>> {
        self.read_run(count, u32::from_le_bytes)
    }

    pub fn read_i32s(&mut self, count: usize) -> Result<Vec<i32>> {
        self.read_run(count, i32::from_le_bytes)
    }

    pub fn read_f32s(&mut self, count: usize) -> Result<Vec<f32>> {
        self.read_run(count, f32::from_le_bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut raw = [0u8; 2];
        raw.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(raw))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(raw))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(f32::from_le_bytes(raw))
    }

    fn read_floats<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut out = [0f32; N];
        for (value, chunk) in out.iter_mut().zip(self.take(N * 4)?.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(out)
    }

    pub fn read_vec2(&mut self) -> Result<[f32; 2]> {
        self.read_floats()
    }

    pub fn read_vec3(&mut self) -> Result<[f32; 3]> {
        self.read_floats()
    }

    pub fn read_vec4(&mut self) -> Result<[f32; 4]> {
        self.read_floats()
    }

    /// Nine consecutive floats, in stored order.
    pub fn read_matrix3x3(&mut self) -> Result<[f32; 9]> {
        self.read_floats()
    }

    pub fn read_matrix4x3(&mut self) -> Result<[f32; 12]> {
        self.read_floats()
    }

    /// Sixteen consecutive floats, in stored order.
    pub fn read_matrix4x4(&mut self) -> Result<[f32; 16]> {
        self.read_floats()
    }
}
