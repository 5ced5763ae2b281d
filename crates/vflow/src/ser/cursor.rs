// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read/write cursors over byte buffers.

use super::{SerError, SerResult};

/// Generate write methods for primitive types.
macro_rules! impl_write_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self, value: $type) -> SerResult<()> {
            self.write_bytes(&value.to_le_bytes())
        }
    };
}

/// Generate read methods for primitive types.
macro_rules! impl_read_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> SerResult<$type> {
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(self.read_bytes($size)?);
            Ok(<$type>::from_le_bytes(bytes))
        }
    };
}

/// Mutable cursor writing into a fixed-size buffer.
///
/// Used for control messages, whose encoded form never exceeds
/// `MESSAGE_SIZE`; the unused tail of the buffer stays zeroed.
pub struct CursorMut<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> CursorMut<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_write_le!(write_u8, u8, 1);
    impl_write_le!(write_u32_le, u32, 4);
    impl_write_le!(write_u64_le, u64, 8);
    impl_write_le!(write_i32_le, i32, 4);
    impl_write_le!(write_f64_le, f64, 8);

    pub fn write_bytes(&mut self, data: &[u8]) -> SerResult<()> {
        if self.offset + data.len() > self.buffer.len() {
            return Err(SerError::WriteFailed {
                offset: self.offset,
                reason: "buffer too small".into(),
            });
        }
        self.buffer[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        Ok(())
    }

    /// Write `text` into a zero-padded field of exactly `width` bytes.
    ///
    /// One byte is reserved for the terminator, so `text` may hold at most
    /// `width - 1` bytes.
    pub fn write_fixed_str(&mut self, text: &str, width: usize) -> SerResult<()> {
        if text.len() >= width {
            return Err(SerError::WriteFailed {
                offset: self.offset,
                reason: format!("string of {} bytes exceeds field width {}", text.len(), width),
            });
        }
        if self.offset + width > self.buffer.len() {
            return Err(SerError::WriteFailed {
                offset: self.offset,
                reason: "buffer too small".into(),
            });
        }
        let field = &mut self.buffer[self.offset..self.offset + width];
        field.fill(0);
        field[..text.len()].copy_from_slice(text.as_bytes());
        self.offset += width;
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }
}

/// Immutable cursor for reading (bounds-checked, zero-copy).
pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_read_le!(read_u8, u8, 1);
    impl_read_le!(read_u32_le, u32, 4);
    impl_read_le!(read_u64_le, u64, 8);
    impl_read_le!(read_i32_le, i32, 4);
    impl_read_le!(read_f64_le, f64, 8);

    pub fn read_bool(&mut self) -> SerResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SerError::InvalidData {
                reason: format!("invalid bool byte {:#04x}", other),
            }),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> SerResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(SerError::ReadFailed {
                offset: self.offset,
                reason: "unexpected end of buffer".into(),
            });
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Read a `u32` length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> SerResult<String> {
        let len = self.read_u32_le()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerError::InvalidData {
            reason: "string is not valid UTF-8".into(),
        })
    }

    /// Read a zero-padded string field of exactly `width` bytes.
    pub fn read_fixed_str(&mut self, width: usize) -> SerResult<String> {
        let field = self.read_bytes(width)?;
        let end = field.iter().position(|&b| b == 0).unwrap_or(width);
        std::str::from_utf8(&field[..end])
            .map(str::to_owned)
            .map_err(|_| SerError::InvalidData {
                reason: "fixed string is not valid UTF-8".into(),
            })
    }

    /// Read a `u64` element count and check that `count * elem_size` bytes remain.
    pub fn read_len(&mut self, elem_size: usize) -> SerResult<usize> {
        let at = self.offset;
        let count = self.read_u64_le()?;
        let count = usize::try_from(count).map_err(|_| SerError::ReadFailed {
            offset: at,
            reason: "element count overflows usize".into(),
        })?;
        match count.checked_mul(elem_size) {
            Some(bytes) if bytes <= self.remaining() => Ok(count),
            _ => Err(SerError::ReadFailed {
                offset: at,
                reason: format!("{} elements of {} bytes exceed buffer", count, elem_size),
            }),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.buffer.len()
    }
}
