// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Growable archive writer.
//!
//! Counterpart of [`Cursor`](super::Cursor): everything written here is read
//! back with the matching `read_*` method.

use super::{SerError, SerResult};

/// Length prefix for a string of `len` bytes written at `offset`.
fn string_prefix(len: usize, offset: usize) -> SerResult<u32> {
    u32::try_from(len).map_err(|_| SerError::WriteFailed {
        offset,
        reason: format!("string of {} bytes exceeds u32 length prefix", len),
    })
}

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct ArchiveWriter {
    buffer: Vec<u8>,
}

macro_rules! impl_put_le {
    ($name:ident, $type:ty) => {
        pub fn $name(&mut self, value: $type) {
            self.buffer.extend_from_slice(&value.to_le_bytes());
        }
    };
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    impl_put_le!(put_u8, u8);
    impl_put_le!(put_u32, u32);
    impl_put_le!(put_u64, u64);
    impl_put_le!(put_i32, i32);
    impl_put_le!(put_f64, f64);

    pub fn put_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    pub fn put_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write a `u32` length-prefixed UTF-8 string.
    pub fn put_string(&mut self, text: &str) -> SerResult<()> {
        let len = string_prefix(text.len(), self.buffer.len())?;
        self.put_u32(len);
        self.buffer.extend_from_slice(text.as_bytes());
        Ok(())
    }

    /// Write a `u64` element count (see `Cursor::read_len`).
    pub fn put_len(&mut self, count: usize) {
        self.put_u64(count as u64);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ser::Cursor;

    #[test]
    fn test_string_and_len_read_back() {
        let mut w = ArchiveWriter::new();
        w.put_string("grid_17").unwrap();
        w.put_len(3);
        w.put_bool(true);

        let bytes = w.into_inner();
        let mut r = Cursor::new(&bytes);
        assert_eq!(r.read_string().unwrap(), "grid_17");
        // No element bytes follow the count, so size check fails for non-empty elements
        assert!(r.read_len(1).is_err());
    }

    #[test]
    fn test_empty_writer() {
        let w = ArchiveWriter::with_capacity(64);
        assert!(w.is_empty());
        assert_eq!(w.len(), 0);
        assert!(w.as_slice().is_empty());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_string_prefix_rejects_oversized_length() {
        assert_eq!(string_prefix(5, 0).unwrap(), 5);
        assert_eq!(string_prefix(u32::MAX as usize, 0).unwrap(), u32::MAX);
        assert!(matches!(
            string_prefix(u32::MAX as usize + 1, 12),
            Err(SerError::WriteFailed { offset: 12, .. })
        ));
    }
}
