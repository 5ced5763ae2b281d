// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Little-endian serialization helpers for archives and wire messages.
//!
//! - [`Cursor`] reads from a borrowed buffer (bounds-checked, zero-copy).
//! - [`CursorMut`] writes into a fixed-size buffer (control messages).
//! - [`ArchiveWriter`] appends into a growable buffer (object/array archives,
//!   bulk message headers).

pub mod archive;
pub mod cursor;

pub use archive::ArchiveWriter;
pub use cursor::{Cursor, CursorMut};

use std::fmt;

/// Serialization error carrying the offset where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerError {
    WriteFailed { offset: usize, reason: String },
    ReadFailed { offset: usize, reason: String },
    InvalidData { reason: String },
}

impl fmt::Display for SerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerError::WriteFailed { offset, reason } => {
                write!(f, "write failed at offset {}: {}", offset, reason)
            }
            SerError::ReadFailed { offset, reason } => {
                write!(f, "read failed at offset {}: {}", offset, reason)
            }
            SerError::InvalidData { reason } => write!(f, "invalid data: {}", reason),
        }
    }
}

impl std::error::Error for SerError {}

pub type SerResult<T> = core::result::Result<T, SerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ser_error_display_variants() {
        let err = SerError::WriteFailed {
            offset: 12,
            reason: "buffer too small".into(),
        };
        assert_eq!(err.to_string(), "write failed at offset 12: buffer too small");

        let err = SerError::ReadFailed {
            offset: 4,
            reason: "unexpected end of buffer".into(),
        };
        assert_eq!(err.to_string(), "read failed at offset 4: unexpected end of buffer");

        let err = SerError::InvalidData {
            reason: "bad utf-8".into(),
        };
        assert_eq!(err.to_string(), "invalid data: bad utf-8");
    }

    #[test]
    fn test_ser_error_into_api_error() {
        let api_err: crate::Error = SerError::InvalidData {
            reason: "bad payload".into(),
        }
        .into();
        assert!(matches!(api_err, crate::Error::Serialization(_)));
    }
}
