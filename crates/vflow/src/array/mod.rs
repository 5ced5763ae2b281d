// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flat typed arrays, the leaves of the object graph.
//!
//! The element type set is closed. Every array travels with a numeric type
//! tag; [`ArrayCodecRegistry`] maps that tag to the save/load pair used by the
//! bulk-data path.

mod codec;

pub use codec::{ArrayCodec, ArrayCodecRegistry, LoadFn, SaveFn};

use std::fmt;

/// Supported element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayType {
    U8,
    I8,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ArrayType {
    /// Every supported element type, in tag order.
    pub const ALL: [ArrayType; 8] = [
        ArrayType::U8,
        ArrayType::I8,
        ArrayType::I32,
        ArrayType::U32,
        ArrayType::I64,
        ArrayType::U64,
        ArrayType::F32,
        ArrayType::F64,
    ];

    /// Wire tag for this element type.
    pub fn tag(self) -> u32 {
        match self {
            ArrayType::U8 => 1,
            ArrayType::I8 => 2,
            ArrayType::I32 => 3,
            ArrayType::U32 => 4,
            ArrayType::I64 => 5,
            ArrayType::U64 => 6,
            ArrayType::F32 => 7,
            ArrayType::F64 => 8,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Size of one element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            ArrayType::U8 | ArrayType::I8 => 1,
            ArrayType::I32 | ArrayType::U32 | ArrayType::F32 => 4,
            ArrayType::I64 | ArrayType::U64 | ArrayType::F64 => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArrayType::U8 => "u8",
            ArrayType::I8 => "i8",
            ArrayType::I32 => "i32",
            ArrayType::U32 => "u32",
            ArrayType::I64 => "i64",
            ArrayType::U64 => "u64",
            ArrayType::F32 => "f32",
            ArrayType::F64 => "f64",
        }
    }
}

impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contents of a typed array.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    U8(Vec<u8>),
    I8(Vec<i8>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! for_each_variant {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            ArrayData::U8($v) => $body,
            ArrayData::I8($v) => $body,
            ArrayData::I32($v) => $body,
            ArrayData::U32($v) => $body,
            ArrayData::I64($v) => $body,
            ArrayData::U64($v) => $body,
            ArrayData::F32($v) => $body,
            ArrayData::F64($v) => $body,
        }
    };
}

impl ArrayData {
    pub fn element_type(&self) -> ArrayType {
        match self {
            ArrayData::U8(_) => ArrayType::U8,
            ArrayData::I8(_) => ArrayType::I8,
            ArrayData::I32(_) => ArrayType::I32,
            ArrayData::U32(_) => ArrayType::U32,
            ArrayData::I64(_) => ArrayType::I64,
            ArrayData::U64(_) => ArrayType::U64,
            ArrayData::F32(_) => ArrayType::F32,
            ArrayData::F64(_) => ArrayType::F64,
        }
    }

    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the contents in bytes.
    pub fn byte_len(&self) -> usize {
        self.len() * self.element_type().element_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_unique_and_reversible() {
        for ty in ArrayType::ALL {
            assert_eq!(ArrayType::from_tag(ty.tag()), Some(ty));
        }
        let mut tags: Vec<u32> = ArrayType::ALL.iter().map(|t| t.tag()).collect();
        tags.dedup();
        assert_eq!(tags.len(), ArrayType::ALL.len());
        assert_eq!(ArrayType::from_tag(0), None);
        assert_eq!(ArrayType::from_tag(99), None);
    }

    #[test]
    fn test_array_data_sizes() {
        let a = ArrayData::F64(vec![1.0, 2.0, 3.0]);
        assert_eq!(a.element_type(), ArrayType::F64);
        assert_eq!(a.len(), 3);
        assert_eq!(a.byte_len(), 24);
        assert!(ArrayData::I8(vec![]).is_empty());
    }
}
