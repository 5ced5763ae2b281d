// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Element-type tag -> (serializer, deserializer) registry.
//!
//! The registry is built once at startup. A lookup walks every registered
//! codec and requires exactly one tag match; zero or several matches are a
//! dispatch failure for that array.
//!
//! # Archive layout
//!
//! ```text
//! +-------------------+-----------------+----------------------------+
//! | name (u32 len+utf8)| count (u64 LE) | count * element (LE bytes) |
//! +-------------------+-----------------+----------------------------+
//! ```

use super::{ArrayData, ArrayType};
use crate::error::{Error, Result};
use crate::ser::{ArchiveWriter, Cursor};

/// Serializes `(name, contents)` into an archive.
pub type SaveFn = fn(&str, &ArrayData, &mut ArchiveWriter) -> Result<()>;

/// Restores array contents from an archive, checking the stored name.
pub type LoadFn = fn(&str, &mut Cursor<'_>) -> Result<ArrayData>;

/// One registered element type.
#[derive(Clone, Copy)]
pub struct ArrayCodec {
    pub tag: u32,
    pub type_name: &'static str,
    pub save: SaveFn,
    pub load: LoadFn,
}

impl std::fmt::Debug for ArrayCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayCodec")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Generate a save/load pair for one element type.
macro_rules! typed_codec {
    ($save:ident, $load:ident, $variant:ident, $type:ty, $size:expr) => {
        fn $save(name: &str, data: &ArrayData, w: &mut ArchiveWriter) -> Result<()> {
            let ArrayData::$variant(values) = data else {
                return Err(Error::Protocol(format!(
                    "array {} holds {} elements, codec expects {}",
                    name,
                    data.element_type(),
                    ArrayType::$variant
                )));
            };
            w.put_string(name)?;
            w.put_len(values.len());
            for v in values {
                w.put_bytes(&v.to_le_bytes());
            }
            Ok(())
        }

        fn $load(name: &str, r: &mut Cursor<'_>) -> Result<ArrayData> {
            let stored = r.read_string()?;
            if stored != name {
                return Err(Error::Protocol(format!(
                    "archive holds array {}, expected {}",
                    stored, name
                )));
            }
            let count = r.read_len($size)?;
            let bytes = r.read_bytes(count * $size)?;
            let values = bytes
                .chunks_exact($size)
                .map(|chunk| {
                    let mut b = [0u8; $size];
                    b.copy_from_slice(chunk);
                    <$type>::from_le_bytes(b)
                })
                .collect();
            Ok(ArrayData::$variant(values))
        }
    };
}

typed_codec!(save_u8, load_u8, U8, u8, 1);
typed_codec!(save_i8, load_i8, I8, i8, 1);
typed_codec!(save_i32, load_i32, I32, i32, 4);
typed_codec!(save_u32, load_u32, U32, u32, 4);
typed_codec!(save_i64, load_i64, I64, i64, 8);
typed_codec!(save_u64, load_u64, U64, u64, 8);
typed_codec!(save_f32, load_f32, F32, f32, 4);
typed_codec!(save_f64, load_f64, F64, f64, 8);

fn builtin(ty: ArrayType) -> ArrayCodec {
    let (save, load): (SaveFn, LoadFn) = match ty {
        ArrayType::U8 => (save_u8, load_u8),
        ArrayType::I8 => (save_i8, load_i8),
        ArrayType::I32 => (save_i32, load_i32),
        ArrayType::U32 => (save_u32, load_u32),
        ArrayType::I64 => (save_i64, load_i64),
        ArrayType::U64 => (save_u64, load_u64),
        ArrayType::F32 => (save_f32, load_f32),
        ArrayType::F64 => (save_f64, load_f64),
    };
    ArrayCodec {
        tag: ty.tag(),
        type_name: ty.as_str(),
        save,
        load,
    }
}

/// Registry of array codecs keyed by element-type tag.
#[derive(Debug, Clone, Default)]
pub struct ArrayCodecRegistry {
    codecs: Vec<ArrayCodec>,
}

impl ArrayCodecRegistry {
    /// Empty registry (no element types supported).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding a codec for every [`ArrayType`].
    pub fn with_builtin_types() -> Self {
        Self {
            codecs: ArrayType::ALL.into_iter().map(builtin).collect(),
        }
    }

    /// Add a codec. Registering the same tag twice makes that tag ambiguous.
    pub fn register(&mut self, codec: ArrayCodec) {
        self.codecs.push(codec);
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Select the single codec for `tag`.
    pub fn select(&self, name: &str, tag: u32) -> Result<&ArrayCodec> {
        let mut found = None;
        let mut matches = 0usize;
        for codec in self.codecs.iter().filter(|c| c.tag == tag) {
            matches += 1;
            found.get_or_insert(codec);
        }
        match (matches, found) {
            (1, Some(codec)) => Ok(codec),
            _ => Err(Error::TypeDispatch {
                name: name.to_owned(),
                tag,
                matches,
            }),
        }
    }

    /// Serialize `data` as the array `name` declared with element tag `tag`.
    pub fn save(&self, name: &str, tag: u32, data: &ArrayData, w: &mut ArchiveWriter) -> Result<()> {
        let codec = self.select(name, tag)?;
        (codec.save)(name, data, w)
    }

    /// Restore the array `name` declared with element tag `tag`.
    pub fn load(&self, name: &str, tag: u32, r: &mut Cursor<'_>) -> Result<ArrayData> {
        let codec = self.select(name, tag)?;
        (codec.load)(name, r)
    }
}
