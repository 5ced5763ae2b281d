// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Composite data objects.
//!
//! An object is an immutable, named, type-tagged payload plus an ordered list
//! of dependencies on other objects and arrays. The core never interprets the
//! payload; it only moves it, counts references to it and checks that it
//! arrived intact.
//!
//! # Archive layout
//!
//! ```text
//! name          string (u32 len + utf8)
//! type_tag      u32
//! meta          7 x i32 + f64
//! dep count     u64
//!   dep kind    u8 (0 = array, 1 = object)
//!   dep name    string
//!   elem tag    u32 (arrays only)
//! payload       u64 len + bytes
//! checksum      u32 (CRC-32 of payload)
//! ```
//!
//! Dependencies are written as names only. Loading hands each one to a
//! [`Fetcher`], which either resolves it from the local store or defers it to
//! a remote fetch.

mod fetcher;

pub use fetcher::{Fetched, Fetcher, LocalFetcher};

use crate::array::ArrayType;
use crate::error::{Error, Result};
use crate::ser::{ArchiveWriter, Cursor, SerError, SerResult};
use crate::store::{Handle, ObjectStore};

const DEP_ARRAY: u8 = 0;
const DEP_OBJECT: u8 = 1;

/// Placement of an object within a time-dependent, block-decomposed dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectMeta {
    pub block: i32,
    pub num_blocks: i32,
    pub timestep: i32,
    pub num_timesteps: i32,
    pub iteration: i32,
    pub execution_counter: i32,
    pub creator: i32,
    pub real_time: f64,
}

impl Default for ObjectMeta {
    fn default() -> Self {
        Self {
            block: -1,
            num_blocks: -1,
            timestep: -1,
            num_timesteps: -1,
            iteration: -1,
            execution_counter: -1,
            creator: -1,
            real_time: 0.0,
        }
    }
}

impl ObjectMeta {
    fn save(&self, w: &mut ArchiveWriter) {
        w.put_i32(self.block);
        w.put_i32(self.num_blocks);
        w.put_i32(self.timestep);
        w.put_i32(self.num_timesteps);
        w.put_i32(self.iteration);
        w.put_i32(self.execution_counter);
        w.put_i32(self.creator);
        w.put_f64(self.real_time);
    }

    fn load(r: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            block: r.read_i32_le()?,
            num_blocks: r.read_i32_le()?,
            timestep: r.read_i32_le()?,
            num_timesteps: r.read_i32_le()?,
            iteration: r.read_i32_le()?,
            execution_counter: r.read_i32_le()?,
            creator: r.read_i32_le()?,
            real_time: r.read_f64_le()?,
        })
    }
}

/// Reference from an object to another store entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    Array { name: String, elem: ArrayType },
    Object { name: String },
}

impl Dependency {
    pub fn array(name: &str, elem: ArrayType) -> Self {
        Dependency::Array {
            name: name.to_owned(),
            elem,
        }
    }

    pub fn object(name: &str) -> Self {
        Dependency::Object {
            name: name.to_owned(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Dependency::Array { name, .. } | Dependency::Object { name } => name,
        }
    }

    fn save(&self, w: &mut ArchiveWriter) -> SerResult<()> {
        match self {
            Dependency::Array { name, elem } => {
                w.put_u8(DEP_ARRAY);
                w.put_string(name)?;
                w.put_u32(elem.tag());
            }
            Dependency::Object { name } => {
                w.put_u8(DEP_OBJECT);
                w.put_string(name)?;
            }
        }
        Ok(())
    }

    fn load(r: &mut Cursor<'_>) -> Result<Self> {
        let kind = r.read_u8()?;
        let name = r.read_string()?;
        match kind {
            DEP_ARRAY => {
                let tag = r.read_u32_le()?;
                let elem = ArrayType::from_tag(tag).ok_or_else(|| {
                    Error::Protocol(format!("dependency {} has unknown element tag {}", name, tag))
                })?;
                Ok(Dependency::Array { name, elem })
            }
            DEP_OBJECT => Ok(Dependency::Object { name }),
            other => Err(Error::Serialization(SerError::InvalidData {
                reason: format!("invalid dependency kind {}", other),
            })),
        }
    }
}

/// CRC-32 of an object payload.
pub fn payload_checksum(payload: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(payload);
    crc.sum()
}

/// Immutable object contents.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectData {
    name: String,
    type_tag: u32,
    meta: ObjectMeta,
    payload: Vec<u8>,
    deps: Vec<Dependency>,
    checksum: u32,
}

/// Result of loading an object archive.
#[derive(Debug)]
pub struct LoadedObject {
    pub object: ObjectData,
    /// Dependencies that were already local, one reference each.
    pub resolved: Vec<Handle>,
    /// Number of dependencies handed off to a deferred fetch.
    pub deferred: usize,
}

impl ObjectData {
    /// Build an object, recording the checksum of `payload`.
    pub fn new(
        name: &str,
        type_tag: u32,
        meta: ObjectMeta,
        payload: Vec<u8>,
        deps: Vec<Dependency>,
    ) -> Self {
        let checksum = payload_checksum(&payload);
        Self {
            name: name.to_owned(),
            type_tag,
            meta,
            payload,
            deps,
            checksum,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> u32 {
        self.type_tag
    }

    pub fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn save(&self, w: &mut ArchiveWriter) -> SerResult<()> {
        w.put_string(&self.name)?;
        w.put_u32(self.type_tag);
        self.meta.save(w);
        w.put_len(self.deps.len());
        for dep in &self.deps {
            dep.save(w)?;
        }
        w.put_len(self.payload.len());
        w.put_bytes(&self.payload);
        w.put_u32(self.checksum);
        Ok(())
    }

    /// Load an object archive, resolving every dependency through `fetcher`.
    ///
    /// The recorded checksum is kept as-is; [`check`](Self::check) compares it.
    pub fn load(r: &mut Cursor<'_>, fetcher: &mut dyn Fetcher) -> Result<LoadedObject> {
        let name = r.read_string()?;
        let type_tag = r.read_u32_le()?;
        let meta = ObjectMeta::load(r)?;

        // Each dependency is at least a kind byte and a string length.
        let count = r.read_len(5)?;
        let mut deps = Vec::with_capacity(count);
        for _ in 0..count {
            deps.push(Dependency::load(r)?);
        }

        let len = r.read_len(1)?;
        let payload = r.read_bytes(len)?.to_vec();
        let checksum = r.read_u32_le()?;

        let mut resolved = Vec::new();
        let mut deferred = 0usize;
        for dep in &deps {
            let fetched = match dep {
                Dependency::Array { name, elem } => fetcher.request_array(name, *elem)?,
                Dependency::Object { name } => fetcher.request_object(name)?,
            };
            match fetched {
                Fetched::Local(handle) => resolved.push(handle),
                Fetched::Deferred => deferred += 1,
            }
        }

        Ok(LoadedObject {
            object: Self {
                name,
                type_tag,
                meta,
                payload,
                deps,
                checksum,
            },
            resolved,
            deferred,
        })
    }

    /// Self-consistency check: payload intact and every dependency present.
    pub fn check(&self, store: &ObjectStore) -> Result<()> {
        if payload_checksum(&self.payload) != self.checksum {
            log::warn!("[object] {} payload checksum mismatch", self.name);
            return Err(Error::CheckFailed(self.name.clone()));
        }
        if let Some(missing) = self.deps.iter().find(|d| !store.contains(d.name())) {
            log::warn!("[object] {} missing dependency {}", self.name, missing.name());
            return Err(Error::CheckFailed(self.name.clone()));
        }
        Ok(())
    }
}
