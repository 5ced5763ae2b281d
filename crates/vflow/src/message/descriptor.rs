// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object handoff descriptors.

use super::NAME_SIZE;
use crate::error::{Error, Result};
use crate::ser::{ArchiveWriter, Cursor, CursorMut, SerResult};
use std::hash::{Hash, Hasher};

/// Identity of one logical transfer: same sender, same object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub sender_id: i32,
    pub object_name: String,
}

/// Handoff of an object from an output port to an input port.
///
/// Carries the object's identity, never its bytes. Equality and hashing only
/// consider the sender id and the object name, so the descriptor doubles as
/// a correlation key.
#[derive(Debug, Clone)]
pub struct AddObject {
    pub sender_id: i32,
    pub sender_hub: i32,
    pub sender_rank: i32,
    pub sender_port: String,
    pub object_name: String,
    pub object_type: u32,
    pub dest_id: i32,
    pub dest_rank: i32,
    pub dest_port: String,
}

impl AddObject {
    pub fn key(&self) -> TransferKey {
        TransferKey {
            sender_id: self.sender_id,
            object_name: self.object_name.clone(),
        }
    }

    /// Acknowledgement to send back to the original sender.
    pub fn completed(&self) -> AddObjectCompleted {
        AddObjectCompleted {
            original_sender_id: self.sender_id,
            object_name: self.object_name.clone(),
            dest_id: self.dest_id,
        }
    }

    pub(crate) fn save(&self, w: &mut ArchiveWriter) -> SerResult<()> {
        w.put_i32(self.sender_id);
        w.put_i32(self.sender_hub);
        w.put_i32(self.sender_rank);
        w.put_string(&self.sender_port)?;
        w.put_string(&self.object_name)?;
        w.put_u32(self.object_type);
        w.put_i32(self.dest_id);
        w.put_i32(self.dest_rank);
        w.put_string(&self.dest_port)
    }

    pub(crate) fn load(r: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            sender_id: r.read_i32_le()?,
            sender_hub: r.read_i32_le()?,
            sender_rank: r.read_i32_le()?,
            sender_port: r.read_string()?,
            object_name: r.read_string()?,
            object_type: r.read_u32_le()?,
            dest_id: r.read_i32_le()?,
            dest_rank: r.read_i32_le()?,
            dest_port: r.read_string()?,
        })
    }

    pub(crate) fn write_fixed(&self, c: &mut CursorMut<'_>) -> Result<()> {
        c.write_i32_le(self.sender_id)?;
        c.write_i32_le(self.sender_hub)?;
        c.write_i32_le(self.sender_rank)?;
        write_name(c, &self.sender_port)?;
        write_name(c, &self.object_name)?;
        c.write_u32_le(self.object_type)?;
        c.write_i32_le(self.dest_id)?;
        c.write_i32_le(self.dest_rank)?;
        write_name(c, &self.dest_port)?;
        Ok(())
    }

    pub(crate) fn read_fixed(r: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            sender_id: r.read_i32_le()?,
            sender_hub: r.read_i32_le()?,
            sender_rank: r.read_i32_le()?,
            sender_port: r.read_fixed_str(NAME_SIZE)?,
            object_name: r.read_fixed_str(NAME_SIZE)?,
            object_type: r.read_u32_le()?,
            dest_id: r.read_i32_le()?,
            dest_rank: r.read_i32_le()?,
            dest_port: r.read_fixed_str(NAME_SIZE)?,
        })
    }
}

impl PartialEq for AddObject {
    fn eq(&self, other: &Self) -> bool {
        self.sender_id == other.sender_id && self.object_name == other.object_name
    }
}

impl Eq for AddObject {}

impl Hash for AddObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sender_id.hash(state);
        self.object_name.hash(state);
    }
}

/// Acknowledgement that a forwarded object has been fully received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddObjectCompleted {
    pub original_sender_id: i32,
    pub object_name: String,
    pub dest_id: i32,
}

impl AddObjectCompleted {
    /// Key of the transfer this acknowledges.
    pub fn key(&self) -> TransferKey {
        TransferKey {
            sender_id: self.original_sender_id,
            object_name: self.object_name.clone(),
        }
    }

    pub(crate) fn write_fixed(&self, c: &mut CursorMut<'_>) -> Result<()> {
        c.write_i32_le(self.original_sender_id)?;
        write_name(c, &self.object_name)?;
        c.write_i32_le(self.dest_id)?;
        Ok(())
    }

    pub(crate) fn read_fixed(r: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            original_sender_id: r.read_i32_le()?,
            object_name: r.read_fixed_str(NAME_SIZE)?,
            dest_id: r.read_i32_le()?,
        })
    }
}

/// Write a name into a fixed [`NAME_SIZE`] field.
pub(crate) fn write_name(c: &mut CursorMut<'_>, name: &str) -> Result<()> {
    write_fixed_field(c, name, NAME_SIZE)
}

pub(crate) fn write_fixed_field(c: &mut CursorMut<'_>, text: &str, width: usize) -> Result<()> {
    if text.len() >= width {
        return Err(Error::NameTooLong {
            name: text.to_owned(),
            max: width - 1,
        });
    }
    c.write_fixed_str(text, width)?;
    Ok(())
}
