// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-size control messages.
//!
//! # Frame layout
//!
//! ```text
//! 0       4       8          12      16                          512
//! +-------+-------+----------+-------+---------------------------+
//! | kind  | size  | sender   | rank  | per-kind body, zero tail  |
//! | u32   | u32   | i32      | i32   |                           |
//! +-------+-------+----------+-------+---------------------------+
//! ```
//!
//! All integers are little-endian. `size` is always [`MESSAGE_SIZE`]. An
//! unrecognized `kind` decodes to [`ControlBody::Unknown`] so receivers can
//! log and skip it.

use super::descriptor::{write_fixed_field, write_name};
use super::{AddObject, AddObjectCompleted, MESSAGE_SIZE, NAME_SIZE, PATH_SIZE};
use crate::error::{Error, Result};
use crate::ser::{Cursor, CursorMut};
use crate::store::RawRef;

const HEADER_SIZE: usize = 16;

mod kind {
    pub const PING: u32 = 1;
    pub const PONG: u32 = 2;
    pub const QUIT: u32 = 3;
    pub const KILL: u32 = 4;
    pub const COMPUTE: u32 = 5;
    pub const BUSY: u32 = 6;
    pub const IDLE: u32 = 7;
    pub const MODULE_EXIT: u32 = 8;
    pub const CREATE_INPUT_PORT: u32 = 9;
    pub const CREATE_OUTPUT_PORT: u32 = 10;
    pub const ADD_OBJECT: u32 = 11;
    pub const ADD_OBJECT_COMPLETED: u32 = 12;

    pub const ADD_FILE_PARAMETER: u32 = 20;
    pub const ADD_FLOAT_PARAMETER: u32 = 21;
    pub const ADD_INT_PARAMETER: u32 = 22;
    pub const ADD_VECTOR_PARAMETER: u32 = 23;

    pub const SET_FILE_PARAMETER: u32 = 30;
    pub const SET_FLOAT_PARAMETER: u32 = 31;
    pub const SET_INT_PARAMETER: u32 = 32;
    pub const SET_VECTOR_PARAMETER: u32 = 33;
}

/// Typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    File(String),
    Float(f64),
    Int(i64),
    Vector([f64; 3]),
}

impl ParamValue {
    /// Offset of this value type within the Add/Set kind ranges.
    fn kind_offset(&self) -> u32 {
        match self {
            ParamValue::File(_) => 0,
            ParamValue::Float(_) => 1,
            ParamValue::Int(_) => 2,
            ParamValue::Vector(_) => 3,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::File(_) => "file",
            ParamValue::Float(_) => "float",
            ParamValue::Int(_) => "int",
            ParamValue::Vector(_) => "vector",
        }
    }

    fn write(&self, c: &mut CursorMut<'_>) -> Result<()> {
        match self {
            ParamValue::File(path) => write_fixed_field(c, path, PATH_SIZE),
            ParamValue::Float(v) => Ok(c.write_f64_le(*v)?),
            ParamValue::Int(v) => Ok(c.write_u64_le(*v as u64)?),
            ParamValue::Vector(v) => {
                for x in v {
                    c.write_f64_le(*x)?;
                }
                Ok(())
            }
        }
    }

    fn read(offset: u32, r: &mut Cursor<'_>) -> Result<Self> {
        Ok(match offset {
            0 => ParamValue::File(r.read_fixed_str(PATH_SIZE)?),
            1 => ParamValue::Float(r.read_f64_le()?),
            2 => ParamValue::Int(r.read_u64_le()? as i64),
            _ => ParamValue::Vector([r.read_f64_le()?, r.read_f64_le()?, r.read_f64_le()?]),
        })
    }
}

/// Per-kind body of a control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlBody {
    Ping { ch: u8 },
    Pong { ch: u8, module: i32 },
    Quit,
    /// Terminate the module with this id.
    Kill { module: i32 },
    Compute { module: i32, execution_count: i32 },
    Busy,
    Idle,
    ModuleExit,
    CreateInputPort { name: String },
    CreateOutputPort { name: String },
    /// Object handoff. `handle` is a detached reference owned by the message.
    AddObject { add: AddObject, handle: RawRef },
    AddObjectCompleted(AddObjectCompleted),
    AddParameter { name: String, value: ParamValue },
    SetParameter { module: i32, name: String, value: ParamValue },
    /// Kind not known to this build.
    Unknown { kind: u32 },
}

impl ControlBody {
    fn kind(&self) -> u32 {
        match self {
            ControlBody::Ping { .. } => kind::PING,
            ControlBody::Pong { .. } => kind::PONG,
            ControlBody::Quit => kind::QUIT,
            ControlBody::Kill { .. } => kind::KILL,
            ControlBody::Compute { .. } => kind::COMPUTE,
            ControlBody::Busy => kind::BUSY,
            ControlBody::Idle => kind::IDLE,
            ControlBody::ModuleExit => kind::MODULE_EXIT,
            ControlBody::CreateInputPort { .. } => kind::CREATE_INPUT_PORT,
            ControlBody::CreateOutputPort { .. } => kind::CREATE_OUTPUT_PORT,
            ControlBody::AddObject { .. } => kind::ADD_OBJECT,
            ControlBody::AddObjectCompleted(_) => kind::ADD_OBJECT_COMPLETED,
            ControlBody::AddParameter { value, .. } => kind::ADD_FILE_PARAMETER + value.kind_offset(),
            ControlBody::SetParameter { value, .. } => kind::SET_FILE_PARAMETER + value.kind_offset(),
            ControlBody::Unknown { kind } => *kind,
        }
    }
}

/// One control message: sender header plus body.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    pub sender_id: i32,
    pub rank: i32,
    pub body: ControlBody,
}

impl ControlMessage {
    pub fn new(sender_id: i32, rank: i32, body: ControlBody) -> Self {
        Self {
            sender_id,
            rank,
            body,
        }
    }

    /// Encode into a zero-padded [`MESSAGE_SIZE`] frame.
    pub fn encode(&self) -> Result<[u8; MESSAGE_SIZE]> {
        let mut frame = [0u8; MESSAGE_SIZE];
        let mut c = CursorMut::new(&mut frame);
        c.write_u32_le(self.body.kind())?;
        c.write_u32_le(MESSAGE_SIZE as u32)?;
        c.write_i32_le(self.sender_id)?;
        c.write_i32_le(self.rank)?;

        match &self.body {
            ControlBody::Ping { ch } => c.write_u8(*ch)?,
            ControlBody::Pong { ch, module } => {
                c.write_u8(*ch)?;
                c.write_i32_le(*module)?;
            }
            ControlBody::Kill { module } => c.write_i32_le(*module)?,
            ControlBody::Compute {
                module,
                execution_count,
            } => {
                c.write_i32_le(*module)?;
                c.write_i32_le(*execution_count)?;
            }
            ControlBody::CreateInputPort { name } | ControlBody::CreateOutputPort { name } => {
                write_name(&mut c, name)?;
            }
            ControlBody::AddObject { add, handle } => {
                add.write_fixed(&mut c)?;
                c.write_u64_le(*handle)?;
            }
            ControlBody::AddObjectCompleted(done) => done.write_fixed(&mut c)?,
            ControlBody::AddParameter { name, value } => {
                write_name(&mut c, name)?;
                value.write(&mut c)?;
            }
            ControlBody::SetParameter {
                module,
                name,
                value,
            } => {
                c.write_i32_le(*module)?;
                write_name(&mut c, name)?;
                value.write(&mut c)?;
            }
            ControlBody::Quit
            | ControlBody::Busy
            | ControlBody::Idle
            | ControlBody::ModuleExit
            | ControlBody::Unknown { .. } => {}
        }
        Ok(frame)
    }

    /// Decode a frame produced by [`encode`](Self::encode).
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() != MESSAGE_SIZE {
            return Err(Error::Protocol(format!(
                "control frame of {} bytes, expected {}",
                frame.len(),
                MESSAGE_SIZE
            )));
        }
        let mut r = Cursor::new(frame);
        let kind = r.read_u32_le()?;
        let size = r.read_u32_le()? as usize;
        if size != MESSAGE_SIZE {
            return Err(Error::Protocol(format!(
                "control header declares {} bytes, expected {}",
                size, MESSAGE_SIZE
            )));
        }
        let sender_id = r.read_i32_le()?;
        let rank = r.read_i32_le()?;
        debug_assert_eq!(r.offset(), HEADER_SIZE);

        let body = match kind {
            kind::PING => ControlBody::Ping { ch: r.read_u8()? },
            kind::PONG => ControlBody::Pong {
                ch: r.read_u8()?,
                module: r.read_i32_le()?,
            },
            kind::QUIT => ControlBody::Quit,
            kind::KILL => ControlBody::Kill {
                module: r.read_i32_le()?,
            },
            kind::COMPUTE => ControlBody::Compute {
                module: r.read_i32_le()?,
                execution_count: r.read_i32_le()?,
            },
            kind::BUSY => ControlBody::Busy,
            kind::IDLE => ControlBody::Idle,
            kind::MODULE_EXIT => ControlBody::ModuleExit,
            kind::CREATE_INPUT_PORT => ControlBody::CreateInputPort {
                name: r.read_fixed_str(NAME_SIZE)?,
            },
            kind::CREATE_OUTPUT_PORT => ControlBody::CreateOutputPort {
                name: r.read_fixed_str(NAME_SIZE)?,
            },
            kind::ADD_OBJECT => ControlBody::AddObject {
                add: AddObject::read_fixed(&mut r)?,
                handle: r.read_u64_le()?,
            },
            kind::ADD_OBJECT_COMPLETED => {
                ControlBody::AddObjectCompleted(AddObjectCompleted::read_fixed(&mut r)?)
            }
            k @ kind::ADD_FILE_PARAMETER..=kind::ADD_VECTOR_PARAMETER => {
                let name = r.read_fixed_str(NAME_SIZE)?;
                let value = ParamValue::read(k - kind::ADD_FILE_PARAMETER, &mut r)?;
                ControlBody::AddParameter { name, value }
            }
            k @ kind::SET_FILE_PARAMETER..=kind::SET_VECTOR_PARAMETER => {
                let module = r.read_i32_le()?;
                let name = r.read_fixed_str(NAME_SIZE)?;
                let value = ParamValue::read(k - kind::SET_FILE_PARAMETER, &mut r)?;
                ControlBody::SetParameter {
                    module,
                    name,
                    value,
                }
            }
            other => ControlBody::Unknown { kind: other },
        };

        Ok(Self {
            sender_id,
            rank,
            body,
        })
    }
}
