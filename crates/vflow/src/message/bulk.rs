// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bulk-data message headers.
//!
//! Each header is one frame on the bulk connection. A `SendObject` header is
//! always followed by exactly one payload frame of `payload_size` bytes.
//!
//! ```text
//! kind u32 | per-kind fields (ArchiveWriter encoding)
//! ```

use super::AddObject;
use crate::error::{Error, Result};
use crate::ser::{ArchiveWriter, Cursor};

const KIND_IDENTIFY: u32 = 1;
const KIND_REQUEST_OBJECT: u32 = 2;
const KIND_SEND_OBJECT: u32 = 3;
const KIND_PEER_GONE: u32 = 4;

/// Role announced during the `Identify` handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// Sent by the hub: "who are you?"
    Unknown,
    /// A rank's bulk-data endpoint.
    LocalBulkData,
}

impl Identity {
    fn to_wire(self) -> u8 {
        match self {
            Identity::Unknown => 0,
            Identity::LocalBulkData => 1,
        }
    }

    fn from_wire(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Identity::Unknown),
            1 => Ok(Identity::LocalBulkData),
            other => Err(Error::Protocol(format!("invalid identity {}", other))),
        }
    }
}

/// Sender and target coordinates of a routed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub sender_hub: i32,
    pub sender_rank: i32,
    pub target_hub: i32,
    pub target_rank: i32,
}

impl Route {
    pub fn new(sender: (i32, i32), target: (i32, i32)) -> Self {
        Self {
            sender_hub: sender.0,
            sender_rank: sender.1,
            target_hub: target.0,
            target_rank: target.1,
        }
    }

    /// Route for the answer: sender and target swapped.
    pub fn reply(&self) -> Self {
        Self {
            sender_hub: self.target_hub,
            sender_rank: self.target_rank,
            target_hub: self.sender_hub,
            target_rank: self.sender_rank,
        }
    }

    pub fn target(&self) -> (i32, i32) {
        (self.target_hub, self.target_rank)
    }

    pub fn sender(&self) -> (i32, i32) {
        (self.sender_hub, self.sender_rank)
    }

    fn save(&self, w: &mut ArchiveWriter) {
        w.put_i32(self.sender_hub);
        w.put_i32(self.sender_rank);
        w.put_i32(self.target_hub);
        w.put_i32(self.target_rank);
    }

    fn load(r: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            sender_hub: r.read_i32_le()?,
            sender_rank: r.read_i32_le()?,
            target_hub: r.read_i32_le()?,
            target_rank: r.read_i32_le()?,
        })
    }
}

/// Bulk-data message header.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkMessage {
    /// Connection handshake.
    Identify {
        identity: Identity,
        hub: i32,
        rank: i32,
    },
    /// Ask the owner of `object_id` for its bytes.
    ///
    /// `array_type` is the declared element tag for array requests and `None`
    /// for objects. `add` is set when the pull serves a forwarded handoff.
    RequestObject {
        route: Route,
        referrer: String,
        object_id: String,
        array_type: Option<u32>,
        add: Option<AddObject>,
    },
    /// Response header; `payload_size` bytes follow in the next frame.
    SendObject {
        route: Route,
        referrer: String,
        object_id: String,
        array_type: Option<u32>,
        payload_size: u64,
    },
    /// The hub lost its connection to this rank.
    PeerGone { hub: i32, rank: i32 },
}

fn put_array_type(w: &mut ArchiveWriter, array_type: Option<u32>) {
    w.put_bool(array_type.is_some());
    w.put_u32(array_type.unwrap_or(0));
}

fn read_array_type(r: &mut Cursor<'_>) -> Result<Option<u32>> {
    let is_array = r.read_bool()?;
    let tag = r.read_u32_le()?;
    Ok(is_array.then_some(tag))
}

impl BulkMessage {
    /// Route of a routed message; `None` for `Identify` and `PeerGone`.
    pub fn route(&self) -> Option<&Route> {
        match self {
            BulkMessage::RequestObject { route, .. } | BulkMessage::SendObject { route, .. } => {
                Some(route)
            }
            BulkMessage::Identify { .. } | BulkMessage::PeerGone { .. } => None,
        }
    }

    /// Size of the payload frame that follows this header.
    pub fn payload_size(&self) -> Option<u64> {
        match self {
            BulkMessage::SendObject { payload_size, .. } => Some(*payload_size),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            BulkMessage::Identify { .. } => "Identify",
            BulkMessage::RequestObject { .. } => "RequestObject",
            BulkMessage::SendObject { .. } => "SendObject",
            BulkMessage::PeerGone { .. } => "PeerGone",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut w = ArchiveWriter::with_capacity(128);
        match self {
            BulkMessage::Identify {
                identity,
                hub,
                rank,
            } => {
                w.put_u32(KIND_IDENTIFY);
                w.put_u8(identity.to_wire());
                w.put_i32(*hub);
                w.put_i32(*rank);
            }
            BulkMessage::RequestObject {
                route,
                referrer,
                object_id,
                array_type,
                add,
            } => {
                w.put_u32(KIND_REQUEST_OBJECT);
                route.save(&mut w);
                w.put_string(referrer)?;
                w.put_string(object_id)?;
                put_array_type(&mut w, *array_type);
                w.put_bool(add.is_some());
                if let Some(add) = add {
                    add.save(&mut w)?;
                }
            }
            BulkMessage::SendObject {
                route,
                referrer,
                object_id,
                array_type,
                payload_size,
            } => {
                w.put_u32(KIND_SEND_OBJECT);
                route.save(&mut w);
                w.put_string(referrer)?;
                w.put_string(object_id)?;
                put_array_type(&mut w, *array_type);
                w.put_u64(*payload_size);
            }
            BulkMessage::PeerGone { hub, rank } => {
                w.put_u32(KIND_PEER_GONE);
                w.put_i32(*hub);
                w.put_i32(*rank);
            }
        }
        Ok(w.into_inner())
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(frame);
        let msg = match r.read_u32_le()? {
            KIND_IDENTIFY => BulkMessage::Identify {
                identity: Identity::from_wire(r.read_u8()?)?,
                hub: r.read_i32_le()?,
                rank: r.read_i32_le()?,
            },
            KIND_REQUEST_OBJECT => {
                let route = Route::load(&mut r)?;
                let referrer = r.read_string()?;
                let object_id = r.read_string()?;
                let array_type = read_array_type(&mut r)?;
                let add = if r.read_bool()? {
                    Some(AddObject::load(&mut r)?)
                } else {
                    None
                };
                BulkMessage::RequestObject {
                    route,
                    referrer,
                    object_id,
                    array_type,
                    add,
                }
            }
            KIND_SEND_OBJECT => BulkMessage::SendObject {
                route: Route::load(&mut r)?,
                referrer: r.read_string()?,
                object_id: r.read_string()?,
                array_type: read_array_type(&mut r)?,
                payload_size: r.read_u64_le()?,
            },
            KIND_PEER_GONE => BulkMessage::PeerGone {
                hub: r.read_i32_le()?,
                rank: r.read_i32_le()?,
            },
            other => {
                return Err(Error::Protocol(format!("unknown bulk message kind {}", other)));
            }
        };
        if !r.is_eof() {
            return Err(Error::Protocol(format!(
                "{} header has {} trailing bytes",
                msg.kind_name(),
                r.remaining()
            )));
        }
        Ok(msg)
    }
}
