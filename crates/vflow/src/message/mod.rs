// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire messages.
//!
//! - [`ControlMessage`]: fixed-size frames on the local control channel
//! - [`BulkMessage`]: variable-length headers on the bulk-data connection,
//!   optionally followed by a raw payload
//! - [`AddObject`] / [`AddObjectCompleted`]: object handoff descriptors, used
//!   both inside messages and as correlation keys

mod bulk;
mod control;
mod descriptor;

pub use bulk::{BulkMessage, Identity, Route};
pub use control::{ControlBody, ControlMessage, ParamValue};
pub use descriptor::{AddObject, AddObjectCompleted, TransferKey};

/// Size of every encoded control message.
pub const MESSAGE_SIZE: usize = 512;

/// Width of fixed name fields (ports, objects, parameters), terminator included.
pub const NAME_SIZE: usize = 64;

/// Width of fixed path fields (file parameter values), terminator included.
pub const PATH_SIZE: usize = 256;
