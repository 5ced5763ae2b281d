// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # vflow - distributed dataflow runtime core
//!
//! Pipeline modules run as process groups spread over several nodes. Data
//! flows between them as named, reference-counted objects that live in a
//! per-process [`ObjectStore`]. Handing an object to another module only moves
//! its *identity*; the bytes are pulled on demand by the receiving rank's
//! [`DataManager`], including every array and sub-object the object
//! references.
//!
//! ## Architecture
//!
//! ```text
//!   coordinator                                    per-node hub
//!        |  ControlChannel (512-byte frames)           |  TCP, length-prefixed
//!        v                                             v
//!   +---------+   AddObject   +--------------+   RequestObject / SendObject
//!   | Module  | <-----------  | DataManager  | <-------------------------->  other ranks
//!   +---------+               +--------------+
//!        \                        |   Fetcher (nested dependencies)
//!         \______ ObjectStore ____/
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ObjectStore`] / [`Handle`] | Generation-checked arena; a `Handle` owns one reference |
//! | [`ObjectData`] / [`ArrayData`] | Stored values; objects reference arrays and sub-objects |
//! | [`DataManager`] | Deduplicated bulk requests, serving, in-transit bookkeeping |
//! | [`Module`] | Control-message dispatch loop with ports and parameters |
//! | [`ControlMessage`] / [`BulkMessage`] | Control and bulk wire formats |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vflow::{ArrayType, DataManager, ObjectStore, Request, VflowConfig};
//! use std::time::Duration;
//!
//! fn main() -> vflow::Result<()> {
//!     let config = VflowConfig::from_file("vflow.toml")?;
//!     let store = ObjectStore::new("h0r0");
//!     let mut dm = DataManager::from_config(&config.node, store);
//!     dm.connect(&config.bulk)?;
//!
//!     if let Request::Pending(ticket) = dm.request_array("grid", "coords", ArrayType::F32, 1, 0)? {
//!         while ticket.try_take().is_none() {
//!             dm.dispatch_all()?;
//!             std::thread::sleep(Duration::from_millis(1));
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod array;
pub mod config;
pub mod control;
pub mod datamanager;
pub mod error;
pub mod message;
pub mod module;
pub mod object;
pub mod ser;
pub mod store;
pub mod transport;

pub use array::{ArrayCodecRegistry, ArrayData, ArrayType};
pub use config::{BulkConfig, ConfigError, ControlConfig, NodeConfig, VflowConfig};
pub use control::{ControlChannel, ControlEndpoint};
pub use datamanager::{ClusterEvent, Completion, DataManager, DataManagerStats, FailReason, Request, Ticket};
pub use error::{Error, Result};
pub use message::{
    AddObject, AddObjectCompleted, BulkMessage, ControlBody, ControlMessage, Identity, ParamValue, Route,
};
pub use module::{ComputeModule, Module, ModuleState, Parameters};
pub use object::{Dependency, Fetched, Fetcher, LocalFetcher, ObjectData, ObjectMeta};
pub use store::{Handle, ObjectStore, RawRef};
pub use transport::BulkConnection;
