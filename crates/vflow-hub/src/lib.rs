// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-node bulk-data hub for vflow.
//!
//! Ranks of the node connect once, identify with their `(hub, rank)` address
//! and from then on exchange `RequestObject` / `SendObject` units through the
//! hub. The hub never inspects payloads; it routes by header and reports lost
//! ranks with `PeerGone`.

pub mod config;
pub mod server;

pub use config::{ConfigError, HubConfig};
pub use server::{BulkHub, HubError, RelayStats};
