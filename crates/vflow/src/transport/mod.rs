// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bulk-data transport.
//!
//! A rank talks to its per-node hub over one TCP stream carrying
//! length-prefixed frames. See [`frame_codec`] for the framing and
//! [`BulkConnection`] for how headers and payloads share the stream.

pub mod byte_stream;
pub mod connection;
pub mod frame_codec;

pub use byte_stream::{BoxedByteStream, ByteStream};
pub use connection::{BulkConnection, ConnectionState, ConnectionStats, FlushResult, Incoming};
pub use frame_codec::{FrameCodec, FRAME_HEADER_SIZE};
