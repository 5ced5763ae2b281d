// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type shared by every vflow component.
//!
//! Nothing in the bulk-data path is fatal: callers log these errors and keep
//! running. Only `Quit`/`Kill` control messages terminate a module.

use crate::config::ConfigError;
use crate::ser::SerError;

/// Errors returned by vflow operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration file could not be read or parsed, or failed validation.
    Config(ConfigError),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// I/O error with underlying cause.
    IoError(std::io::Error),
    /// The bulk-data service could not be reached.
    ConnectFailed(String),
    /// No bulk-data connection is established.
    NotConnected,
    /// The peer closed the connection.
    ConnectionClosed,
    /// The local control channel was disconnected.
    ChannelClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// A message violated the wire protocol (unexpected response, bad kind).
    Protocol(String),
    /// A `SendObject` payload frame did not match the announced size.
    PayloadMismatch {
        object_id: String,
        array_type: Option<u32>,
        expected: u64,
        received: usize,
    },
    /// Encoded message exceeds the allowed size.
    MessageTooLarge { size: usize, max: usize },
    /// A name exceeds the fixed control-message field width.
    NameTooLong { name: String, max: usize },

    // ========================================================================
    // Data Errors
    // ========================================================================
    /// Encoding or decoding of an archive failed.
    Serialization(SerError),
    /// Element-type tag did not select exactly one codec.
    TypeDispatch { name: String, tag: u32, matches: usize },
    /// Object failed its self-consistency check.
    CheckFailed(String),

    // ========================================================================
    // Store Errors
    // ========================================================================
    /// No object or array with this name exists in the store.
    NotFound(String),
    /// An entry with this name already exists in the store.
    AlreadyExists(String),
    /// A raw reference did not match a live store slot.
    StaleReference,
    /// Port is not declared on this module.
    UnknownPort(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Configuration
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            // Transport
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ConnectFailed(msg) => write!(f, "Connect failed: {}", msg),
            Error::NotConnected => write!(f, "Bulk-data connection not established"),
            Error::ConnectionClosed => write!(f, "Connection closed by peer"),
            Error::ChannelClosed => write!(f, "Control channel closed"),
            // Protocol
            Error::Protocol(msg) => write!(f, "Protocol violation: {}", msg),
            Error::PayloadMismatch {
                object_id,
                expected,
                received,
                ..
            } => write!(
                f,
                "Payload of {} announced {} bytes, received {}",
                object_id, expected, received
            ),
            Error::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max {})", size, max)
            }
            Error::NameTooLong { name, max } => {
                write!(f, "Name too long: {:?} (max {} bytes)", name, max)
            }
            // Data
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::TypeDispatch { name, tag, matches } => write!(
                f,
                "Array {} with type tag {} matched {} codecs (expected exactly 1)",
                name, tag, matches
            ),
            Error::CheckFailed(name) => write!(f, "Object {} failed its consistency check", name),
            // Store
            Error::NotFound(name) => write!(f, "Not found: {}", name),
            Error::AlreadyExists(name) => write!(f, "Already exists: {}", name),
            Error::StaleReference => write!(f, "Stale store reference"),
            Error::UnknownPort(name) => write!(f, "Unknown port: {}", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::Serialization(e) => Some(e),
            Error::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::ConnectionClosed
        } else {
            Error::IoError(e)
        }
    }
}

impl From<SerError> for Error {
    fn from(e: SerError) -> Self {
        Error::Serialization(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

/// Result type for vflow operations.
pub type Result<T> = std::result::Result<T, Error>;
