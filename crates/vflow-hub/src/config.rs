// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bulk-data hub configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Hub configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Address to bind to (default: 127.0.0.1, ranks are node-local)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on (default: 31094)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Id of the node this hub serves
    #[serde(default)]
    pub hub_id: i32,

    /// Largest accepted frame (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Messages buffered per rank before relaying blocks
    #[serde(default = "default_outbound_queue_depth")]
    pub outbound_queue_depth: usize,

    /// Time a new connection has to identify itself (seconds)
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    31094
}

fn default_max_message_size() -> usize {
    256 * 1024 * 1024 // 256 MB
}

fn default_outbound_queue_depth() -> usize {
    64
}

fn default_handshake_timeout() -> u64 {
    5
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            hub_id: 0,
            max_message_size: default_max_message_size(),
            outbound_queue_depth: default_outbound_queue_depth(),
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }
}

impl HubConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port cannot be 0".into()));
        }
        if self.hub_id < 0 {
            return Err(ConfigError::Invalid(format!(
                "hub_id must be non-negative, got {}",
                self.hub_id
            )));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid("max_message_size cannot be 0".into()));
        }
        if self.outbound_queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "outbound_queue_depth cannot be 0".into(),
            ));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "handshake_timeout_secs cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.port, 31094);
        assert_eq!(config.hub_id, 0);
        assert!(config.bind_address.is_loopback());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 32000\nhub_id = 2").unwrap();

        let config = HubConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 32000);
        assert_eq!(config.hub_id, 2);
        assert_eq!(config.outbound_queue_depth, 64);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "outbound_queue_depth = 0").unwrap();
        assert!(matches!(
            HubConfig::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a port\"").unwrap();
        assert!(matches!(
            HubConfig::from_file(file.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_validation() {
        let config = HubConfig {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HubConfig {
            hub_id: -3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            HubConfig::from_file("/nonexistent/hub.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
