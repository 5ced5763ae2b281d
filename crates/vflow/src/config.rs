// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime configuration for one rank.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! usable single-rank configuration.
//!
//! ```toml
//! [node]
//! hub = 0
//! rank = 1
//! size = 4
//!
//! [bulk]
//! endpoint = "127.0.0.1:31094"
//! connect_timeout_ms = 2000
//!
//! [control]
//! queue_depth = 64
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete configuration of a rank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VflowConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

/// Placement of this rank within the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hub (node) id this rank belongs to
    #[serde(default)]
    pub hub: i32,

    /// Rank within the process group
    #[serde(default)]
    pub rank: i32,

    /// Size of the process group
    #[serde(default = "default_size")]
    pub size: i32,
}

/// Bulk-data connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Address of the per-node bulk-data hub
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Maximum size of one bulk frame (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Set TCP_NODELAY on the bulk socket
    #[serde(default = "default_true")]
    pub nodelay: bool,

    /// Enable TCP keepalive on the bulk socket
    #[serde(default = "default_true")]
    pub keepalive: bool,
}

/// Local control channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Capacity of each direction of the control channel (messages)
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_size() -> i32 {
    1
}

fn default_endpoint() -> String {
    "127.0.0.1:31094".to_string()
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_max_message_size() -> usize {
    256 * 1024 * 1024 // 256 MB
}

fn default_true() -> bool {
    true
}

fn default_queue_depth() -> usize {
    64
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            hub: 0,
            rank: 0,
            size: default_size(),
        }
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: default_connect_timeout(),
            max_message_size: default_max_message_size(),
            nodelay: true,
            keepalive: true,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}

impl BulkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl VflowConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.size <= 0 {
            return Err(ConfigError::InvalidValue("node.size must be positive".into()));
        }
        if self.node.rank < 0 || self.node.rank >= self.node.size {
            return Err(ConfigError::InvalidValue(format!(
                "node.rank {} outside process group of size {}",
                self.node.rank, self.node.size
            )));
        }
        if self.bulk.endpoint.is_empty() {
            return Err(ConfigError::InvalidValue("bulk.endpoint cannot be empty".into()));
        }
        if self.bulk.max_message_size == 0 {
            return Err(ConfigError::InvalidValue(
                "bulk.max_message_size cannot be 0".into(),
            ));
        }
        if self.control.queue_depth == 0 {
            return Err(ConfigError::InvalidValue(
                "control.queue_depth cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = VflowConfig::default();
        assert_eq!(config.node.size, 1);
        assert_eq!(config.control.queue_depth, 64);
        assert!(config.bulk.nodelay);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = VflowConfig::from_toml("").unwrap();
        assert_eq!(config, VflowConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = VflowConfig::from_toml(
            r#"
            [node]
            hub = 3
            rank = 2
            size = 4

            [bulk]
            connect_timeout_ms = 500
            keepalive = false
            "#,
        )
        .unwrap();
        assert_eq!(config.node.hub, 3);
        assert_eq!(config.node.rank, 2);
        assert_eq!(config.bulk.connect_timeout(), Duration::from_millis(500));
        assert!(!config.bulk.keepalive);
        assert!(config.bulk.nodelay);
    }

    #[test]
    fn test_validation_rank_outside_group() {
        let config = VflowConfig {
            node: NodeConfig {
                hub: 0,
                rank: 4,
                size: 4,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_validation_zero_queue_depth() {
        let mut config = VflowConfig::default();
        config.control.queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            VflowConfig::from_toml("[node\nrank = "),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[control]\nqueue_depth = 8").unwrap();
        let config = VflowConfig::from_file(file.path()).unwrap();
        assert_eq!(config.control.queue_depth, 8);

        assert!(matches!(
            VflowConfig::from_file("/nonexistent/vflow.toml"),
            Err(ConfigError::IoError(_))
        ));
    }
}
