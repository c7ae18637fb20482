// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway configuration.
//!
//! Supports both programmatic and file-based (TOML) configuration.

use crate::addr::NodeAddress;
use crate::transport::udp::DEFAULT_FRAME_LIMIT;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
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

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway name (for identification).
    #[serde(default = "default_gateway_name")]
    pub name: String,

    /// Broker connection settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Mesh transport settings.
    #[serde(default)]
    pub mesh: MeshConfig,

    /// Exclude a publishing node from delivery of its own message, both in
    /// the local fan-out and when the broker echoes it back. Off by
    /// default: the observed system delivers the echo.
    #[serde(default)]
    pub suppress_self_delivery: bool,

    /// Statistics reporting interval (seconds, 0 to disable).
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_gateway_name() -> String {
    "meshgate".to_string()
}

fn default_stats_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: default_gateway_name(),
            broker: BrokerConfig::default(),
            mesh: MeshConfig::default(),
            suppress_self_delivery: false,
            stats_interval_secs: default_stats_interval(),
            log_level: default_log_level(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("Gateway name is empty".into()));
        }
        if self.broker.host.is_empty() {
            return Err(ConfigError::Invalid("Broker host is empty".into()));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::Invalid("Broker port is 0".into()));
        }
        if self.broker.client_id.is_empty() {
            return Err(ConfigError::Invalid("Broker client_id is empty".into()));
        }
        if self.mesh.frame_limit == 0 || self.mesh.frame_limit > 1024 {
            return Err(ConfigError::Invalid(format!(
                "Mesh frame_limit {} outside 1..=1024",
                self.mesh.frame_limit
            )));
        }
        if self.mesh.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "Mesh bind address '{}' is not a socket address",
                self.mesh.bind
            )));
        }

        for (i, peer) in self.mesh.peers.iter().enumerate() {
            let dup = self.mesh.peers[..i].iter().any(|p| p.addr == peer.addr);
            if dup {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate static peer {}",
                    peer.addr
                )));
            }
        }

        Ok(())
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker hostname or IP.
    #[serde(default = "default_broker_host")]
    pub host: String,

    /// Broker port.
    #[serde(default = "default_broker_port")]
    pub port: u16,

    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive interval (seconds).
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_broker_host() -> String {
    "127.0.0.1".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "meshgate".to_string()
}

fn default_keep_alive() -> u64 {
    10
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

/// Mesh transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// UDP bind address for the mesh socket.
    #[serde(default = "default_mesh_bind")]
    pub bind: String,

    /// Frame payload ceiling in bytes.
    #[serde(default = "default_frame_limit")]
    pub frame_limit: usize,

    /// Hardware address the gateway announces on outbound frames.
    #[serde(default = "default_gateway_addr")]
    pub gateway_addr: NodeAddress,

    /// Statically seeded peers. Peers are otherwise learned from inbound
    /// frames.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

fn default_mesh_bind() -> String {
    "0.0.0.0:5151".to_string()
}

fn default_frame_limit() -> usize {
    DEFAULT_FRAME_LIMIT
}

fn default_gateway_addr() -> NodeAddress {
    // Locally administered address.
    NodeAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01])
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            bind: default_mesh_bind(),
            frame_limit: default_frame_limit(),
            gateway_addr: default_gateway_addr(),
            peers: Vec::new(),
        }
    }
}

/// A statically configured mesh peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Hardware address of the node.
    pub addr: NodeAddress,

    /// UDP endpoint the node listens on.
    pub endpoint: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        GatewayConfig::default().validate().expect("valid");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = GatewayConfig::default();
        config.broker.host.clear();
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.mesh.frame_limit = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.mesh.frame_limit = 4096;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.mesh.bind = "not-an-address".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_duplicate_peers() {
        let mut config = GatewayConfig::default();
        let addr: NodeAddress = "AA:BB:CC:DD:EE:01".parse().expect("addr");
        config.mesh.peers = vec![
            PeerConfig {
                addr,
                endpoint: "192.168.0.41:5151".parse().expect("endpoint"),
            },
            PeerConfig {
                addr,
                endpoint: "192.168.0.42:5151".parse().expect("endpoint"),
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"
name = "bench-gateway"
suppress_self_delivery = true

[broker]
host = "192.168.0.235"
port = 1883
client_id = "bench"

[mesh]
bind = "0.0.0.0:6000"
frame_limit = 200

[[mesh.peers]]
addr = "AA:BB:CC:DD:EE:01"
endpoint = "192.168.0.41:5151"
"#
        )
        .expect("write");

        let config = GatewayConfig::from_file(file.path()).expect("load");
        assert_eq!(config.name, "bench-gateway");
        assert!(config.suppress_self_delivery);
        assert_eq!(config.broker.host, "192.168.0.235");
        assert_eq!(config.mesh.frame_limit, 200);
        assert_eq!(config.mesh.peers.len(), 1);
        assert_eq!(config.mesh.peers[0].addr.to_string(), "AA:BB:CC:DD:EE:01");
        // Unspecified fields keep their defaults.
        assert_eq!(config.stats_interval_secs, 10);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "[broker]\nhost = \"\"\n").expect("write");
        assert!(matches!(
            GatewayConfig::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = GatewayConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        assert!(toml_str.contains("frame_limit = 250"));
        let back: GatewayConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(back.mesh.gateway_addr, config.mesh.gateway_addr);
    }
}
