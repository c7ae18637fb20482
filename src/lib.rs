// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh-to-MQTT Bridging Gateway
//!
//! Bridges a low-power wireless mesh of constrained nodes (6-byte hardware
//! addresses) to an MQTT broker. Mesh nodes emit telemetry to broker topics
//! and receive commands published on those topics by any broker client.
//!
//! # Features
//!
//! - **Subscription Registry**: topic -> ordered subscriber set, the single
//!   source of truth for routing decisions
//! - **Bidirectional Routing**: mesh frames fan out to mesh subscribers and
//!   re-publish to the broker; broker deliveries fan out to mesh subscribers
//! - **Dual Wire Dialects**: structured envelopes with an explicit kind, and
//!   legacy flat telemetry objects treated as implicit publishes
//! - **Single-Mutator Dispatch**: both transports feed one event channel
//!   consumed by a single dispatcher task
//!
//! # Quick Start
//!
//! ```bash
//! # Bridge a local mesh to a local broker
//! meshgate --broker-host 127.0.0.1 --bind 0.0.0.0:5151
//!
//! # Using config file
//! meshgate --config gateway.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! name = "my-gateway"
//! suppress_self_delivery = false
//!
//! [broker]
//! host = "192.168.0.235"
//! port = 1883
//! client_id = "meshgate"
//!
//! [mesh]
//! bind = "0.0.0.0:5151"
//! frame_limit = 250
//!
//! [[mesh.peers]]
//! addr = "AA:BB:CC:DD:EE:01"
//! endpoint = "192.168.0.41:5151"
//! ```

pub mod addr;
pub mod config;
pub mod envelope;
pub mod gateway;
pub mod registry;
pub mod router;
pub mod stats;
pub mod transport;

pub use addr::NodeAddress;
pub use config::{BrokerConfig, GatewayConfig, MeshConfig, PeerConfig};
pub use envelope::{DecodeError, Envelope, EnvelopeKind};
pub use gateway::{Gateway, GatewayError, GatewayEvent, GatewayHandle};
pub use registry::SubscriptionRegistry;
pub use router::GatewayRouter;
pub use stats::{GatewayStats, GatewayStatsSnapshot};
pub use transport::{BrokerLink, MeshSender, TransportError};
