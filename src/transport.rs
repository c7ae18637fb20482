// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport adapter contracts.
//!
//! The router is generic over both transports and never sees connection
//! state. All outbound operations are synchronous and non-blocking:
//! fire-and-forget from the router's perspective. Failures are reported
//! back, logged, and never retried by the router.

pub mod mqtt;
pub mod udp;

use crate::addr::NodeAddress;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No known endpoint for a mesh destination.
    #[error("unknown mesh peer {0}")]
    UnknownPeer(NodeAddress),

    /// Payload exceeds the mesh frame ceiling.
    #[error("frame of {len} bytes exceeds {limit}-byte ceiling")]
    FrameTooLarge { len: usize, limit: usize },

    /// Broker client rejected the request.
    #[error("broker link error: {0}")]
    Broker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Unicast send half of the mesh transport.
pub trait MeshSender {
    /// Send a payload to a single mesh node. Best effort; the caller logs
    /// failures and moves on.
    fn send(&mut self, dest: NodeAddress, payload: &[u8]) -> Result<(), TransportError>;
}

/// Outbound broker operations. All idempotent at the broker, so repeating
/// a subscribe or unsubscribe is always safe.
pub trait BrokerLink {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;
    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;
}
