// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP mesh adapter.
//!
//! Host-side stand-in for the mesh radio. Each datagram carries the 6-byte
//! hardware address of its sender followed by the payload. Peer endpoints
//! are learned from inbound frames, so any node the gateway has heard from
//! is unicast-reachable; static peers can be seeded from configuration.

use crate::addr::{NodeAddress, ADDR_LEN};
use crate::config::MeshConfig;
use crate::gateway::GatewayEvent;
use crate::transport::{MeshSender, TransportError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};

/// ESP-NOW payload ceiling in bytes.
pub const DEFAULT_FRAME_LIMIT: usize = 250;

/// Mesh transport over a UDP socket.
pub struct UdpMesh {
    socket: Arc<UdpSocket>,
    peers: HashMap<NodeAddress, SocketAddr>,
    frame_limit: usize,
    local: NodeAddress,
}

impl UdpMesh {
    /// Bind the mesh socket and seed the peer table from configuration.
    pub async fn bind(config: &MeshConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(config.bind.as_str()).await?;
        info!(bind = %config.bind, "mesh socket bound");

        let peers = config
            .peers
            .iter()
            .map(|p| (p.addr, p.endpoint))
            .collect();

        Ok(Self {
            socket: Arc::new(socket),
            peers,
            frame_limit: config.frame_limit,
            local: config.gateway_addr,
        })
    }

    /// Shared handle to the underlying socket, for the receive loop.
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    /// Record the endpoint a node was last heard from. Inbound frames are
    /// the source of truth for unicast routing.
    pub fn note_peer(&mut self, addr: NodeAddress, endpoint: SocketAddr) {
        self.peers.insert(addr, endpoint);
    }

    /// Number of known peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Receive loop: strips the address prefix off each datagram and
    /// forwards the frame onto the gateway channel. Runs until the channel
    /// closes.
    pub async fn drive(socket: Arc<UdpSocket>, frame_limit: usize, events: Sender<GatewayEvent>) {
        // One extra byte so oversized frames are detectable rather than
        // silently truncated.
        let mut buf = vec![0u8; ADDR_LEN + frame_limit + 1];

        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, endpoint)) => {
                    if len < ADDR_LEN {
                        warn!(%endpoint, len, "runt mesh frame; discarding");
                        continue;
                    }
                    if len - ADDR_LEN > frame_limit {
                        warn!(%endpoint, len, frame_limit, "oversized mesh frame; discarding");
                        continue;
                    }
                    let Some(source) = NodeAddress::from_slice(&buf[..ADDR_LEN]) else {
                        continue;
                    };

                    let event = GatewayEvent::MeshFrame {
                        source,
                        endpoint,
                        payload: buf[ADDR_LEN..len].to_vec(),
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "mesh socket receive error");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
        info!("mesh receive loop terminated");
    }
}

impl MeshSender for UdpMesh {
    fn send(&mut self, dest: NodeAddress, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > self.frame_limit {
            return Err(TransportError::FrameTooLarge {
                len: payload.len(),
                limit: self.frame_limit,
            });
        }
        let endpoint = *self
            .peers
            .get(&dest)
            .ok_or(TransportError::UnknownPeer(dest))?;

        let mut frame = Vec::with_capacity(ADDR_LEN + payload.len());
        frame.extend_from_slice(self.local.as_bytes());
        frame.extend_from_slice(payload);

        self.socket.try_send_to(&frame, endpoint)?;
        Ok(())
    }
}
