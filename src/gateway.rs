// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway assembly and event dispatch.
//!
//! Both transports deliver receive events onto a single mpsc channel; one
//! dispatcher task consumes it and drives the router. The registry is only
//! ever touched from that task — the single-mutator invariant is a
//! correctness requirement, not an optimization.

use crate::addr::NodeAddress;
use crate::config::{ConfigError, GatewayConfig};
use crate::router::GatewayRouter;
use crate::stats::GatewayStats;
use crate::transport::mqtt::MqttBroker;
use crate::transport::udp::UdpMesh;
use crate::transport::TransportError;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Notify};
use tracing::info;

/// Depth of the shared receive-event channel.
const EVENT_QUEUE_DEPTH: usize = 256;

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A receive event from either transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Frame received from the mesh.
    MeshFrame {
        source: NodeAddress,
        endpoint: SocketAddr,
        payload: Vec<u8>,
    },

    /// Delivery from the broker on a subscribed topic.
    BrokerMessage { topic: String, payload: Vec<u8> },
}

/// Handle to a running gateway.
#[derive(Clone)]
pub struct GatewayHandle {
    running: Arc<AtomicBool>,
    stats: Arc<GatewayStats>,
    shutdown: Arc<Notify>,
    done: watch::Receiver<bool>,
}

impl GatewayHandle {
    /// Check if the gateway is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Request the gateway to stop. The dispatcher finishes the envelope it
    /// is processing and exits; await [`stopped`](Self::stopped) to observe
    /// completion.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.shutdown.notify_one();
    }

    /// Wait until the dispatcher has fully stopped.
    pub async fn stopped(&self) {
        let mut done = self.done.clone();
        let _ = done.wait_for(|stopped| *stopped).await;
    }

    /// Shared transition counters.
    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }
}

/// The bridging gateway service.
pub struct Gateway {
    config: GatewayConfig,
}

impl Gateway {
    /// Create a gateway from validated configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Connect both transports and spawn the dispatcher.
    pub async fn run(self) -> Result<GatewayHandle, GatewayError> {
        let (events_tx, mut events_rx) = mpsc::channel::<GatewayEvent>(EVENT_QUEUE_DEPTH);

        let (broker, event_loop) = MqttBroker::connect(&self.config.broker);
        let mesh = UdpMesh::bind(&self.config.mesh).await?;
        let socket = mesh.socket();

        let mut router = GatewayRouter::new(mesh, broker, self.config.suppress_self_delivery);
        let stats = router.stats();
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(MqttBroker::drive(event_loop, events_tx.clone()));
        tokio::spawn(UdpMesh::drive(
            socket,
            self.config.mesh.frame_limit,
            events_tx,
        ));

        let dispatcher_running = Arc::clone(&running);
        let dispatcher_shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = dispatcher_shutdown.notified() => break,
                    event = events_rx.recv() => {
                        let Some(event) = event else { break };
                        match event {
                            GatewayEvent::MeshFrame {
                                source,
                                endpoint,
                                payload,
                            } => {
                                router.mesh_mut().note_peer(source, endpoint);
                                router.on_mesh_frame(source, &payload);
                            }
                            GatewayEvent::BrokerMessage { topic, payload } => {
                                router.on_broker_message(&topic, &payload);
                            }
                        }
                    }
                }
            }
            dispatcher_running.store(false, Ordering::Relaxed);
            let _ = done_tx.send(true);
            info!("gateway dispatcher stopped");
        });

        info!(
            name = %self.config.name,
            broker = %format!("{}:{}", self.config.broker.host, self.config.broker.port),
            mesh = %self.config.mesh.bind,
            "gateway started"
        );

        Ok(GatewayHandle {
            running,
            stats,
            shutdown,
            done: done_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_completes_deterministically() {
        let mut config = GatewayConfig::default();
        config.mesh.bind = "127.0.0.1:0".into();

        let handle = Gateway::new(config)
            .expect("gateway")
            .run()
            .await
            .expect("run");
        assert!(handle.is_running());

        handle.stop();
        tokio::time::timeout(Duration::from_secs(5), handle.stopped())
            .await
            .expect("dispatcher stopped");
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_stopped_observable_from_clone() {
        let mut config = GatewayConfig::default();
        config.mesh.bind = "127.0.0.1:0".into();

        let handle = Gateway::new(config)
            .expect("gateway")
            .run()
            .await
            .expect("run");
        let observer = handle.clone();

        handle.stop();
        tokio::time::timeout(Duration::from_secs(5), observer.stopped())
            .await
            .expect("dispatcher stopped");
        assert!(!observer.is_running());
    }
}
