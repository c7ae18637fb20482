// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core routing dispatcher.
//!
//! Consumes decoded envelopes from both transports, mutates the
//! subscription registry, and issues outbound sends. The router exclusively
//! owns the registry; all handlers run to completion on the single
//! dispatcher task, so no locking is needed.

use crate::addr::NodeAddress;
use crate::envelope::{self, DecodeError, EnvelopeKind};
use crate::registry::SubscriptionRegistry;
use crate::stats::GatewayStats;
use crate::transport::{BrokerLink, MeshSender};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How many in-flight publishes the echo tracker remembers when
/// self-delivery suppression is enabled.
const ECHO_WINDOW: usize = 32;

/// A broker publish awaiting its echo, with the mesh node that originated
/// it.
struct PendingEcho {
    topic: String,
    payload: Vec<u8>,
    origin: NodeAddress,
}

/// Bidirectional routing dispatcher.
///
/// Generic over the mesh send half and the broker link so tests can drive
/// it with recording fakes.
pub struct GatewayRouter<M, B> {
    registry: SubscriptionRegistry,
    mesh: M,
    broker: B,
    stats: Arc<GatewayStats>,
    suppress_self_delivery: bool,
    pending_echoes: VecDeque<PendingEcho>,
}

impl<M: MeshSender, B: BrokerLink> GatewayRouter<M, B> {
    pub fn new(mesh: M, broker: B, suppress_self_delivery: bool) -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            mesh,
            broker,
            stats: Arc::new(GatewayStats::new()),
            suppress_self_delivery,
            pending_echoes: VecDeque::new(),
        }
    }

    /// Shared handle to the transition counters.
    pub fn stats(&self) -> Arc<GatewayStats> {
        Arc::clone(&self.stats)
    }

    /// Read-only view of the registry, for introspection and tests.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    /// Mutable access to the mesh send half, used by the dispatcher to
    /// record learned peer endpoints.
    pub fn mesh_mut(&mut self) -> &mut M {
        &mut self.mesh
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Mesh-receive path: decode one frame and dispatch on its kind.
    ///
    /// Malformed frames and frames without a usable topic are dropped here;
    /// neither mutates the registry or triggers a send.
    pub fn on_mesh_frame(&mut self, source: NodeAddress, payload: &[u8]) {
        let env = match envelope::decode(payload) {
            Ok(env) => env,
            Err(DecodeError::MalformedPayload(reason)) => {
                self.stats.dropped_malformed.fetch_add(1, Ordering::Relaxed);
                warn!(node = %source, %reason, "dropping malformed mesh frame");
                return;
            }
            Err(DecodeError::MissingTopic) => {
                self.stats
                    .dropped_missing_topic
                    .fetch_add(1, Ordering::Relaxed);
                warn!(node = %source, "dropping mesh frame without usable topic");
                return;
            }
        };

        match env.kind {
            EnvelopeKind::Subscribe => self.handle_subscribe(&env.topic, source),
            EnvelopeKind::Unsubscribe => self.handle_unsubscribe(&env.topic, source),
            EnvelopeKind::Publish => self.handle_publish(&env.topic, source, payload),
        }
    }

    /// Broker-receive path: forward a delivery verbatim to every mesh
    /// subscriber of the topic.
    ///
    /// An empty subscriber set is logged and discarded without touching the
    /// broker subscription; only an explicit mesh unsubscribe prunes
    /// broker-side state.
    pub fn on_broker_message(&mut self, topic: &str, payload: &[u8]) {
        let skip = if self.suppress_self_delivery {
            self.take_echo(topic, payload)
        } else {
            None
        };

        let subscribers = self.registry.clients_for(topic);
        if subscribers.is_empty() {
            self.stats
                .dropped_no_subscribers
                .fetch_add(1, Ordering::Relaxed);
            debug!(%topic, "broker delivery with no mesh subscribers; discarding");
            return;
        }

        for dest in subscribers {
            if Some(dest) == skip {
                debug!(%topic, node = %dest, "suppressing self-delivery echo");
                continue;
            }
            self.mesh_send(topic, dest, payload);
        }
        self.stats
            .broker_messages_forwarded
            .fetch_add(1, Ordering::Relaxed);
    }

    fn handle_subscribe(&mut self, topic: &str, source: NodeAddress) {
        if self.registry.subscribe(topic, source) {
            self.stats
                .subscriptions_accepted
                .fetch_add(1, Ordering::Relaxed);
            info!(%topic, node = %source, "subscription accepted");
        } else {
            debug!(%topic, node = %source, "duplicate subscribe ignored");
        }
        debug!(
            %topic,
            subscribers = %self.registry.subscriber_list(topic),
            "topic subscribers"
        );

        // The broker-side subscribe is idempotent, so issue it
        // unconditionally rather than tracking whether it is newly needed.
        match self.broker.subscribe(topic) {
            Ok(()) => {
                self.stats.broker_subscribes.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!(%topic, %err, "broker subscribe failed");
            }
        }
    }

    fn handle_unsubscribe(&mut self, topic: &str, source: NodeAddress) {
        let remaining = self.registry.unsubscribe(topic, source);
        self.stats
            .unsubscribes_processed
            .fetch_add(1, Ordering::Relaxed);
        info!(%topic, node = %source, remaining, "unsubscribe processed");
        debug!(
            %topic,
            subscribers = %self.registry.subscriber_list(topic),
            "topic subscribers"
        );

        if remaining == 0 {
            match self.broker.unsubscribe(topic) {
                Ok(()) => {
                    self.stats
                        .broker_unsubscribes
                        .fetch_add(1, Ordering::Relaxed);
                    info!(%topic, "last subscriber removed; broker unsubscribe issued");
                }
                Err(err) => {
                    self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(%topic, %err, "broker unsubscribe failed");
                }
            }
        }
    }

    fn handle_publish(&mut self, topic: &str, origin: NodeAddress, raw: &[u8]) {
        self.stats.publishes_routed.fetch_add(1, Ordering::Relaxed);

        if self.suppress_self_delivery {
            self.remember_echo(topic, raw, origin);
        }

        // Fan the raw frame out to local subscribers, one frame each, in
        // insertion order. An empty subscriber set is not an error.
        let subscribers = self.registry.clients_for(topic);
        for dest in &subscribers {
            if self.suppress_self_delivery && *dest == origin {
                continue;
            }
            self.mesh_send(topic, *dest, raw);
        }

        // The broker publish proceeds regardless of local subscribers.
        match self.broker.publish(topic, raw) {
            Ok(()) => {
                self.stats.broker_publishes.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!(%topic, %err, "broker publish failed");
            }
        }

        debug!(
            %topic,
            node = %origin,
            subscribers = subscribers.len(),
            "publish routed"
        );
    }

    /// Best-effort unicast; a failed destination never aborts the fan-out
    /// to the remaining subscribers.
    fn mesh_send(&mut self, topic: &str, dest: NodeAddress, payload: &[u8]) {
        match self.mesh.send(dest, payload) {
            Ok(()) => {
                self.stats.mesh_frames_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!(%topic, node = %dest, %err, "mesh send failed");
            }
        }
    }

    fn remember_echo(&mut self, topic: &str, payload: &[u8], origin: NodeAddress) {
        if self.pending_echoes.len() == ECHO_WINDOW {
            self.pending_echoes.pop_front();
        }
        self.pending_echoes.push_back(PendingEcho {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            origin,
        });
    }

    /// Match a broker delivery against the pending-echo window. On a hit,
    /// the entry is consumed and its origin excluded from that fan-out.
    fn take_echo(&mut self, topic: &str, payload: &[u8]) -> Option<NodeAddress> {
        let pos = self
            .pending_echoes
            .iter()
            .position(|e| e.topic == topic && e.payload == payload)?;
        self.pending_echoes.remove(pos).map(|e| e.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    #[derive(Default)]
    struct MockMesh {
        sent: Vec<(NodeAddress, Vec<u8>)>,
        fail_for: Option<NodeAddress>,
    }

    impl MeshSender for MockMesh {
        fn send(&mut self, dest: NodeAddress, payload: &[u8]) -> Result<(), TransportError> {
            if self.fail_for == Some(dest) {
                return Err(TransportError::UnknownPeer(dest));
            }
            self.sent.push((dest, payload.to_vec()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockBroker {
        subscribes: Vec<String>,
        unsubscribes: Vec<String>,
        publishes: Vec<(String, Vec<u8>)>,
    }

    impl BrokerLink for MockBroker {
        fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
            self.subscribes.push(topic.to_string());
            Ok(())
        }

        fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
            self.unsubscribes.push(topic.to_string());
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
            self.publishes.push((topic.to_string(), payload.to_vec()));
            Ok(())
        }
    }

    fn addr(last: u8) -> NodeAddress {
        NodeAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
    }

    fn router() -> GatewayRouter<MockMesh, MockBroker> {
        GatewayRouter::new(MockMesh::default(), MockBroker::default(), false)
    }

    #[test]
    fn test_subscribe_registers_and_forwards_to_broker() {
        let mut r = router();
        r.on_mesh_frame(addr(1), br#"{"type":"subscribe","topic":"led/control"}"#);

        assert_eq!(r.registry().clients_for("led/control"), vec![addr(1)]);
        assert_eq!(r.broker().subscribes, vec!["led/control"]);
        assert_eq!(r.stats().snapshot().subscriptions_accepted, 1);
    }

    #[test]
    fn test_subscribe_idempotent_repeats_broker_subscribe() {
        let mut r = router();
        for _ in 0..3 {
            r.on_mesh_frame(addr(1), br#"{"type":"subscribe","topic":"led/control"}"#);
        }

        assert_eq!(r.registry().clients_for("led/control"), vec![addr(1)]);
        assert_eq!(r.stats().snapshot().subscriptions_accepted, 1);
        // Broker-side subscribe is idempotent and issued each time.
        assert_eq!(r.broker().subscribes.len(), 3);
    }

    #[test]
    fn test_round_trip_led_control() {
        let mut r = router();
        r.on_mesh_frame(addr(1), br#"{"type":"subscribe","topic":"led/control"}"#);
        assert_eq!(r.registry().clients_for("led/control"), vec![addr(1)]);

        r.on_broker_message("led/control", b"red/on");
        assert_eq!(r.mesh().sent, vec![(addr(1), b"red/on".to_vec())]);
    }

    #[test]
    fn test_unsubscribe_last_triggers_broker_unsubscribe() {
        let mut r = router();
        r.on_mesh_frame(addr(1), br#"{"type":"subscribe","topic":"led/control"}"#);
        r.on_mesh_frame(addr(1), br#"{"type":"unsubscribe","topic":"led/control"}"#);

        assert!(r.registry().clients_for("led/control").is_empty());
        assert_eq!(r.broker().unsubscribes, vec!["led/control"]);
        assert_eq!(r.stats().snapshot().broker_unsubscribes, 1);
    }

    #[test]
    fn test_unsubscribe_non_last_keeps_broker_subscription() {
        let mut r = router();
        r.on_mesh_frame(addr(1), br#"{"type":"subscribe","topic":"t"}"#);
        r.on_mesh_frame(addr(2), br#"{"type":"subscribe","topic":"t"}"#);
        r.on_mesh_frame(addr(1), br#"{"type":"unsubscribe","topic":"t"}"#);

        assert_eq!(r.registry().clients_for("t"), vec![addr(2)]);
        assert!(r.broker().unsubscribes.is_empty());
    }

    #[test]
    fn test_publish_fans_out_and_republishes() {
        let mut r = router();
        r.on_mesh_frame(addr(1), br#"{"type":"subscribe","topic":"led/control"}"#);
        r.on_mesh_frame(addr(2), br#"{"type":"subscribe","topic":"led/control"}"#);

        let frame = br#"{"type":"publish","topic":"led/control","body":"red/on"}"#;
        r.on_mesh_frame(addr(3), frame);

        // Raw frame bytes fan out in insertion order.
        assert_eq!(
            r.mesh().sent,
            vec![(addr(1), frame.to_vec()), (addr(2), frame.to_vec())]
        );
        assert_eq!(
            r.broker().publishes,
            vec![("led/control".to_string(), frame.to_vec())]
        );
    }

    #[test]
    fn test_publish_without_subscribers_still_reaches_broker() {
        let mut r = router();
        let frame = br#"{"topic":"esp32/dht22","temperature_c":23.5,"humidity":44.1}"#;
        r.on_mesh_frame(addr(1), frame);

        assert!(r.mesh().sent.is_empty());
        assert_eq!(
            r.broker().publishes,
            vec![("esp32/dht22".to_string(), frame.to_vec())]
        );

        let snapshot = r.stats().snapshot();
        assert_eq!(snapshot.broker_publishes, 1);
        assert_eq!(snapshot.dropped_total(), 0);
    }

    #[test]
    fn test_malformed_frame_dropped_without_side_effects() {
        let mut r = router();
        r.on_mesh_frame(addr(1), br#"{"type":"subscribe","topic":"led"#);

        assert!(r.registry().clients_for("led").is_empty());
        assert!(r.broker().subscribes.is_empty());
        assert!(r.mesh().sent.is_empty());
        assert_eq!(r.stats().snapshot().dropped_malformed, 1);
    }

    #[test]
    fn test_missing_topic_dropped_without_side_effects() {
        let mut r = router();
        r.on_mesh_frame(addr(1), br#"{"type":"publish","body":"red/on"}"#);

        assert!(r.broker().publishes.is_empty());
        assert_eq!(r.stats().snapshot().dropped_missing_topic, 1);
    }

    #[test]
    fn test_broker_delivery_without_subscribers_discarded() {
        let mut r = router();
        r.on_broker_message("led/control", b"red/on");

        assert!(r.mesh().sent.is_empty());
        assert!(r.broker().unsubscribes.is_empty());
        assert_eq!(r.stats().snapshot().dropped_no_subscribers, 1);
    }

    #[test]
    fn test_send_failure_does_not_abort_fanout() {
        let mut r = router();
        r.mesh_mut().fail_for = Some(addr(1));
        r.on_mesh_frame(addr(1), br#"{"type":"subscribe","topic":"t"}"#);
        r.on_mesh_frame(addr(2), br#"{"type":"subscribe","topic":"t"}"#);

        r.on_broker_message("t", b"payload");

        // addr(1) failed; addr(2) still got its frame.
        assert_eq!(r.mesh().sent, vec![(addr(2), b"payload".to_vec())]);
        assert_eq!(r.stats().snapshot().send_errors, 1);
    }

    #[test]
    fn test_self_delivery_preserved_by_default() {
        let mut r = router();
        let frame = br#"{"type":"publish","topic":"t","body":"x"}"#;
        r.on_mesh_frame(addr(1), br#"{"type":"subscribe","topic":"t"}"#);
        r.on_mesh_frame(addr(1), frame);

        // Local fan-out includes the publisher...
        assert_eq!(r.mesh().sent, vec![(addr(1), frame.to_vec())]);

        // ...and the broker echo comes back to it as well.
        r.on_broker_message("t", frame);
        assert_eq!(r.mesh().sent.len(), 2);
    }

    #[test]
    fn test_self_delivery_suppressed_when_enabled() {
        let mut r = GatewayRouter::new(MockMesh::default(), MockBroker::default(), true);
        let frame = br#"{"type":"publish","topic":"t","body":"x"}"#;
        r.on_mesh_frame(addr(1), br#"{"type":"subscribe","topic":"t"}"#);
        r.on_mesh_frame(addr(2), br#"{"type":"subscribe","topic":"t"}"#);
        r.on_mesh_frame(addr(1), frame);

        // Local fan-out skips the publisher.
        assert_eq!(r.mesh().sent, vec![(addr(2), frame.to_vec())]);

        // The broker echo skips it too, exactly once.
        r.on_broker_message("t", frame);
        assert_eq!(
            r.mesh().sent,
            vec![(addr(2), frame.to_vec()), (addr(2), frame.to_vec())]
        );

        // A later identical delivery from another publisher is not matched.
        r.on_broker_message("t", frame);
        assert_eq!(r.mesh().sent.len(), 4);
    }

    #[test]
    fn test_legacy_flat_publish_delivers_to_subscribers() {
        let mut r = router();
        r.on_mesh_frame(addr(1), br#"{"type":"subscribe","topic":"esp32/dht22"}"#);

        let frame = br#"{"topic":"esp32/dht22","temperature_c":23.5,"humidity":44.1}"#;
        r.on_mesh_frame(addr(2), frame);

        assert_eq!(r.mesh().sent, vec![(addr(1), frame.to_vec())]);
        assert_eq!(
            r.broker().publishes,
            vec![("esp32/dht22".to_string(), frame.to_vec())]
        );
    }
}
