// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway statistics.
//!
//! One counter per observable state transition. The counters are the
//! testable diagnostic surface: every subscribe, unsubscribe, fan-out, and
//! drop bumps exactly one of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for gateway state transitions.
#[derive(Debug)]
pub struct GatewayStats {
    /// New subscriptions accepted into the registry.
    pub subscriptions_accepted: AtomicU64,

    /// Unsubscribe envelopes processed.
    pub unsubscribes_processed: AtomicU64,

    /// Subscribe calls issued to the broker.
    pub broker_subscribes: AtomicU64,

    /// Unsubscribe calls issued to the broker (last subscriber removed).
    pub broker_unsubscribes: AtomicU64,

    /// Mesh publish envelopes routed.
    pub publishes_routed: AtomicU64,

    /// Payloads re-published to the broker.
    pub broker_publishes: AtomicU64,

    /// Broker deliveries forwarded to at least one mesh subscriber.
    pub broker_messages_forwarded: AtomicU64,

    /// Unicast frames sent on the mesh.
    pub mesh_frames_sent: AtomicU64,

    /// Frames dropped because they were not well-formed.
    pub dropped_malformed: AtomicU64,

    /// Frames dropped for lack of a usable topic.
    pub dropped_missing_topic: AtomicU64,

    /// Broker deliveries discarded because no mesh node subscribes.
    pub dropped_no_subscribers: AtomicU64,

    /// Per-destination transport send failures.
    pub send_errors: AtomicU64,

    /// Stats creation time.
    pub created: Instant,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self {
            subscriptions_accepted: AtomicU64::new(0),
            unsubscribes_processed: AtomicU64::new(0),
            broker_subscribes: AtomicU64::new(0),
            broker_unsubscribes: AtomicU64::new(0),
            publishes_routed: AtomicU64::new(0),
            broker_publishes: AtomicU64::new(0),
            broker_messages_forwarded: AtomicU64::new(0),
            mesh_frames_sent: AtomicU64::new(0),
            dropped_malformed: AtomicU64::new(0),
            dropped_missing_topic: AtomicU64::new(0),
            dropped_no_subscribers: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    /// Get a snapshot of the current counters.
    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            subscriptions_accepted: self.subscriptions_accepted.load(Ordering::Relaxed),
            unsubscribes_processed: self.unsubscribes_processed.load(Ordering::Relaxed),
            broker_subscribes: self.broker_subscribes.load(Ordering::Relaxed),
            broker_unsubscribes: self.broker_unsubscribes.load(Ordering::Relaxed),
            publishes_routed: self.publishes_routed.load(Ordering::Relaxed),
            broker_publishes: self.broker_publishes.load(Ordering::Relaxed),
            broker_messages_forwarded: self.broker_messages_forwarded.load(Ordering::Relaxed),
            mesh_frames_sent: self.mesh_frames_sent.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_missing_topic: self.dropped_missing_topic.load(Ordering::Relaxed),
            dropped_no_subscribers: self.dropped_no_subscribers.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of gateway statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStatsSnapshot {
    pub subscriptions_accepted: u64,
    pub unsubscribes_processed: u64,
    pub broker_subscribes: u64,
    pub broker_unsubscribes: u64,
    pub publishes_routed: u64,
    pub broker_publishes: u64,
    pub broker_messages_forwarded: u64,
    pub mesh_frames_sent: u64,
    pub dropped_malformed: u64,
    pub dropped_missing_topic: u64,
    pub dropped_no_subscribers: u64,
    pub send_errors: u64,
    pub uptime_secs: u64,
}

impl GatewayStatsSnapshot {
    /// Total dropped messages, across drop reasons.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_malformed + self.dropped_missing_topic + self.dropped_no_subscribers
    }
}
