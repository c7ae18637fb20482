// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscription registry.
//!
//! Maps each topic to the ordered set of mesh node addresses subscribed to
//! it. The registry is the single source of truth for routing decisions and
//! is only ever mutated by the router on the dispatcher task, so it needs no
//! internal locking.

use crate::addr::NodeAddress;
use std::collections::HashMap;

/// Topic -> ordered subscriber collection.
///
/// Insertion order is preserved and duplicates are forbidden (subscribe is
/// idempotent). A topic entry may exist with zero subscribers after a full
/// unsubscribe or [`clear`](Self::clear); callers cannot distinguish that
/// state from a never-seen topic, by design. Nothing here is persisted.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: HashMap<String, Vec<NodeAddress>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `addr` to `topic`'s subscriber collection.
    ///
    /// Returns `true` if a new subscription was created, `false` if the
    /// address was already present. Invalid input (empty topic) is the
    /// caller's responsibility to exclude.
    pub fn subscribe(&mut self, topic: &str, addr: NodeAddress) -> bool {
        let subs = self.topics.entry(topic.to_string()).or_default();
        if subs.contains(&addr) {
            return false;
        }
        subs.push(addr);
        true
    }

    /// Remove `addr` from `topic`'s collection, if present.
    ///
    /// Returns the resulting subscriber count for the topic; 0 signals
    /// "last subscriber removed". Unknown topics and absent addresses are
    /// no-ops.
    pub fn unsubscribe(&mut self, topic: &str, addr: NodeAddress) -> usize {
        match self.topics.get_mut(topic) {
            Some(subs) => {
                subs.retain(|a| *a != addr);
                subs.len()
            }
            None => 0,
        }
    }

    /// Snapshot of the current subscribers, in insertion order.
    ///
    /// Unknown and emptied topics both yield an empty vec.
    pub fn clients_for(&self, topic: &str) -> Vec<NodeAddress> {
        self.topics.get(topic).cloned().unwrap_or_default()
    }

    /// Remove all subscribers from a topic without deleting the topic's
    /// existence record.
    pub fn clear(&mut self, topic: &str) {
        if let Some(subs) = self.topics.get_mut(topic) {
            subs.clear();
        }
    }

    /// Current subscriber count for a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    /// Comma-separated display of a topic's subscribers, in insertion
    /// order, for diagnostics. Empty for unknown or emptied topics.
    pub fn subscriber_list(&self, topic: &str) -> String {
        self.topics
            .get(topic)
            .map(|subs| {
                subs.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default()
    }

    /// All topics ever subscribed to, including emptied ones.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> NodeAddress {
        NodeAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
    }

    #[test]
    fn test_subscribe_idempotent() {
        let mut reg = SubscriptionRegistry::new();
        assert!(reg.subscribe("led/control", addr(1)));
        assert!(!reg.subscribe("led/control", addr(1)));
        assert!(!reg.subscribe("led/control", addr(1)));
        assert_eq!(reg.clients_for("led/control"), vec![addr(1)]);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe("t", addr(3));
        reg.subscribe("t", addr(1));
        reg.subscribe("t", addr(2));
        reg.subscribe("t", addr(1));
        assert_eq!(reg.clients_for("t"), vec![addr(3), addr(1), addr(2)]);
    }

    #[test]
    fn test_unsubscribe_returns_remaining() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe("t", addr(1));
        reg.subscribe("t", addr(2));
        assert_eq!(reg.unsubscribe("t", addr(1)), 1);
        assert_eq!(reg.unsubscribe("t", addr(2)), 0);
        assert!(reg.clients_for("t").is_empty());
    }

    #[test]
    fn test_unsubscribe_without_subscription_is_noop() {
        let mut reg = SubscriptionRegistry::new();
        assert_eq!(reg.unsubscribe("never/seen", addr(1)), 0);

        reg.subscribe("t", addr(1));
        assert_eq!(reg.unsubscribe("t", addr(2)), 1);
        assert_eq!(reg.clients_for("t"), vec![addr(1)]);
    }

    #[test]
    fn test_emptied_topic_indistinguishable_from_unknown() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe("t", addr(1));
        reg.unsubscribe("t", addr(1));
        assert_eq!(reg.clients_for("t"), reg.clients_for("never/seen"));
    }

    #[test]
    fn test_clear_keeps_topic_entry() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe("t", addr(1));
        reg.subscribe("t", addr(2));
        reg.clear("t");
        assert_eq!(reg.subscriber_count("t"), 0);
        assert!(reg.topics().any(|t| t == "t"));

        // Clearing an unknown topic does not create an entry.
        reg.clear("other");
        assert!(!reg.topics().any(|t| t == "other"));
    }

    #[test]
    fn test_subscriber_list_for_diagnostics() {
        let mut reg = SubscriptionRegistry::new();
        assert_eq!(reg.subscriber_list("t"), "");

        reg.subscribe("t", addr(1));
        reg.subscribe("t", addr(2));
        assert_eq!(
            reg.subscriber_list("t"),
            "AA:BB:CC:DD:EE:01, AA:BB:CC:DD:EE:02"
        );

        reg.unsubscribe("t", addr(1));
        reg.unsubscribe("t", addr(2));
        assert_eq!(reg.subscriber_list("t"), "");
    }

    #[test]
    fn test_clients_for_is_snapshot() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe("t", addr(1));
        let snapshot = reg.clients_for("t");
        reg.subscribe("t", addr(2));
        assert_eq!(snapshot, vec![addr(1)]);
    }
}
