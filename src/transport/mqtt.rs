// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT broker adapter.
//!
//! Outbound operations go through rumqttc's non-blocking `try_*` calls so
//! the dispatcher never suspends inside a handler. The event loop runs in
//! its own task and forwards broker deliveries onto the gateway channel.

use crate::config::BrokerConfig;
use crate::gateway::GatewayEvent;
use crate::transport::{BrokerLink, TransportError};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};

/// Outstanding requests buffered between client and event loop.
const REQUEST_CAPACITY: usize = 64;

const MAX_CONSECUTIVE_ERRORS: u32 = 10;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Broker link backed by a rumqttc [`AsyncClient`].
pub struct MqttBroker {
    client: AsyncClient,
}

impl MqttBroker {
    /// Create the client and its event loop from configuration. The caller
    /// must drive the returned [`EventLoop`] via [`MqttBroker::drive`].
    pub fn connect(config: &BrokerConfig) -> (Self, EventLoop) {
        let mut options =
            MqttOptions::new(config.client_id.as_str(), config.host.as_str(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        (Self { client }, event_loop)
    }

    /// Drive the broker event loop, forwarding each delivery on a
    /// subscribed topic onto the gateway channel.
    ///
    /// Returns when the broker disconnects cleanly, the gateway channel
    /// closes, or too many consecutive connection errors accumulate.
    pub async fn drive(mut event_loop: EventLoop, events: Sender<GatewayEvent>) {
        let mut error_count = 0u32;

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    error_count = 0;
                    debug!(
                        topic = %publish.topic,
                        len = publish.payload.len(),
                        "broker delivery"
                    );
                    let event = GatewayEvent::BrokerMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    };
                    if events.send(event).await.is_err() {
                        // Dispatcher is gone; nothing left to deliver to.
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    info!("broker sent disconnect");
                    break;
                }
                Ok(_) => {
                    error_count = 0;
                }
                Err(err) => {
                    error_count += 1;
                    if error_count >= MAX_CONSECUTIVE_ERRORS {
                        error!(%err, error_count, "broker connection failed after max retries");
                        break;
                    }

                    let delay = INITIAL_RETRY_DELAY * 2u32.pow((error_count - 1).min(8));
                    let delay = delay.min(MAX_RETRY_DELAY);
                    warn!(%err, error_count, ?delay, "broker event loop error; retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
        info!("broker event loop terminated");
    }
}

impl BrokerLink for MqttBroker {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| TransportError::Broker(e.to_string()))
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_unsubscribe(topic)
            .map_err(|e| TransportError::Broker(e.to_string()))
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| TransportError::Broker(e.to_string()))
    }
}
