// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire envelope codec.
//!
//! Two JSON dialects exist in observed mesh traffic. The structured dialect
//! carries an explicit kind: `{"type": "subscribe", "topic": "dht22/data"}`.
//! The legacy flat dialect is a sensor-report-shaped object with a `topic`
//! field and no recognized `type` field; it is classified as an implicit
//! publish of the whole object. Dialect detection happens here so the router
//! only ever sees one canonical [`Envelope`] type.

use serde_json::Value;
use thiserror::Error;

/// Decode errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer is not a well-formed JSON object.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The payload parsed but carries no usable topic field. Such messages
    /// are dropped; there is no fallback topic.
    #[error("missing or empty topic field")]
    MissingTopic,
}

/// Classified message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Subscribe,
    Unsubscribe,
    Publish,
}

impl EnvelopeKind {
    /// Wire name of this kind in the structured dialect.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Publish => "publish",
        }
    }
}

/// Decoded logical message, independent of wire dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    /// Non-empty topic identifier.
    pub topic: String,
    /// Opaque body carried by the structured dialect. Never interpreted by
    /// the router.
    pub body: Option<Value>,
}

impl Envelope {
    /// Convenience constructor for the structured dialect.
    pub fn new(kind: EnvelopeKind, topic: impl Into<String>) -> Self {
        Self {
            kind,
            topic: topic.into(),
            body: None,
        }
    }

    /// Attach a body value.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Decode a wire frame into an [`Envelope`].
///
/// Accepts both dialects. A parseable object without a recognized `type`
/// field is a legacy flat publish, provided it carries a usable topic; an
/// absent or empty topic fails with [`DecodeError::MissingTopic`].
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    // Constrained-node senders NUL-terminate their frames.
    let trimmed = trim_frame(bytes);

    let value: Value = serde_json::from_slice(trimmed)
        .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError::MalformedPayload("not a JSON object".into()))?;

    let topic = obj
        .get("topic")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or(DecodeError::MissingTopic)?
        .to_string();

    let kind = match obj.get("type").and_then(Value::as_str) {
        Some("subscribe") => EnvelopeKind::Subscribe,
        Some("unsubscribe") => EnvelopeKind::Unsubscribe,
        // Explicit publish, or legacy flat (no recognized kind).
        _ => EnvelopeKind::Publish,
    };

    Ok(Envelope {
        kind,
        topic,
        body: obj.get("body").cloned(),
    })
}

/// Encode an [`Envelope`] in the structured dialect.
///
/// Never fails for well-formed envelopes. Callers are responsible for
/// keeping the encoded size under the mesh frame ceiling; no truncation or
/// chunking happens here.
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    let mut obj = serde_json::Map::new();
    obj.insert("type".into(), Value::String(envelope.kind.as_str().into()));
    obj.insert("topic".into(), Value::String(envelope.topic.clone()));
    if let Some(body) = &envelope.body {
        obj.insert("body".into(), body.clone());
    }
    Value::Object(obj).to_string().into_bytes()
}

/// Strip trailing NUL bytes from a received frame.
fn trim_frame(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |i| i + 1);
    &bytes[..end]
}
