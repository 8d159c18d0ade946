// SPDX-License-Identifier: MIT OR Apache-2.0
//! mew-envelope
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Wire format for the gateway's envelope protocol. Current transport:
//! JSON text frames over WebSocket, JSONL over child-process stdio, or a
//! single JSON body over HTTP injection.

pub mod codec;
pub mod kind;
pub mod version;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub use kind::Kind;
pub use version::{PROTOCOL_VERSION, is_compatible_version, parse_version};

/// Errors arising from envelope decoding or shape validation.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// JSON serialization or deserialization failure, or a shape violation
    /// (missing required field, `correlation_id` not a list).
    #[error("invalid envelope: {0}")]
    Decode(#[from] serde_json::Error),

    /// Underlying I/O error while reading/writing a framed stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The envelope exceeded the configured maximum size.
    #[error("envelope of {size} bytes exceeds the maximum of {max}")]
    TooLarge {
        /// Size of the offending envelope, in bytes.
        size: usize,
        /// Configured maximum, in bytes.
        max: usize,
    },
}

// ---------------------------------------------------------------------------
// CorrelationId
// ---------------------------------------------------------------------------

/// An ordered list of envelope ids. MUST be a list on the wire, never a
/// bare scalar — enforced at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CorrelationId(Vec<String>);

impl CorrelationId {
    /// An empty correlation list.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A correlation list referencing a single prior envelope id.
    #[must_use]
    pub fn of(id: impl Into<String>) -> Self {
        Self(vec![id.into()])
    }

    /// The referenced ids, in order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.0
    }

    /// The first referenced id, if any (the common case: one correlation).
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// `true` if this correlation list references no prior envelope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for CorrelationId {
    fn from(ids: Vec<String>) -> Self {
        Self(ids)
    }
}

impl<'de> Deserialize<'de> for CorrelationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Array(items) => {
                let mut ids = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        serde_json::Value::String(s) => ids.push(s),
                        other => {
                            return Err(D::Error::custom(format!(
                                "correlation_id entries must be strings, got {other}"
                            )));
                        }
                    }
                }
                Ok(CorrelationId(ids))
            }
            serde_json::Value::Null => Ok(CorrelationId::default()),
            other => Err(D::Error::custom(format!(
                "correlation_id must be a list, got scalar {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The canonical wire envelope.
///
/// # Examples
///
/// ```
/// use mew_envelope::{Envelope, codec::EnvelopeCodec};
///
/// let envelope = Envelope::new("chat", serde_json::json!({"text": "hi"}));
/// let line = EnvelopeCodec::encode(&envelope).unwrap();
/// assert!(line.ends_with('\n'));
///
/// let decoded = EnvelopeCodec::decode(line.trim()).unwrap();
/// assert_eq!(decoded.kind.as_str(), "chat");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire-version discriminator, e.g. `"mew/v0.4"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,

    /// Globally unique envelope identifier, assigned by the sender.
    pub id: String,

    /// Sender wall-clock timestamp.
    #[serde(default = "chrono::Utc::now")]
    pub ts: chrono::DateTime<chrono::Utc>,

    /// Set/overwritten authoritatively by the gateway on ingress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Ordered list of recipient participant ids. Empty means broadcast.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,

    /// Declares semantics and selects capability patterns.
    pub kind: Kind,

    /// Ties responses/fulfillments to prior envelopes. MUST be a list.
    #[serde(default, skip_serializing_if = "CorrelationId::is_empty")]
    pub correlation_id: CorrelationId,

    /// Groups related envelopes, e.g. a reasoning session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Kind-specific body.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Construct a new envelope with a fresh id and the current timestamp.
    ///
    /// `protocol` and `from` are left unset; call [`Envelope::stamp_for_egress`]
    /// before transmitting.
    #[must_use]
    pub fn new(kind: impl Into<Kind>, payload: serde_json::Value) -> Self {
        Self {
            protocol: String::new(),
            id: uuid::Uuid::new_v4().to_string(),
            ts: chrono::Utc::now(),
            from: None,
            to: Vec::new(),
            kind: kind.into(),
            correlation_id: CorrelationId::empty(),
            context: None,
            payload,
        }
    }

    /// Builder-style: address this envelope to specific recipients.
    #[must_use]
    pub fn to(mut self, recipients: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.to = recipients.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style: attach a correlation id referencing a prior envelope.
    #[must_use]
    pub fn correlated_to(mut self, envelope_id: impl Into<String>) -> Self {
        self.correlation_id = CorrelationId::of(envelope_id);
        self
    }

    /// Builder-style: attach an arbitrary correlation list.
    #[must_use]
    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Stamp `protocol` and `id` if unset, and authoritatively overwrite
    /// `from`. Mirrors the gateway's ingress/egress stamping contract (§4.1,
    /// §4.4.2): `id` is otherwise left as supplied, `ts` is left as supplied
    /// (already defaulted at construction/decode time), `from` always wins.
    pub fn stamp_for_egress(&mut self, from: impl Into<String>) {
        if self.protocol.is_empty() {
            self.protocol = PROTOCOL_VERSION.to_string();
        }
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        self.from = Some(from.into());
    }

    /// `true` if this envelope has no explicit recipients (broadcast).
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.to.is_empty()
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_envelope_has_fresh_id_and_timestamp() {
        let e1 = Envelope::new("chat", serde_json::json!({"text": "hi"}));
        let e2 = Envelope::new("chat", serde_json::json!({"text": "hi"}));
        assert_ne!(e1.id, e2.id);
        assert!(e1.protocol.is_empty());
    }

    #[test]
    fn stamp_for_egress_fills_protocol_and_overwrites_from() {
        let mut e = Envelope::new("chat", serde_json::json!({}));
        e.from = Some("spoofed".into());
        e.stamp_for_egress("agent-a");
        assert_eq!(e.protocol, PROTOCOL_VERSION);
        assert_eq!(e.from.as_deref(), Some("agent-a"));
    }

    #[test]
    fn stamp_for_egress_preserves_sender_assigned_id() {
        let mut e = Envelope::new("chat", serde_json::json!({}));
        let original_id = e.id.clone();
        e.stamp_for_egress("agent-a");
        assert_eq!(e.id, original_id);
    }

    #[test]
    fn broadcast_when_to_is_empty() {
        let e = Envelope::new("chat", serde_json::json!({}));
        assert!(e.is_broadcast());
        let targeted = e.to(["agent-b"]);
        assert!(!targeted.is_broadcast());
    }

    #[test]
    fn correlation_id_rejects_scalar_string() {
        let json = r#"{"id":"m1","kind":"chat","correlation_id":"m0","payload":{}}"#;
        let err = serde_json::from_str::<Envelope>(json).unwrap_err();
        assert!(err.to_string().contains("must be a list"));
    }

    #[test]
    fn correlation_id_accepts_list() {
        let json = r#"{"id":"m2","kind":"chat","correlation_id":["m1"],"payload":{}}"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.correlation_id.first(), Some("m1"));
    }

    #[test]
    fn missing_id_is_rejected() {
        let json = r#"{"kind":"chat","payload":{}}"#;
        assert!(serde_json::from_str::<Envelope>(json).is_err());
    }

    #[test]
    fn missing_kind_is_rejected() {
        let json = r#"{"id":"m1","payload":{}}"#;
        assert!(serde_json::from_str::<Envelope>(json).is_err());
    }

    #[test]
    fn unknown_fields_are_forwarded_permissively() {
        let json = r#"{"id":"m1","kind":"custom/thing","payload":{},"weird_field":42}"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.kind.as_str(), "custom/thing");
    }

    #[test]
    fn egress_never_emits_correlation_id_when_empty() {
        let e = Envelope::new("chat", serde_json::json!({}));
        let json = serde_json::to_string(&e).unwrap();
        assert!(!json.contains("correlation_id"));
    }
}
