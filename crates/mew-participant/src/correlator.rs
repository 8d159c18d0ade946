// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory correlation table: maps an outbound envelope id to the
//! completion slot that resolves when a matching response arrives.

use mew_envelope::Envelope;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::ParticipantError;

/// Tracks in-flight calls keyed by the outbound envelope id they were sent
/// under, and resolves them when a correlated response arrives.
#[derive(Default)]
pub struct Correlator {
    slots: Mutex<HashMap<String, oneshot::Sender<Envelope>>>,
}

impl Correlator {
    /// Construct an empty correlation table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in responses correlated to `envelope_id`.
    pub fn register(&self, envelope_id: impl Into<String>) -> oneshot::Receiver<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().expect("correlator lock poisoned").insert(envelope_id.into(), tx);
        rx
    }

    /// If `envelope` carries a `correlation_id` whose first entry has a
    /// waiting slot, resolve it and report `true`. Otherwise report `false`
    /// and leave the envelope unconsumed by the caller.
    pub fn try_resolve(&self, envelope: &Envelope) -> bool {
        let Some(id) = envelope.correlation_id.first() else {
            return false;
        };
        let sender = self.slots.lock().expect("correlator lock poisoned").remove(id);
        match sender {
            Some(tx) => {
                let _ = tx.send(envelope.clone());
                true
            }
            None => false,
        }
    }

    /// Drop a previously registered slot without resolving it (used when a
    /// caller gives up before its timeout, e.g. on `call` cancellation).
    pub fn forget(&self, envelope_id: &str) {
        self.slots.lock().expect("correlator lock poisoned").remove(envelope_id);
    }

    /// Await a registered slot, failing with [`ParticipantError::Timeout`]
    /// if it does not resolve within `timeout`.
    pub async fn wait(
        &self,
        envelope_id: &str,
        rx: oneshot::Receiver<Envelope>,
        timeout: Duration,
    ) -> Result<Envelope, ParticipantError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(ParticipantError::Protocol("correlation slot dropped".into())),
            Err(_) => {
                self.forget(envelope_id);
                Err(ParticipantError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolves_matching_correlation() {
        let correlator = Correlator::new();
        let rx = correlator.register("req-1");
        let response = Envelope::new("chat/response", json!({})).correlated_to("req-1".to_string());
        assert!(correlator.try_resolve(&response));
        let resolved = rx.await.unwrap();
        assert_eq!(resolved.kind.as_str(), "chat/response");
    }

    #[tokio::test]
    async fn unmatched_correlation_is_not_consumed() {
        let correlator = Correlator::new();
        let _rx = correlator.register("req-1");
        let response = Envelope::new("chat/response", json!({})).correlated_to("other".to_string());
        assert!(!correlator.try_resolve(&response));
    }

    #[tokio::test]
    async fn wait_times_out_without_response() {
        let correlator = Correlator::new();
        let rx = correlator.register("req-1");
        let result = correlator.wait("req-1", rx, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ParticipantError::Timeout)));
    }

    #[tokio::test]
    async fn wait_resolves_when_response_arrives() {
        let correlator = Correlator::new();
        let rx = correlator.register("req-1");
        let response = Envelope::new("chat/response", json!({})).correlated_to("req-1".to_string());
        assert!(correlator.try_resolve(&response));
        let resolved = correlator.wait("req-1", rx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(resolved.kind.as_str(), "chat/response");
    }
}
