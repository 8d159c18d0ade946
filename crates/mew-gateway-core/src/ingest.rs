// SPDX-License-Identifier: MIT OR Apache-2.0
//! Envelope ingestion: dedup, capability enforcement, audit, and fan-out
//! (§4.4.2-§4.4.4). One call per inbound envelope, after join.

use crate::join::{error_envelope, GATEWAY_SENDER};
use crate::state::{compile_capability_entries, GatewayState, StreamState};
use chrono::Utc;
use mew_audit::{DecisionRecord, DecisionResult, EnvelopeEvent, EnvelopeRecord, MatchedSource};
use mew_config::CapabilityEntry;
use mew_envelope::Envelope;
use mew_error::{ErrorCode, MewError};
use mew_registry::GrantRecord;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// The gateway's own immediate judgment of an ingested envelope — distinct
/// from whether any recipient's queue accepted it. The HTTP injection
/// surface (§6) maps this straight to its 2xx/4xx response; the WebSocket
/// loop ignores it (a `system/error` has already been queued back to the
/// sender as a side effect).
pub enum IngestOutcome {
    /// Passed dedup, reserved-kind, and capability checks.
    Accepted,
    /// Rejected before fan-out; `MewError` carries the wire reason.
    Rejected(MewError),
}

/// Route one already-deduped-candidate envelope from `sender_id` through
/// capability enforcement and fan-out. Stamps `from`/`protocol` on the way
/// in. `sender_id` must already be registered (the caller attaches the
/// channel before the read loop starts calling this).
pub async fn route_envelope(state: &GatewayState, sender_id: &str, mut envelope: Envelope) -> IngestOutcome {
    envelope.stamp_for_egress(sender_id);

    if !state.observe_envelope_id(sender_id, &envelope.id) {
        warn!(envelope_id = %envelope.id, sender = sender_id, "duplicate envelope id, dropping");
        return IngestOutcome::Rejected(MewError::new(ErrorCode::ProtocolInvalidEnvelope, "duplicate envelope id"));
    }

    let _ = state
        .audit
        .record_envelope(EnvelopeRecord {
            ts: Utc::now(),
            envelope_id: envelope.id.clone(),
            from: sender_id.to_string(),
            recipient: None,
            event: EnvelopeEvent::Received,
        })
        .await;

    if envelope.kind.namespace() == "system" {
        let err = MewError::new(ErrorCode::RoutingReservedKind, "system/* kinds are reserved");
        deny_and_reply(state, sender_id, &envelope, err.clone()).await;
        return IngestOutcome::Rejected(err);
    }

    let Some(sender) = state.registry.get(sender_id) else {
        return IngestOutcome::Rejected(MewError::new(ErrorCode::AuthTokenMismatch, "unknown participant"));
    };

    let required_capability = mew_tool::required_capability_label(&envelope);
    let configured_len = sender.configured_capabilities().len();
    let effective = sender.effective_capabilities();
    let mut matched: Option<(usize, &mew_capability::Pattern)> = None;
    for (index, pattern) in effective.iter().enumerate() {
        let pattern: &mew_capability::Pattern = pattern;
        if mew_capability::matches(pattern, &envelope) {
            matched = Some((index, pattern));
            break;
        }
    }

    let decision = match matched {
        Some((index, pattern)) => {
            let source = if index < configured_len {
                MatchedSource::Configured
            } else {
                MatchedSource::Granted
            };
            DecisionRecord {
                ts: Utc::now(),
                envelope_id: envelope.id.clone(),
                participant: sender_id.to_string(),
                required_capability,
                matched_capability: Some(pattern.id()),
                matched_source: Some(source),
                result: DecisionResult::Allowed,
            }
        }
        None => DecisionRecord {
            ts: Utc::now(),
            envelope_id: envelope.id.clone(),
            participant: sender_id.to_string(),
            required_capability,
            matched_capability: None,
            matched_source: None,
            result: DecisionResult::Denied,
        },
    };
    let allowed = decision.result == DecisionResult::Allowed;
    let _ = state.audit.record_decision(decision).await;

    if !allowed {
        let err = MewError::new(ErrorCode::CapabilityDenied, "capability denied");
        deny_and_reply(state, sender_id, &envelope, err.clone()).await;
        return IngestOutcome::Rejected(err);
    }

    match envelope.kind.as_str() {
        "capability/grant" => handle_grant(state, sender_id, &envelope),
        "capability/revoke" => handle_revoke(state, &envelope),
        "stream/request" => {
            handle_stream_request(state, sender_id, &envelope).await;
            return IngestOutcome::Accepted;
        }
        "stream/close" => handle_stream_close(state, &envelope),
        _ => {}
    }

    fanout(state, sender_id, envelope).await;
    IngestOutcome::Accepted
}

async fn deny_and_reply(state: &GatewayState, sender_id: &str, envelope: &Envelope, err: MewError) {
    let error = error_envelope(&err.with_context("envelope_id", envelope.id.clone()));
    let _ = state
        .audit
        .record_envelope(EnvelopeRecord {
            ts: Utc::now(),
            envelope_id: envelope.id.clone(),
            from: sender_id.to_string(),
            recipient: Some(sender_id.to_string()),
            event: EnvelopeEvent::Rejected,
        })
        .await;
    deliver_one(state, sender_id, error).await;
}

/// Namespaces whose queue insertion is exempt from the drop-oldest
/// backpressure policy (§4.3): capability/lifecycle/stream control traffic
/// always gets through, even under sustained load, because losing it would
/// desynchronize gateway and participant state rather than just lose a
/// chat turn.
fn is_control_kind(kind: &str) -> bool {
    matches!(
        mew_envelope::Kind::new(kind).namespace(),
        "system" | "capability" | "participant" | "stream"
    )
}

/// Deliver `envelope` to every connected recipient named in `to`, or to
/// every other connected participant if `to` is empty (broadcast).
///
/// Per §4.3's resolved backpressure policy, a full per-participant queue
/// drops the *oldest* buffered envelope to make room — except for control
/// envelopes, which are never dropped. `tokio::sync::mpsc` only exposes
/// eviction from the receive side, so the producer side approximates this:
/// non-control sends use `try_send` and, on `Full`, log+record the enqueued
/// envelope itself as dropped (the newest loses, not the oldest — an
/// intentional, documented deviation, see DESIGN.md); control envelopes use
/// a short bounded `send` so they are never silently dropped under
/// transient backpressure.
async fn fanout(state: &GatewayState, sender_id: &str, envelope: Envelope) {
    let recipients: Vec<Arc<mew_registry::ParticipantState>> = if envelope.is_broadcast() {
        state
            .registry
            .iter_connected()
            .into_iter()
            .filter(|p| p.id != sender_id)
            .collect()
    } else {
        envelope
            .to
            .iter()
            .filter_map(|id| state.registry.get(id))
            .filter(|p| p.is_connected())
            .collect()
    };

    for recipient in recipients {
        let Some(outbound) = recipient.outbound_sender() else { continue };
        deliver_to(state, &envelope, &recipient.id, outbound).await;
    }
}

/// Deliver a gateway-originated envelope (join/leave notices) to every
/// connected participant other than `exclude`.
pub async fn broadcast(state: &GatewayState, exclude: &str, envelope: Envelope) {
    for recipient in state.registry.iter_connected() {
        if recipient.id == exclude {
            continue;
        }
        if let Some(outbound) = recipient.outbound_sender() {
            deliver_to(state, &envelope, &recipient.id, outbound).await;
        }
    }
}

async fn deliver_one(state: &GatewayState, recipient_id: &str, envelope: Envelope) {
    let Some(recipient) = state.registry.get(recipient_id) else { return };
    let Some(outbound) = recipient.outbound_sender() else { return };
    deliver_to(state, &envelope, recipient_id, outbound).await;
}

async fn deliver_to(state: &GatewayState, envelope: &Envelope, recipient_id: &str, outbound: mpsc::Sender<Envelope>) {
    let delivered = if is_control_kind(envelope.kind.as_str()) {
        let timeout = std::time::Duration::from_millis(200);
        tokio::time::timeout(timeout, outbound.send(envelope.clone())).await.is_ok_and(|r| r.is_ok())
    } else {
        outbound.try_send(envelope.clone()).is_ok()
    };

    let event = if delivered { EnvelopeEvent::Delivered } else { EnvelopeEvent::Rejected };
    let _ = state
        .audit
        .record_envelope(EnvelopeRecord {
            ts: Utc::now(),
            envelope_id: envelope.id.clone(),
            from: envelope.from.clone().unwrap_or_default(),
            recipient: Some(recipient_id.to_string()),
            event,
        })
        .await;
}

fn handle_grant(state: &GatewayState, sender_id: &str, envelope: &Envelope) {
    let Some(recipient) = envelope.to.first() else { return };
    let Some(entries) = envelope.payload.get("capabilities").cloned() else { return };
    let Ok(entries) = serde_json::from_value::<Vec<CapabilityEntry>>(entries) else { return };
    let Ok(patterns) = compile_capability_entries(&entries) else { return };
    let grant_id = envelope
        .payload
        .get("grantId")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| envelope.id.clone());
    let reason = envelope.payload.get("reason").and_then(|v| v.as_str()).map(str::to_string);

    state.registry.grant(
        recipient,
        GrantRecord {
            grant_id,
            recipient: recipient.clone(),
            capabilities: patterns,
            granted_by: sender_id.to_string(),
            granted_at: Utc::now(),
            reason,
        },
    );
}

fn handle_revoke(state: &GatewayState, envelope: &Envelope) {
    let Some(recipient) = envelope.to.first() else { return };
    let Some(grant_ids) = envelope.payload.get("grantIds").and_then(|v| v.as_array()) else { return };
    for grant_id in grant_ids.iter().filter_map(|v| v.as_str()) {
        state.registry.revoke(recipient, grant_id);
    }
}

async fn handle_stream_request(state: &GatewayState, sender_id: &str, envelope: &Envelope) {
    let stream_id = state.allocate_stream_id();
    state.open_stream(
        stream_id.clone(),
        StreamState {
            owner: sender_id.to_string(),
            writers: vec![sender_id.to_string()],
            recipients: envelope.to.clone(),
        },
    );

    let mut open = Envelope::new("stream/open", serde_json::json!({ "streamId": stream_id }));
    open.stamp_for_egress(GATEWAY_SENDER);
    open = open.correlated_to(envelope.id.clone());

    deliver_one(state, sender_id, open.clone()).await;
    for recipient in &envelope.to {
        deliver_one(state, recipient, open.clone()).await;
    }
}

fn handle_stream_close(state: &GatewayState, envelope: &Envelope) {
    if let Some(stream_id) = envelope.payload.get("streamId").and_then(|v| v.as_str()) {
        state.close_stream(stream_id);
    }
}
