// SPDX-License-Identifier: MIT OR Apache-2.0
//! Join handshake (§4.4.1): validates the first inbound frame on a freshly
//! opened channel and, on success, registers the participant.

use crate::state::GatewayState;
use mew_envelope::Envelope;
use mew_error::{ErrorCode, MewError};
use serde_json::Value;

/// The gateway's own synthetic sender id, used on every envelope the core
/// emits rather than forwards (`system/welcome`, `system/error`, broadcasts,
/// `stream/open`). Never a real participant.
pub const GATEWAY_SENDER: &str = "system:gateway";

/// Outcome of a join attempt: either the resolved participant id plus the
/// `system/welcome` envelope to send back, or the denial to emit before
/// closing the connection.
pub enum JoinOutcome {
    /// Join succeeded; the channel should now be attached under this id.
    Accepted {
        /// The authenticated participant id (never the client's raw claim).
        participant_id: String,
        /// The `system/welcome` envelope to send on this connection.
        welcome: Envelope,
    },
    /// Join failed; `error` should be sent, then the connection closed.
    Denied {
        /// The `system/error` envelope to send before closing.
        error: Envelope,
    },
}

/// Validate the first inbound frame per §4.4.1 and, on success, register the
/// participant in the registry (but does not attach a transport channel —
/// that is the caller's responsibility once it has an outbound sender).
pub fn perform_join(state: &GatewayState, first: &Envelope) -> JoinOutcome {
    if first.kind.as_str() != "system/join" {
        return deny(ErrorCode::ProtocolInvalidEnvelope, "first frame must be system/join");
    }

    let space = first.payload.get("space").and_then(Value::as_str);
    match space {
        Some(s) if s == state.config.space => {}
        Some(_) => return deny(ErrorCode::AuthInvalidSpace, "invalid space"),
        None => return deny(ErrorCode::AuthInvalidSpace, "invalid space"),
    }

    let Some(token) = first.payload.get("token").and_then(Value::as_str) else {
        return deny(ErrorCode::AuthTokenMissing, "authentication required");
    };

    let claimed_id = first.payload.get("participantId").and_then(Value::as_str);
    let Some(resolved_id) = state.registry.resolve_by_token(token) else {
        return deny(ErrorCode::AuthTokenMismatch, "authentication failed");
    };
    if claimed_id != Some(resolved_id.as_str()) {
        return deny(ErrorCode::AuthTokenMismatch, "authentication failed");
    }

    let configured = match state.configured_patterns(&resolved_id) {
        Ok(patterns) => patterns,
        Err(_) => return deny(ErrorCode::ConfigInvalid, "participant capability config invalid"),
    };
    let display_name = state
        .config
        .participants
        .get(&resolved_id)
        .and_then(|p| p.display_name.clone());
    let capabilities_json = state
        .config
        .participants
        .get(&resolved_id)
        .map(|p| p.capabilities.clone())
        .unwrap_or_default();

    state.registry.register(resolved_id.clone(), display_name, configured);

    let roster: Vec<String> = state.registry.roster().iter().map(|p| p.id.clone()).collect();
    let mut welcome = Envelope::new(
        "system/welcome",
        serde_json::json!({
            "roster": roster,
            "effectiveCapabilities": capabilities_json,
        }),
    );
    welcome.stamp_for_egress(GATEWAY_SENDER);

    JoinOutcome::Accepted {
        participant_id: resolved_id,
        welcome,
    }
}

/// Build the `system/participant-joined` broadcast envelope for a newly
/// registered participant.
#[must_use]
pub fn participant_joined_envelope(participant_id: &str) -> Envelope {
    let mut envelope = Envelope::new(
        "system/participant-joined",
        serde_json::json!({ "participantId": participant_id }),
    );
    envelope.stamp_for_egress(GATEWAY_SENDER);
    envelope
}

/// Build the `system/participant-left` broadcast envelope for a
/// disconnecting participant.
#[must_use]
pub fn participant_left_envelope(participant_id: &str) -> Envelope {
    let mut envelope = Envelope::new(
        "system/participant-left",
        serde_json::json!({ "participantId": participant_id }),
    );
    envelope.stamp_for_egress(GATEWAY_SENDER);
    envelope
}

/// Build a `system/error` envelope carrying `err`'s wire payload.
#[must_use]
pub fn error_envelope(err: &MewError) -> Envelope {
    let mut envelope = Envelope::new("system/error", err.to_wire_payload());
    envelope.stamp_for_egress(GATEWAY_SENDER);
    envelope
}

fn deny(code: ErrorCode, message: &str) -> JoinOutcome {
    JoinOutcome::Denied {
        error: error_envelope(&MewError::new(code, message)),
    }
}
