// SPDX-License-Identifier: MIT OR Apache-2.0
//! The "required capability descriptor" the gateway computes for an
//! inbound envelope before consulting the matcher (spec §4.4.2 ¶3): a small,
//! documented projection of `{kind, to, payload fields}` — never the whole
//! payload — used for audit labeling and operator-facing policy review.
//!
//! The matcher itself (`mew_capability::matches`) evaluates the full
//! envelope; this module exists only to produce the human-readable
//! `required_capability` string an audit [`mew_audit::DecisionRecord`]
//! carries, and a structured projection for tooling that wants one without
//! re-deriving the per-kind field list.

use mew_envelope::Envelope;
use serde_json::Value;

/// A small, documented projection of the fields a capability decision for
/// this envelope turns on. Mirrors spec §4.4.2 ¶3: most kinds project to
/// `{kind, to, payload: {method?}}`; `mcp/*` additionally projects
/// `payload.params.name`.
#[must_use]
pub fn capability_descriptor(envelope: &Envelope) -> Value {
    let mut payload = serde_json::Map::new();
    if let Some(method) = envelope.payload.get("method").and_then(Value::as_str) {
        payload.insert("method".to_string(), Value::String(method.to_string()));
        if is_mcp_kind(envelope.kind.as_str())
            && let Some(name) = envelope
                .payload
                .get("params")
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
        {
            payload.insert("params.name".to_string(), Value::String(name.to_string()));
        }
    }
    serde_json::json!({
        "kind": envelope.kind.as_str(),
        "to": envelope.to,
        "payload": Value::Object(payload),
    })
}

/// A compact, human-readable label for the capability a decision concerns,
/// e.g. `"mcp/request tools/call:delete_file"` or `"chat"`. This is what
/// populates `DecisionRecord::required_capability`.
#[must_use]
pub fn required_capability_label(envelope: &Envelope) -> String {
    let method = envelope.payload.get("method").and_then(Value::as_str);
    let tool_name = if is_mcp_kind(envelope.kind.as_str()) {
        envelope
            .payload
            .get("params")
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
    } else {
        None
    };
    match (method, tool_name) {
        (Some(method), Some(name)) => format!("{} {method}:{name}", envelope.kind.as_str()),
        (Some(method), None) => format!("{} {method}", envelope.kind.as_str()),
        (None, _) => envelope.kind.as_str().to_string(),
    }
}

fn is_mcp_kind(kind: &str) -> bool {
    matches!(kind, "mcp/request" | "mcp/response" | "mcp/proposal")
}
