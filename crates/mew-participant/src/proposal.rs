// SPDX-License-Identifier: MIT OR Apache-2.0
//! Proposal/fulfillment workflow for participants that lack the capability
//! to send a direct request.

use mew_envelope::Envelope;
use serde_json::Value;

/// Build an `mcp/proposal` envelope: emitted by a participant that cannot
/// send the equivalent `mcp/request` directly.
#[must_use]
pub fn build_proposal(payload: Value) -> Envelope {
    Envelope::new("mcp/proposal", payload)
}

/// Build the `mcp/request` a privileged peer sends to fulfill a proposal,
/// correlated to the proposal's envelope id so the proposer's eventual
/// response observation resolves correctly.
#[must_use]
pub fn build_fulfillment(proposal_id: impl Into<String>, payload: Value) -> Envelope {
    Envelope::new("mcp/request", payload).correlated_to(proposal_id)
}
