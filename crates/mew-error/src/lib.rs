// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for the gateway.
//!
//! Every error surfaced across a crate boundary carries a [`ErrorCode`] (a
//! machine-readable, stable string tag), a human-readable message, and
//! arbitrary key-value context. This is what ends up in `system/error`
//! payloads and capability-decision audit records, so the codes are part of
//! the wire contract and must not be renamed casually.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Envelope decode/shape errors.
    Protocol,
    /// Join-time authentication failures.
    Auth,
    /// Capability matcher denials.
    Capability,
    /// Routing failures (unknown recipient, etc).
    Routing,
    /// Tool-handler failures on the participant side.
    Tool,
    /// Transport-level failures (closed, reset, etc).
    Transport,
    /// Configuration errors.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Protocol => "protocol",
            Self::Auth => "auth",
            Self::Capability => "capability",
            Self::Routing => "routing",
            Self::Tool => "tool",
            Self::Transport => "transport",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serializes to a `snake_case` string carried in
/// `system/error.code` and in capability-decision audit records. Treat these
/// as part of the wire contract: adding variants is fine, renaming is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Envelope failed to parse or is missing a required field.
    ProtocolInvalidEnvelope,
    /// `correlation_id` was present but not a JSON array.
    ProtocolCorrelationNotList,
    /// Envelope exceeded the configured maximum size.
    ProtocolEnvelopeTooLarge,
    /// Claimed space does not match this gateway's space.
    AuthInvalidSpace,
    /// No token was supplied at join time.
    AuthTokenMissing,
    /// Token resolution failed or didn't match the claimed participant id.
    AuthTokenMismatch,
    /// The capability matcher denied the envelope.
    CapabilityDenied,
    /// The recipient named in `to` is not connected.
    RoutingUnknownRecipient,
    /// A reserved, gateway-only kind was sent by a participant.
    RoutingReservedKind,
    /// A tool handler raised an error while executing a call.
    ToolHandlerFailed,
    /// A correlated response did not arrive within the call's timeout.
    ToolCallTimedOut,
    /// The transport connection closed or reset.
    TransportClosed,
    /// Configuration failed to load or validate.
    ConfigInvalid,
    /// Unexpected internal failure; always a bug if surfaced to a peer.
    Internal,
}

impl ErrorCode {
    /// The [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::ProtocolInvalidEnvelope
            | Self::ProtocolCorrelationNotList
            | Self::ProtocolEnvelopeTooLarge => ErrorCategory::Protocol,
            Self::AuthInvalidSpace | Self::AuthTokenMissing | Self::AuthTokenMismatch => {
                ErrorCategory::Auth
            }
            Self::CapabilityDenied => ErrorCategory::Capability,
            Self::RoutingUnknownRecipient | Self::RoutingReservedKind => ErrorCategory::Routing,
            Self::ToolHandlerFailed | Self::ToolCallTimedOut => ErrorCategory::Tool,
            Self::TransportClosed => ErrorCategory::Transport,
            Self::ConfigInvalid => ErrorCategory::Config,
            Self::Internal => ErrorCategory::Internal,
        }
    }
}

// ---------------------------------------------------------------------------
// MewError
// ---------------------------------------------------------------------------

/// A structured gateway error: stable code, message, and key-value context.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct MewError {
    /// Stable, machine-readable code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Structured context (deterministic ordering for logs/snapshots).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl MewError {
    /// Construct a new error with no context.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context key-value pair, builder-style.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// The `system/error` wire payload for this error: `{message, code}`.
    #[must_use]
    pub fn to_wire_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "message": self.message,
            "code": self.code,
        })
    }
}
