// SPDX-License-Identifier: MIT OR Apache-2.0
//! mew-participant
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The client-side runtime every agent, tool server, and test driver links
//! against to speak to a gateway: connect/join, request/response
//! correlation, the tool surface, proposal/fulfillment, and lifecycle
//! controls (§4.6).

pub mod client;
pub mod correlator;
pub mod lifecycle;
pub mod proposal;
pub mod tool_registry;

pub use client::{Client, Welcome, DEFAULT_CALL_TIMEOUT, DEFAULT_JOIN_TIMEOUT};
pub use correlator::Correlator;
pub use lifecycle::{
    CompactResult, CompactStatus, ContextCounters, LifecycleController, LifecycleHooks,
    ParticipantStatus,
};
pub use proposal::{build_fulfillment, build_proposal};
pub use tool_registry::{ToolHandler, ToolRegistry, ToolSpec};

use mew_transport::TransportError;

/// Errors surfaced by the participant runtime.
#[derive(Debug, thiserror::Error)]
pub enum ParticipantError {
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A call did not receive a correlated response within its timeout.
    #[error("call timed out waiting for a correlated response")]
    Timeout,

    /// The gateway rejected the join handshake.
    #[error("join denied: {0}")]
    Denied(String),

    /// An unexpected protocol-level violation (unexpected reply kind,
    /// malformed tool invocation, etc).
    #[error("protocol violation: {0}")]
    Protocol(String),
}
