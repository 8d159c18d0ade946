// SPDX-License-Identifier: MIT OR Apache-2.0
//! mew-gateway-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The router and policy enforcement point (§4.4): owns the participant
//! registry, wires transports, performs join auth, enforces capabilities,
//! fans out envelopes, and writes the audit trail. The only component that
//! touches transports, the registry, and the matcher within the same
//! request.

pub mod ingest;
pub mod join;
pub mod routes;
pub mod state;

pub use ingest::{broadcast, route_envelope, IngestOutcome};
pub use join::{perform_join, JoinOutcome};
pub use routes::build_app;
pub use state::GatewayState;

use mew_audit::AuditLogger;
use mew_config::GatewayConfig;
use mew_registry::Registry;
use std::sync::Arc;

/// Construct a ready [`GatewayState`] from a loaded, validated config.
///
/// # Errors
///
/// Returns [`mew_audit::AuditError`] if the audit directory cannot be
/// opened, or [`mew_capability::PatternError`] if any participant's
/// configured capabilities fail to compile.
pub async fn build_state(config: GatewayConfig) -> anyhow::Result<Arc<GatewayState>> {
    let logs_dir = config
        .logs_dir
        .clone()
        .unwrap_or_else(|| ".mew/logs".to_string());
    let audit = AuditLogger::open(&logs_dir).await?;
    let registry = Registry::new(&config.tokens, config.ephemeral_grants);
    Ok(Arc::new(GatewayState::new(config, registry, audit)))
}
