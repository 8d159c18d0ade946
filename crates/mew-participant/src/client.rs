// SPDX-License-Identifier: MIT OR Apache-2.0
//! The client-side participant runtime: the library every agent, tool
//! server, and test driver links against to speak to a gateway.

use crate::correlator::Correlator;
use crate::lifecycle::{CompactResult, LifecycleController};
use crate::proposal::{build_fulfillment, build_proposal};
use crate::tool_registry::ToolRegistry;
use crate::ParticipantError;
use mew_envelope::Envelope;
use mew_transport::{Transport, TransportError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Default per-call correlation timeout, per spec §4.6.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default join-handshake timeout.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(15);

/// The `system/welcome` payload: roster and effective capabilities granted
/// to the freshly-joined participant.
#[derive(Debug, Clone)]
pub struct Welcome {
    /// The participant id the gateway registered this connection under.
    pub participant_id: String,
    /// Ids of every other currently-connected participant.
    pub roster: Vec<String>,
    /// The raw effective-capability patterns the gateway reports, as JSON
    /// (the wire representation — not a compiled matcher pattern).
    pub effective_capabilities: Vec<Value>,
}

/// A connected participant: owns a background task driving one
/// [`Transport`], and exposes send/call/tool/lifecycle surfaces to the
/// embedding application.
pub struct Client {
    id: String,
    outbound: mpsc::Sender<Envelope>,
    correlator: Arc<Correlator>,
    tools: Arc<ToolRegistry>,
    lifecycle: Arc<LifecycleController>,
    inbox: Mutex<mpsc::Receiver<Envelope>>,
    call_timeout: Duration,
}

impl Client {
    /// Open the join handshake over `transport`, then hand the transport to
    /// a background driver task and return a ready [`Client`] plus the
    /// gateway's [`Welcome`].
    pub async fn connect(
        mut transport: Box<dyn Transport>,
        space: impl Into<String>,
        token: impl Into<String>,
        participant_id: impl Into<String>,
        join_timeout: Duration,
    ) -> Result<(Self, Welcome), ParticipantError> {
        let participant_id = participant_id.into();
        let join = Envelope::new(
            "system/join",
            serde_json::json!({
                "space": space.into(),
                "token": token.into(),
                "participantId": participant_id.clone(),
            }),
        );
        transport.send(join).await?;

        let reply = tokio::time::timeout(join_timeout, transport.recv())
            .await
            .map_err(|_| ParticipantError::Timeout)??
            .ok_or(ParticipantError::Transport(TransportError::Closed))?;

        if reply.kind.as_str() == "system/error" {
            let message = reply
                .payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("join rejected")
                .to_string();
            return Err(ParticipantError::Denied(message));
        }
        if reply.kind.as_str() != "system/welcome" {
            return Err(ParticipantError::Protocol(format!(
                "expected system/welcome, got {}",
                reply.kind
            )));
        }

        let welcome = Welcome {
            participant_id: participant_id.clone(),
            roster: reply
                .payload
                .get("roster")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            effective_capabilities: reply
                .payload
                .get("effectiveCapabilities")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (inbox_tx, inbox_rx) = mpsc::channel(64);
        let correlator = Arc::new(Correlator::new());
        let tools = Arc::new(ToolRegistry::new());
        let lifecycle = Arc::new(LifecycleController::new());
        lifecycle.set_auto_resume_sink(outbound_tx.clone());

        tokio::spawn(drive(
            transport,
            outbound_rx,
            inbox_tx,
            correlator.clone(),
            tools.clone(),
            lifecycle.clone(),
        ));

        Ok((
            Self {
                id: participant_id,
                outbound: outbound_tx,
                correlator,
                tools,
                lifecycle,
                inbox: Mutex::new(inbox_rx),
                call_timeout: DEFAULT_CALL_TIMEOUT,
            },
            welcome,
        ))
    }

    /// This participant's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Override the default per-call correlation timeout.
    pub fn set_call_timeout(&mut self, timeout: Duration) {
        self.call_timeout = timeout;
    }

    /// The tool registry this participant answers `mcp/request` with.
    #[must_use]
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// The lifecycle controller honoring `participant/*` commands.
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    /// Stamp and send an envelope without waiting for any response.
    pub async fn send(&self, mut envelope: Envelope) -> Result<(), ParticipantError> {
        envelope.stamp_for_egress(self.id.clone());
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| ParticipantError::Transport(TransportError::Closed))
    }

    /// Stamp, send, and await the correlated response (or timeout).
    pub async fn call(&self, mut envelope: Envelope) -> Result<Envelope, ParticipantError> {
        envelope.stamp_for_egress(self.id.clone());
        let id = envelope.id.clone();
        let rx = self.correlator.register(id.clone());
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| ParticipantError::Transport(TransportError::Closed))?;
        self.correlator.wait(&id, rx, self.call_timeout).await
    }

    /// Emit `mcp/proposal` and await the eventual correlated response, for
    /// participants that lack direct request capability.
    pub async fn propose(&self, payload: Value) -> Result<Envelope, ParticipantError> {
        self.call(build_proposal(payload)).await
    }

    /// Fulfill a proposal: emit `mcp/request` correlated to `proposal_id`
    /// and await the correlated reply.
    pub async fn fulfill(&self, proposal_id: impl Into<String>, payload: Value) -> Result<Envelope, ParticipantError> {
        self.call(build_fulfillment(proposal_id, payload)).await
    }

    /// Honor `participant/pause`.
    pub async fn pause(&self, timeout_seconds: Option<u64>) {
        self.lifecycle.pause(timeout_seconds);
    }

    /// Honor `participant/resume`.
    pub fn resume(&self) {
        self.lifecycle.resume();
    }

    /// Honor `participant/clear`.
    pub async fn clear(&self) {
        self.lifecycle.clear().await;
    }

    /// Honor `participant/compact`.
    pub async fn compact(&self) -> CompactResult {
        self.lifecycle.compact().await
    }

    /// Receive the next application-level envelope — one not consumed by
    /// correlation, tool dispatch, or lifecycle handling.
    pub async fn recv(&self) -> Option<Envelope> {
        self.inbox.lock().await.recv().await
    }
}

async fn drive(
    mut transport: Box<dyn Transport>,
    mut outbound_rx: mpsc::Receiver<Envelope>,
    inbox_tx: mpsc::Sender<Envelope>,
    correlator: Arc<Correlator>,
    tools: Arc<ToolRegistry>,
    lifecycle: Arc<LifecycleController>,
) {
    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(envelope) => {
                        if let Err(err) = transport.send(envelope).await {
                            warn!(error = %err, "participant transport send failed");
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = transport.recv() => {
                match incoming {
                    Ok(Some(envelope)) => {
                        if correlator.try_resolve(&envelope) {
                            continue;
                        }
                        if let Some(reply) = handle_lifecycle_kind(&envelope, &lifecycle).await {
                            let _ = transport.send(reply).await;
                            continue;
                        }
                        if envelope.kind.as_str() == "mcp/request" {
                            let reply = dispatch_tool_request(&envelope, &tools).await;
                            let _ = transport.send(reply).await;
                            continue;
                        }
                        if inbox_tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("participant transport closed");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "participant transport recv failed");
                        break;
                    }
                }
            }
        }
    }
    let _ = transport.close().await;
}

async fn dispatch_tool_request(envelope: &Envelope, tools: &Arc<ToolRegistry>) -> Envelope {
    let result = tools.dispatch(&envelope.payload).await;
    Envelope::new("mcp/response", result).correlated_to(envelope.id.clone())
}

async fn handle_lifecycle_kind(envelope: &Envelope, lifecycle: &Arc<LifecycleController>) -> Option<Envelope> {
    if envelope.kind.namespace() != "participant" {
        return None;
    }
    match envelope.kind.as_str() {
        "participant/pause" => {
            let timeout_seconds = envelope.payload.get("timeout_seconds").and_then(Value::as_u64);
            lifecycle.pause(timeout_seconds);
            Some(status_reply(envelope, lifecycle))
        }
        "participant/resume" => {
            lifecycle.resume();
            Some(status_reply(envelope, lifecycle))
        }
        "participant/clear" => {
            lifecycle.clear().await;
            Some(status_reply(envelope, lifecycle))
        }
        "participant/restart" => {
            lifecycle.restart().await;
            Some(status_reply(envelope, lifecycle))
        }
        "participant/shutdown" => {
            lifecycle.shutdown();
            Some(status_reply(envelope, lifecycle))
        }
        "participant/compact" => {
            let result = lifecycle.compact().await;
            let payload = serde_json::to_value(&result).unwrap_or(Value::Null);
            Some(Envelope::new("participant/compact-done", payload).correlated_to(envelope.id.clone()))
        }
        "participant/request-status" => Some(status_reply(envelope, lifecycle)),
        _ => None,
    }
}

fn status_reply(envelope: &Envelope, lifecycle: &Arc<LifecycleController>) -> Envelope {
    let counters = lifecycle.counters();
    let payload = serde_json::json!({
        "status": lifecycle.status(),
        "context_counters": { "messages": counters.messages, "tokens": counters.tokens },
    });
    Envelope::new("participant/status", payload).correlated_to(envelope.id.clone())
}
