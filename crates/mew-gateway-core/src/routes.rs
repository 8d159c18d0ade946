// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP/WebSocket surface (§6): `/health`, the `/ws` connection driver, and
//! the `POST /participants/{id}/messages` HTTP injection adapter.

use crate::ingest::{self, IngestOutcome};
use crate::join::{self, JoinOutcome};
use crate::state::GatewayState;
use axum::{
    Json, Router,
    extract::ws::{WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mew_envelope::{Envelope, PROTOCOL_VERSION};
use mew_transport::ws::split;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Build the gateway's axum [`Router`].
#[must_use]
pub fn build_app(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/ws", get(ws_upgrade))
        .route("/participants/{id}/messages", post(inject_message))
        .with_state(state)
}

async fn cmd_health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "contract_version": PROTOCOL_VERSION,
        "space": state.config.space,
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn ws_upgrade(State(state): State<Arc<GatewayState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Consecutive frame-decode failures tolerated before the gateway gives up
/// on a connection (§4.4.5: "do not close unless decode failures exceed a
/// configurable threshold").
const MAX_CONSECUTIVE_DECODE_FAILURES: u32 = 8;

async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut read, mut write) = split(socket, state.config.max_envelope_bytes);

    let join_timeout = std::time::Duration::from_secs(state.config.join_timeout_secs);
    let first = match tokio::time::timeout(join_timeout, read.recv()).await {
        Ok(Ok(Some(envelope))) => envelope,
        Ok(Ok(None)) => return,
        Ok(Err(_)) => return,
        Err(_) => {
            let _ = write
                .send(&join::error_envelope(&mew_error::MewError::new(
                    mew_error::ErrorCode::ProtocolInvalidEnvelope,
                    "join timed out",
                )))
                .await;
            return;
        }
    };

    let (participant_id, welcome) = match join::perform_join(&state, &first) {
        JoinOutcome::Accepted { participant_id, welcome } => (participant_id, welcome),
        JoinOutcome::Denied { error } => {
            let _ = write.send(&error).await;
            let _ = write.close().await;
            return;
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(state.config.outbound_queue_capacity);
    state.registry.attach_channel(&participant_id, outbound_tx);

    if write.send(&welcome).await.is_err() {
        state.registry.detach_channel(&participant_id);
        return;
    }
    info!(participant = %participant_id, "participant joined");
    ingest::broadcast(&state, &participant_id, join::participant_joined_envelope(&participant_id)).await;

    let mut consecutive_decode_failures = 0u32;
    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(envelope) => {
                        if write.send(&envelope).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = read.recv() => {
                match incoming {
                    Ok(Some(envelope)) => {
                        consecutive_decode_failures = 0;
                        ingest::route_envelope(&state, &participant_id, envelope).await;
                    }
                    Ok(None) => break,
                    Err(mew_transport::TransportError::Decode(decode_err)) => {
                        consecutive_decode_failures += 1;
                        warn!(participant = %participant_id, error = %decode_err, "dropping malformed frame");
                        let err = mew_error::MewError::new(
                            mew_error::ErrorCode::ProtocolInvalidEnvelope,
                            decode_err.to_string(),
                        );
                        if write.send(&join::error_envelope(&err)).await.is_err() {
                            break;
                        }
                        if consecutive_decode_failures >= MAX_CONSECUTIVE_DECODE_FAILURES {
                            warn!(participant = %participant_id, "too many consecutive decode failures, closing");
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }

    state.registry.detach_channel(&participant_id);
    state.reclaim_streams_for(&participant_id);
    info!(participant = %participant_id, "participant disconnected");
    ingest::broadcast(&state, &participant_id, join::participant_left_envelope(&participant_id)).await;
}

/// Body for `POST /participants/{id}/messages`: an envelope with `from`,
/// `ts`, and `protocol` omitted (§6 — the gateway stamps all three).
#[derive(Debug, Deserialize)]
struct InjectBody {
    kind: String,
    #[serde(default)]
    to: Vec<String>,
    #[serde(default)]
    correlation_id: Vec<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
}

async fn inject_message(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<InjectBody>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    };
    let Some(resolved) = state.registry.resolve_by_token(token) else {
        return (StatusCode::UNAUTHORIZED, "authentication failed").into_response();
    };
    if resolved != id {
        return (StatusCode::UNAUTHORIZED, "authentication failed").into_response();
    }

    if state.registry.get(&id).is_none() {
        let patterns = match state.configured_patterns(&id) {
            Ok(patterns) => patterns,
            Err(_) => return (StatusCode::BAD_REQUEST, "participant capability config invalid").into_response(),
        };
        let display_name = state.config.participants.get(&id).and_then(|p| p.display_name.clone());
        state.registry.register(id.clone(), display_name, patterns);
    }

    let mut envelope = Envelope::new(body.kind, body.payload)
        .to(body.to)
        .with_correlation(body.correlation_id.into());
    envelope.context = body.context;

    match ingest::route_envelope(&state, &id, envelope).await {
        IngestOutcome::Accepted => StatusCode::ACCEPTED.into_response(),
        IngestOutcome::Rejected(err) => {
            warn!(participant = %id, code = %err.code, "http injection rejected");
            (StatusCode::FORBIDDEN, Json(err.to_wire_payload())).into_response()
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get("authorization")?.to_str().ok()?.strip_prefix("Bearer ")
}
